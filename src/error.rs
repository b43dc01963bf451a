use thiserror::Error;

/// Stable error kinds shared by every layer of the simulator.
///
/// Success is the `Ok` side of [`Result`]; a cache or TLB eviction is part
/// of normal operation and is never reported through this type. Errors
/// propagate to the outer driver unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid argument from the caller: out-of-range index, misaligned
    /// address, size mismatch.
    #[error("bad parameter: {0}")]
    BadParameter(String),
    /// File open/read failure or ill-formed input text.
    #[error("i/o: {0}")]
    Io(String),
    /// Access outside the memory image, or no image at all.
    #[error("memory: {0}")]
    Mem(String),
    /// A quantity would overflow.
    #[error("size: {0}")]
    Size(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
