use crate::addr::VirtAddr;
use crate::error::{Error, Result};
use crate::util::parse_hex;
use std::fmt::{self, Display};
use std::fs;
use std::path::Path;

/// Read or write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Read,
    Write,
}

/// Which side of the split hierarchy an access goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessType {
    Instruction,
    Data,
}

/// Access granularity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSize {
    Byte,
    Word,
}

impl DataSize {
    pub fn bytes(self) -> u16 {
        match self {
            DataSize::Byte => 1,
            DataSize::Word => 4,
        }
    }
}

/// One parsed access: `<R|W> <I|DW|DB> [<hex-value>] @<hex-address>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Command {
    pub order: Order,
    pub access: AccessType,
    pub size: DataSize,
    pub write_data: u32,
    pub vaddr: VirtAddr,
}

/// A validated access script.
///
/// The listing grows by doubling while parsing and is shrunk to its exact
/// size once the whole script is in.
#[derive(Default)]
pub struct Program {
    listing: Vec<Command>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn len(&self) -> usize {
        self.listing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listing.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.listing
    }

    /// Validates and appends one command.
    ///
    /// Instructions are read-only and word sized, byte writes must fit in
    /// a byte, and the page offset must be aligned to the access size.
    pub fn push(&mut self, command: Command) -> Result<()> {
        if command.access == AccessType::Instruction {
            if command.order != Order::Read {
                return Err(Error::BadParameter(
                    "instruction accesses are read-only".into(),
                ));
            }
            if command.size != DataSize::Word {
                return Err(Error::BadParameter(
                    "instruction accesses are word sized".into(),
                ));
            }
        }
        if command.order == Order::Write
            && command.size == DataSize::Byte
            && command.write_data > u32::from(u8::MAX)
        {
            return Err(Error::BadParameter(format!(
                "write value 0x{:X} does not fit in a byte",
                command.write_data
            )));
        }
        if command.vaddr.page_offset() % command.size.bytes() != 0 {
            return Err(Error::BadParameter(format!(
                "offset 0x{:X} not aligned to a {} byte access",
                command.vaddr.page_offset(),
                command.size.bytes()
            )));
        }
        self.listing.push(command);
        Ok(())
    }

    /// Releases the slack left by the doubling growth.
    pub fn shrink(&mut self) {
        self.listing.shrink_to_fit();
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text =
            fs::read_to_string(path).map_err(|e| Error::Io(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parses a whole script, one command per line; blank lines are
    /// skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut program = Program::new();
        for (n, line) in text.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(order_token) = tokens.next() else {
                continue;
            };
            let fail = |what: &str| Error::Io(format!("line {}: {what}", n + 1));

            let order = match order_token {
                "R" => Order::Read,
                "W" => Order::Write,
                _ => return Err(fail("expected R or W")),
            };
            let (access, size) = match tokens.next() {
                Some("I") => (AccessType::Instruction, DataSize::Word),
                Some("DW") => (AccessType::Data, DataSize::Word),
                Some("DB") => (AccessType::Data, DataSize::Byte),
                _ => return Err(fail("expected I, DW or DB")),
            };
            let write_data = if order == Order::Write {
                let token = tokens.next().ok_or_else(|| fail("missing write value"))?;
                u32::try_from(parse_hex(token)?)
                    .map_err(|_| Error::Size(format!("line {}: write value too wide", n + 1)))?
            } else {
                0
            };
            let addr_token = tokens.next().ok_or_else(|| fail("missing address"))?;
            let digits = addr_token
                .strip_prefix('@')
                .ok_or_else(|| fail("address must start with @"))?;
            let vaddr = VirtAddr::from_u64(parse_hex(digits)?);
            if tokens.next().is_some() {
                return Err(fail("trailing tokens"));
            }

            program.push(Command {
                order,
                access,
                size,
                write_data,
                vaddr,
            })?;
        }
        program.shrink();
        Ok(program)
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order {
            Order::Read => write!(f, "R ")?,
            Order::Write => write!(f, "W ")?,
        }
        match (self.access, self.size) {
            (AccessType::Instruction, _) => write!(f, "I ")?,
            (AccessType::Data, DataSize::Word) => write!(f, "DW ")?,
            (AccessType::Data, DataSize::Byte) => write!(f, "DB ")?,
        }
        if self.order == Order::Write {
            match self.size {
                DataSize::Word => write!(f, "0x{:08X} ", self.write_data)?,
                DataSize::Byte => write!(f, "0x{:02X} ", self.write_data)?,
            }
        }
        write!(f, "@0x{:016X}", self.vaddr.to_u64())
    }
}

impl Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for command in &self.listing {
            writeln!(f, "{command}")?;
        }
        Ok(())
    }
}
