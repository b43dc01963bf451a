use crate::error::{Error, Result};

/// Parses a hexadecimal token, tolerating an optional `0x` prefix.
pub(crate) fn parse_hex(token: &str) -> Result<u64> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u64::from_str_radix(digits, 16).map_err(|_| Error::Io(format!("malformed hex number {token:?}")))
}

/// Parses a base-10 token.
pub(crate) fn parse_dec(token: &str) -> Result<usize> {
    token
        .parse::<usize>()
        .map_err(|_| Error::Io(format!("malformed decimal number {token:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("0x1000").unwrap(), 0x1000);
        assert_eq!(parse_hex("CAFEBABE").unwrap(), 0xCAFEBABE);
        assert!(parse_hex("0xzz").is_err());
        assert!(parse_hex("").is_err());
    }

    #[test]
    fn test_parse_dec() {
        assert_eq!(parse_dec("4096").unwrap(), 4096);
        assert!(parse_dec("0x10").is_err());
    }
}
