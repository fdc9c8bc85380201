use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("Value \"{0}\" is not a valid integer")]
    NotAnInteger(String),

    #[error("Value {0} is outside the range of valid port numbers")]
    OutOfRange(i128),
}

/// Parse a local port number (1-65535).
///
/// Only an optional `-` followed by ASCII digits counts as an integer; no
/// whitespace, no `+`. Integers too large for `i128` saturate.
pub fn parse_port(value: &str) -> Result<u16, PortError> {
    let (negative, digits) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortError::NotAnInteger(value.to_string()));
    }

    let number = value.parse::<i128>().unwrap_or(if negative {
        i128::MIN
    } else {
        i128::MAX
    });

    match u16::try_from(number) {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(PortError::OutOfRange(number)),
    }
}
