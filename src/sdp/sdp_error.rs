use std::fmt;
use std::num::ParseIntError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpError {
    Invalid(&'static str),
    MissingLine(&'static str),
    Number(String),
}

impl fmt::Display for SdpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(line) => write!(f, "malformed SDP line: {line}"),
            Self::MissingLine(line) => write!(f, "required SDP line missing: {line}"),
            Self::Number(raw) => write!(f, "bad number in SDP: {raw}"),
        }
    }
}
impl std::error::Error for SdpError {}

impl From<ParseIntError> for SdpError {
    fn from(e: ParseIntError) -> Self {
        Self::Number(e.to_string())
    }
}
