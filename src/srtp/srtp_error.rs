use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SrtpError {
    TooShort,
    BadHeader,
    BadKeyLength,
    AuthFail { ssrc: u32 },
    Replay { ssrc: u32, index: u64 },
}

impl fmt::Display for SrtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SrtpError::*;
        match self {
            TooShort => write!(f, "packet too short for SRTP"),
            BadHeader => write!(f, "malformed RTP header"),
            BadKeyLength => write!(f, "session auth key has wrong length"),
            AuthFail { ssrc } => write!(f, "authentication tag mismatch: ssrc={ssrc:#x}"),
            Replay { ssrc, index } => write!(f, "replay detected: ssrc={ssrc:#x} index={index}"),
        }
    }
}
impl std::error::Error for SrtpError {}
