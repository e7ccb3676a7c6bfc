use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtpError {
    TooShort,
    BadVersion(u8),
    CsrcCountMismatch { expected: usize, buf_left: usize },
    ExtensionTooShort,
    PaddingInvalid,
    TooManyCsrcs(usize),
}

impl fmt::Display for RtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use RtpError::*;
        match self {
            TooShort => write!(f, "buffer too short for an RTP packet"),
            BadVersion(v) => write!(f, "bad RTP version: {v}"),
            CsrcCountMismatch { expected, buf_left } => {
                write!(f, "csrc count {expected} but only {buf_left} bytes left")
            }
            ExtensionTooShort => write!(f, "header extension exceeds buffer"),
            PaddingInvalid => write!(f, "padding count invalid"),
            TooManyCsrcs(n) => write!(f, "csrc list too long: {n}"),
        }
    }
}
impl std::error::Error for RtpError {}
