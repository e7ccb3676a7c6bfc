use std::fmt;
use std::io;

#[derive(Debug)]
pub enum DtlsError {
    Io(io::Error),
    Ssl(String),
    Handshake(String),
    NoSrtpProfile,
    KeyExport(String),
    FingerprintMismatch,
    ChannelClosed,
}

impl fmt::Display for DtlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DtlsError::*;
        match self {
            Io(e) => write!(f, "io error: {e}"),
            Ssl(msg) => write!(f, "ssl error: {msg}"),
            Handshake(msg) => write!(f, "handshake failed: {msg}"),
            NoSrtpProfile => write!(f, "peer negotiated no usable SRTP profile"),
            KeyExport(msg) => write!(f, "keying material export failed: {msg}"),
            FingerprintMismatch => write!(f, "peer certificate fingerprint mismatch"),
            ChannelClosed => write!(f, "datagram channel closed during handshake"),
        }
    }
}
impl std::error::Error for DtlsError {}

impl From<io::Error> for DtlsError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
