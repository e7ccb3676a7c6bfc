use std::fmt;
use std::io;

#[derive(Debug)]
pub enum SignalingError {
    Bind { addr: String, source: io::Error },
    Tls(String),
    NoListener,
}

impl fmt::Display for SignalingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => {
                write!(f, "could not bind signalling listener {addr}: {source}")
            }
            Self::Tls(msg) => write!(f, "signalling TLS setup failed: {msg}"),
            Self::NoListener => write!(f, "no signalling listener configured"),
        }
    }
}
impl std::error::Error for SignalingError {}
