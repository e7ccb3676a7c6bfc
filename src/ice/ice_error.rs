use std::fmt;
use std::io;

#[derive(Debug)]
pub enum IceError {
    Bind { addr: String, source: io::Error },
    Socket(io::Error),
}

impl fmt::Display for IceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "could not bind media socket {addr}: {source}"),
            Self::Socket(e) => write!(f, "media socket error: {e}"),
        }
    }
}
impl std::error::Error for IceError {}
