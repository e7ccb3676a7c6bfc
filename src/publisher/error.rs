use std::fmt;

use crate::config::ConfigError;
use crate::ice::IceError;

/// Error kinds surfaced at the publisher boundary. Everything at or below a
/// session node stays confined to that session and never reaches here.
#[derive(Debug)]
pub enum PublisherError {
    ConfigInvalid(ConfigError),
    NotFound { what: &'static str, name: String },
    SignaturePolicyFail(String),
    SignatureTokenFail(String),
    StreamNotReady { app: String, stream: String },
    SessionCreateFailed(String),
    Ice(IceError),
    SignallingStart(String),
}

impl fmt::Display for PublisherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use PublisherError::*;
        match self {
            ConfigInvalid(e) => write!(f, "invalid configuration: {e}"),
            NotFound { what, name } => write!(f, "{what} not found: {name}"),
            SignaturePolicyFail(msg) => write!(f, "signed policy rejected: {msg}"),
            SignatureTokenFail(msg) => write!(f, "signed token rejected: {msg}"),
            StreamNotReady { app, stream } => {
                write!(f, "stream has not started: {app}/{stream}")
            }
            SessionCreateFailed(msg) => write!(f, "cannot create session: {msg}"),
            Ice(e) => write!(f, "ice failure: {e}"),
            SignallingStart(msg) => write!(f, "signalling server failed to start: {msg}"),
        }
    }
}
impl std::error::Error for PublisherError {}

impl From<ConfigError> for PublisherError {
    fn from(e: ConfigError) -> Self {
        Self::ConfigInvalid(e)
    }
}

impl From<IceError> for PublisherError {
    fn from(e: IceError) -> Self {
        Self::Ice(e)
    }
}
