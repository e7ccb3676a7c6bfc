pub mod constants;
pub mod context;
pub mod endpoint_keys;
pub mod replay_window;
pub mod session_keys;
pub mod srtp_error;
pub mod utils;

pub use context::SrtpContext;
pub use endpoint_keys::{SrtpEndpointKeys, SrtpProfile, SrtpSessionConfig};
pub use srtp_error::SrtpError;
