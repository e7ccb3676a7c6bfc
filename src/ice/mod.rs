pub mod candidate;
pub mod ice_error;
pub mod port;
pub mod stun;

pub use candidate::{CandidateKind, IceCandidate};
pub use ice_error::IceError;
pub use port::{IceConnectionState, IcePort, IcePortObserver};
