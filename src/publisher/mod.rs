pub mod application;
pub mod congestion;
pub mod error;
pub mod message_thread;
pub mod publisher;
pub mod session;
pub mod signed_policy;
pub mod stream;
pub mod track;

pub use application::{OriginConnector, RtcApplication};
pub use error::PublisherError;
pub use message_thread::DisconnectReason;
pub use publisher::RtcPublisher;
pub use session::{RtcSession, SessionState};
pub use signed_policy::CheckSignatureResult;
pub use stream::RtcStream;
pub use track::{CodecId, MediaTrack};
