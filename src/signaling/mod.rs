pub mod messages;
pub mod observer;
pub mod server;
pub mod signaling_error;
pub mod tls;

pub use messages::{RequestContext, SignalMessage, SignalReply};
pub use observer::{OfferResponse, SignalObserver};
pub use server::{SignalConnection, SignallingServer};
pub use signaling_error::SignalingError;
