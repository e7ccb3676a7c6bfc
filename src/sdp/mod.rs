pub mod media;
pub mod origin;
pub mod sdp_error;
pub mod session_description;

pub use media::{MediaDescription, MediaKind, PayloadMap};
pub use origin::Origin;
pub use sdp_error::SdpError;
pub use session_description::SessionDescription;
