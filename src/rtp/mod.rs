pub mod rtp_error;
pub mod rtp_packet;
pub use rtp_error::RtpError;
pub use rtp_packet::RtpPacket;
