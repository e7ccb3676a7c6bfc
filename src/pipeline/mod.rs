pub mod dtls_transport;
pub mod ice_adapter;
pub mod node;
pub mod rtp_rtcp;
pub mod srtp_transport;

pub use dtls_transport::DtlsTransport;
pub use ice_adapter::IceAdapter;
pub use node::{NodeBase, NodeState, NodeType, SessionNode, link};
pub use rtp_rtcp::RtpRtcp;
pub use srtp_transport::SrtpTransport;
