//! DTLS-SRTP key negotiation for the session pipeline: handshake runtime,
//! role handling and the in-pipeline datagram channel it runs over.
pub mod datagram_channel;
pub mod dtls_error;
pub mod dtls_role;
pub mod runtime;
pub use datagram_channel::DatagramChannel;
pub use dtls_error::DtlsError;
pub use dtls_role::DtlsRole;
pub use runtime::{DtlsIdentity, certificate_fingerprint, run_dtls_handshake};
