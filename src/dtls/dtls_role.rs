/// DTLS handshake role. The egress side offers `a=setup:actpass` and the
/// browser answers active, so sessions here normally run as `Server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtlsRole {
    Client,
    Server,
}
