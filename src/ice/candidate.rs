use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::SocketAddr;

/// Component ID (1 = RTP; RTCP is muxed on the same component)
const DEFAULT_COMPONENT_ID: u8 = 1;

/// Type preferences per RFC 8445 §5.1.2.1 conventions
const HOST_TYPE_PREF: u32 = 126;
const SERVER_REFLEXIVE_TYPE_PREF: u32 = 100;

const MAX_LOCAL_PREF: u16 = u16::MAX;
const TYPE_PREF_SHIFT: u32 = 24;
const LOCAL_PREF_SHIFT: u32 = 8;
const COMPONENT_OFFSET: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    Host,
    ServerReflexive,
}

impl CandidateKind {
    fn sdp_name(self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::ServerReflexive => "srflx",
        }
    }
}

/// One advertised ICE candidate, rendered into the `a=candidate:` form the
/// signalling answer expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    pub foundation: String,
    pub component: u8,
    pub transport: String,
    pub priority: u32,
    pub address: SocketAddr,
    pub kind: CandidateKind,
}

impl IceCandidate {
    pub fn host(address: SocketAddr) -> Self {
        Self::new(address, CandidateKind::Host)
    }

    pub fn new(address: SocketAddr, kind: CandidateKind) -> Self {
        Self {
            foundation: calculate_foundation(kind, "udp", &address.ip().to_string()),
            component: DEFAULT_COMPONENT_ID,
            transport: "udp".to_string(),
            priority: calculate_priority(kind, MAX_LOCAL_PREF, DEFAULT_COMPONENT_ID),
            address,
            kind,
        }
    }
}

/// Foundation per RFC 8445 §5.1.1.3: stable hash of (type, base, transport).
fn calculate_foundation(kind: CandidateKind, transport: &str, base_ip: &str) -> String {
    let mut hasher = DefaultHasher::new();
    format!("{}-{}-{}", kind.sdp_name(), base_ip, transport).hash(&mut hasher);
    format!("{:x}", hasher.finish())
}

/// Priority per RFC 8445 §5.1.2.1.
fn calculate_priority(kind: CandidateKind, local_pref: u16, component_id: u8) -> u32 {
    let type_pref: u32 = match kind {
        CandidateKind::Host => HOST_TYPE_PREF,
        CandidateKind::ServerReflexive => SERVER_REFLEXIVE_TYPE_PREF,
    };

    (1 << TYPE_PREF_SHIFT) * type_pref
        + (1 << LOCAL_PREF_SHIFT) * local_pref as u32
        + (COMPONENT_OFFSET - component_id as u32)
}

impl fmt::Display for IceCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "candidate:{} {} {} {} {} {} typ {}",
            self.foundation,
            self.component,
            self.transport,
            self.priority,
            self.address.ip(),
            self.address.port(),
            self.kind.sdp_name()
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn host_outranks_srflx() {
        let host = IceCandidate::host("10.0.0.1:10000".parse().unwrap());
        let srflx = IceCandidate::new(
            "203.0.113.4:10000".parse().unwrap(),
            CandidateKind::ServerReflexive,
        );
        assert!(host.priority > srflx.priority);
    }

    #[test]
    fn renders_sdp_attribute_form() {
        let c = IceCandidate::host("10.0.0.1:10000".parse().unwrap());
        let line = c.to_string();
        assert!(line.starts_with("candidate:"));
        assert!(line.contains(" udp "));
        assert!(line.ends_with("typ host"));
        assert!(line.contains("10.0.0.1 10000"));
    }

    #[test]
    fn same_base_gives_same_foundation() {
        let a = IceCandidate::host("10.0.0.1:10000".parse().unwrap());
        let b = IceCandidate::host("10.0.0.1:10002".parse().unwrap());
        assert_eq!(a.foundation, b.foundation);
    }
}
