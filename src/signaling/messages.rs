//! Typed signalling contract between the WebSocket layer (external) and the
//! publisher. The wire framing is not fixed here; the transport decodes into
//! these messages and relays the replies.

use crate::ice::IceCandidate;
use crate::sdp::SessionDescription;

/// Request context the transport layer attaches to every message: the URL
/// the client connected with (carries policy/token parameters) and its
/// remote address, both needed by the admission checks and the stats log.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub url: String,
    pub remote: String,
}

#[derive(Debug, Clone)]
pub enum SignalMessage {
    RequestOffer {
        application: String,
        stream: String,
    },
    Answer {
        application: String,
        stream: String,
        session_id: u32,
        sdp: String,
    },
    Candidate {
        application: String,
        stream: String,
        session_id: u32,
        candidate: String,
    },
    Stop {
        application: String,
        stream: String,
        session_id: u32,
    },
    BitrateRequest {
        application: String,
        stream: String,
    },
}

#[derive(Debug)]
pub enum SignalReply {
    Offer {
        session_id: u32,
        sdp: SessionDescription,
        candidates: Vec<IceCandidate>,
    },
    Accepted,
    Bitrate(u32),
    Denied(String),
}
