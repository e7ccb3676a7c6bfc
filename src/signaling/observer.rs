use crate::ice::IceCandidate;
use crate::publisher::error::PublisherError;
use crate::sdp::SessionDescription;
use crate::signaling::messages::RequestContext;

/// What `on_request_offer` hands back to the signalling layer.
#[derive(Debug)]
pub struct OfferResponse {
    pub session_id: u32,
    pub sdp: SessionDescription,
    pub candidates: Vec<IceCandidate>,
}

/// The publisher-side surface of the signalling contract. One observer per
/// server; callbacks run on signalling worker threads.
pub trait SignalObserver: Send + Sync {
    fn on_request_offer(
        &self,
        context: &RequestContext,
        application: &str,
        stream: &str,
    ) -> Result<OfferResponse, PublisherError>;

    fn on_add_remote_description(
        &self,
        context: &RequestContext,
        application: &str,
        stream: &str,
        offer: &SessionDescription,
        answer: &SessionDescription,
    ) -> Result<(), PublisherError>;

    fn on_stop_command(
        &self,
        application: &str,
        stream: &str,
        session_id: u32,
    ) -> Result<(), PublisherError>;

    /// Candidates from the peer are accepted but this side answers checks
    /// from its advertised host candidates only.
    fn on_ice_candidate(
        &self,
        application: &str,
        stream: &str,
        session_id: u32,
        candidate: &str,
    ) -> bool;

    fn on_get_bitrate(&self, application: &str, stream: &str) -> u32;
}
