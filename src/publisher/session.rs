//! One viewer session: the owned node chain (RtpRtcp at the top, ICE
//! adapter at the bottom), the negotiated descriptions, expiry and the
//! connection state mirrored from ICE.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use crate::dtls::DtlsIdentity;
use crate::ice::{IceConnectionState, IcePort};
use crate::log::log_sink::LogSink;
use crate::pipeline::{
    DtlsTransport, IceAdapter, RtpRtcp, SessionNode, SrtpTransport, link,
};
use crate::publisher::congestion::CongestionController;
use crate::publisher::stream::RtcStream;
use crate::rtcp::RtcpRecord;
use crate::rtp::RtpPacket;
use crate::sdp::SessionDescription;
use crate::{clock, sink_debug, sink_info, sink_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Negotiated,
    IceChecking,
    Connected,
    Streaming,
    Failed,
    Closed,
}

const MIN_SESSION_BITRATE: u32 = 100_000;

pub struct RtcSession {
    id: u32,
    stream: Weak<RtcStream>,
    offer: SessionDescription,
    peer: SessionDescription,
    state: Mutex<SessionState>,
    /// 0 means no expiry. Enforced by the publisher's maintenance tick.
    expiry_epoch_secs: AtomicU64,
    stopped: AtomicBool,
    /// Egress SSRCs of the owning stream, for RTCP report matching.
    ssrcs: Vec<u32>,

    rtp_rtcp: Arc<RtpRtcp>,
    srtp: Arc<SrtpTransport>,
    dtls: Arc<DtlsTransport>,
    ice_adapter: Arc<IceAdapter>,

    congestion: Mutex<CongestionController>,
    logger: Arc<dyn LogSink>,
}

impl RtcSession {
    /// Build the session and its node chain. Nodes are linked and started
    /// before this returns so the DTLS handshake can begin as soon as ICE
    /// selects a transport.
    pub fn create(
        id: u32,
        stream: &Arc<RtcStream>,
        offer: SessionDescription,
        peer: SessionDescription,
        ice_port: &Arc<IcePort>,
        identity: DtlsIdentity,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let ssrc_list: Vec<(u32, u32)> = stream
            .tracks()
            .iter()
            .map(|t| (t.ssrc, t.clock_rate))
            .collect();
        let ssrcs: Vec<u32> = ssrc_list.iter().map(|(ssrc, _)| *ssrc).collect();
        let cname = format!("{}.{}", stream.app_name(), stream.name());

        let peer_fingerprint = peer
            .fingerprint
            .as_deref()
            .and_then(|fp| fp.split_whitespace().nth(1))
            .map(str::to_string);

        let total_bitrate: u32 = stream.tracks().iter().map(|t| t.bitrate_bps).sum();
        let initial_bitrate = total_bitrate.max(MIN_SESSION_BITRATE);

        let session = Arc::new_cyclic(|weak: &Weak<RtcSession>| {
            let rtp_rtcp = RtpRtcp::new(id * 10 + 1, weak.clone(), &ssrc_list, &cname, logger.clone());
            let srtp = SrtpTransport::new(id * 10 + 2, logger.clone());
            let dtls = DtlsTransport::new(
                id * 10 + 3,
                weak.clone(),
                Arc::clone(&srtp),
                identity,
                peer_fingerprint,
                logger.clone(),
            );
            let ice_adapter = IceAdapter::new(id * 10 + 4, Arc::downgrade(ice_port), logger.clone());

            Self {
                id,
                stream: Arc::downgrade(stream),
                offer,
                peer,
                state: Mutex::new(SessionState::Init),
                expiry_epoch_secs: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                ssrcs,
                rtp_rtcp,
                srtp,
                dtls,
                ice_adapter,
                congestion: Mutex::new(CongestionController::new(
                    initial_bitrate,
                    MIN_SESSION_BITRATE,
                    initial_bitrate.saturating_mul(2),
                    logger.clone(),
                )),
                logger,
            }
        });

        session.link_and_start();
        session.set_state(SessionState::Negotiated);
        session
    }

    fn link_and_start(&self) {
        let rtp_rtcp: Arc<dyn SessionNode> = self.rtp_rtcp.clone();
        let srtp: Arc<dyn SessionNode> = self.srtp.clone();
        let dtls: Arc<dyn SessionNode> = self.dtls.clone();
        let ice: Arc<dyn SessionNode> = self.ice_adapter.clone();
        link(&rtp_rtcp, &srtp);
        link(&srtp, &dtls);
        link(&dtls, &ice);

        self.ice_adapter.start();
        self.dtls.start_with_handshake();
        self.srtp.start();
        self.rtp_rtcp.start();
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn stream(&self) -> Option<Arc<RtcStream>> {
        self.stream.upgrade()
    }

    pub fn offer(&self) -> &SessionDescription {
        &self.offer
    }

    pub fn peer_description(&self) -> &SessionDescription {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state.lock().map(|s| *s).unwrap_or(SessionState::Closed)
    }

    pub fn set_expiry(&self, epoch_secs: u64) {
        self.expiry_epoch_secs.store(epoch_secs, Ordering::SeqCst);
    }

    pub fn expiry(&self) -> u64 {
        self.expiry_epoch_secs.load(Ordering::SeqCst)
    }

    /// Advisory expiry: breached once the wall clock passes the deadline.
    pub fn is_expired(&self) -> bool {
        let expiry = self.expiry();
        expiry > 0 && clock::wall_clock_secs() > expiry
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn current_bitrate(&self) -> u32 {
        self.congestion
            .lock()
            .map(|c| c.current_bitrate())
            .unwrap_or(0)
    }

    /// Registered with the ICE port: connectivity checks may now arrive.
    pub fn on_ice_registered(&self) {
        self.set_state(SessionState::IceChecking);
    }

    /// First authenticated binding selected the remote candidate.
    pub fn on_ice_transport_selected(&self, addr: SocketAddr) {
        self.ice_adapter.set_transport(addr);
        self.set_state(SessionState::Connected);
    }

    /// Terminal ICE states mirror into the session; the publisher decides
    /// on teardown from its message thread.
    pub fn on_ice_state_changed(&self, state: IceConnectionState) {
        match state {
            IceConnectionState::Failed
            | IceConnectionState::Disconnected
            | IceConnectionState::Closed => self.set_state(SessionState::Failed),
            _ => {}
        }
    }

    pub fn on_dtls_result(&self, established: bool) {
        if established {
            sink_info!(&self.logger, "[Session] {} secured", self.id);
        } else {
            sink_warn!(&self.logger, "[Session] {} DTLS failed", self.id);
            self.set_state(SessionState::Failed);
        }
    }

    /// Media from the stream fan-out. Success means the packet entered the
    /// pipeline; packets sent before connectivity are dropped quietly.
    pub fn send_media(&self, packet: &RtpPacket) -> bool {
        if self.is_stopped() {
            return false;
        }
        match self.state() {
            SessionState::Connected => {
                self.set_state(SessionState::Streaming);
            }
            SessionState::Streaming => {}
            _ => return false,
        }
        self.rtp_rtcp.send_outgoing_data(packet)
    }

    /// Decrypted STUN/app data handed up by the ICE port.
    pub fn receive_from_lower(&self, data: Bytes) {
        self.ice_adapter
            .on_data_received(crate::pipeline::NodeType::Ice, data);
    }

    /// Parsed RTCP records dispatched by the RtpRtcp node.
    pub fn on_rtcp_received(&self, record: &RtcpRecord) {
        match record {
            RtcpRecord::Rr(rr) => self.feed_report_blocks(&rr.reports),
            RtcpRecord::Sr(sr) => self.feed_report_blocks(&sr.reports),
            RtcpRecord::Bye(bye) => {
                sink_debug!(
                    &self.logger,
                    "[Session] {} received BYE for {:?}",
                    self.id,
                    bye.ssrcs
                );
            }
            _ => {}
        }
    }

    fn feed_report_blocks(&self, reports: &[crate::rtcp::ReportBlock]) {
        for rb in reports {
            if !self.ssrcs.contains(&rb.ssrc) {
                continue;
            }
            if let Ok(mut congestion) = self.congestion.lock() {
                congestion.on_report_block(rb);
            }
        }
    }

    /// Cancellation primitive: callable from any thread, idempotent.
    ///
    /// Back-references are released first so nothing delivers upward into a
    /// half-torn-down session, then nodes stop bottom-up. Returns true for
    /// the call that actually performed the stop.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.ice_adapter.stop();
        self.dtls.stop();
        self.srtp.stop();
        self.rtp_rtcp.stop();
        self.set_state(SessionState::Closed);
        sink_info!(&self.logger, "[Session] {} stopped", self.id);
        true
    }

    fn set_state(&self, next: SessionState) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let current = *state;
        if current == SessionState::Closed {
            return; // terminal
        }
        let allowed = matches!(
            (current, next),
            (SessionState::Init, SessionState::Negotiated)
                | (SessionState::Negotiated, SessionState::IceChecking)
                | (SessionState::IceChecking, SessionState::Connected)
                | (SessionState::Connected, SessionState::Streaming)
                | (
                    SessionState::IceChecking
                        | SessionState::Connected
                        | SessionState::Streaming,
                    SessionState::Failed,
                )
                | (_, SessionState::Closed)
        );
        if allowed {
            *state = next;
        }
    }

    #[cfg(test)]
    pub(crate) fn rtp_rtcp_node(&self) -> &Arc<RtpRtcp> {
        &self.rtp_rtcp
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::publisher::track::{CodecId, MediaTrack};
    use crate::rtp::RtpPacket;

    fn harness() -> (Arc<RtcStream>, Arc<IcePort>, Arc<RtcSession>) {
        let logger: Arc<dyn LogSink> = Arc::new(NoopLogSink);
        let stream = RtcStream::new(
            "app",
            "stream1",
            "rtsp://origin/app/stream1",
            vec![MediaTrack::new(0, CodecId::H264, 90_000, 2_000_000, 0xAB, 96)],
            None,
            logger.clone(),
        );
        // Ephemeral media port; nothing is sent in these tests.
        let port = IcePort::create(logger.clone(), "127.0.0.1", 0, &[]).unwrap();

        let mut offer = stream.description();
        offer.set_origin("streamedge", 7, "127.0.0.1");
        offer.ice_ufrag = "localUf".into();
        offer.ice_pwd = "localPwdLocalPwdLocalPwd".into();
        let mut answer = SessionDescription::new("-");
        answer.set_origin("-", 1, "0.0.0.0");
        answer.ice_ufrag = "remoteUf".into();

        let identity = DtlsIdentity {
            cert_path: "certs/dtls/cert.pem".into(),
            key_path: "certs/dtls/key.pem".into(),
        };
        let session = RtcSession::create(7, &stream, offer, answer, &port, identity, logger);
        (stream, port, session)
    }

    #[test]
    fn state_walks_through_the_machine() {
        let (_stream, _port, session) = harness();
        assert_eq!(session.state(), SessionState::Negotiated);
        session.on_ice_registered();
        assert_eq!(session.state(), SessionState::IceChecking);
        session.on_ice_transport_selected("127.0.0.1:5000".parse().unwrap());
        assert_eq!(session.state(), SessionState::Connected);

        let packet = RtpPacket::build(96, false, 0, 0, 0xAB, &[], b"frame").unwrap();
        session.send_media(&packet);
        assert_eq!(session.state(), SessionState::Streaming);

        session.stop();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn media_before_connectivity_is_dropped() {
        let (_stream, _port, session) = harness();
        let packet = RtpPacket::build(96, false, 0, 0, 0xAB, &[], b"frame").unwrap();
        assert!(!session.send_media(&packet));
        assert_eq!(session.rtp_rtcp_node().sr_counts(0xAB), Some((0, 0)));
    }

    #[test]
    fn sr_accounting_tracks_every_delivered_packet() {
        let (_stream, _port, session) = harness();
        session.on_ice_registered();
        session.on_ice_transport_selected("127.0.0.1:5000".parse().unwrap());

        for seq in 0..100u16 {
            let packet =
                RtpPacket::build(96, false, seq, 0, 0xAB, &[], &vec![0u8; 50]).unwrap();
            // SRTP has no keys yet so the packet dies there, but the SR
            // bookkeeping happens above that layer.
            session.send_media(&packet);
        }
        assert_eq!(session.rtp_rtcp_node().sr_counts(0xAB), Some((100, 5_000)));
    }

    #[test]
    fn stop_is_idempotent_and_terminal() {
        let (_stream, _port, session) = harness();
        assert!(session.stop());
        assert!(!session.stop());
        assert!(session.is_stopped());

        // deliveries after stop are swallowed by the stopped nodes
        session.receive_from_lower(Bytes::from_static(&[22, 1, 2, 3]));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn ice_failure_marks_failed_from_checking() {
        let (_stream, _port, session) = harness();
        session.on_ice_registered();
        session.on_ice_state_changed(IceConnectionState::Failed);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn expiry_is_advisory_and_observable() {
        let (_stream, _port, session) = harness();
        assert!(!session.is_expired());
        session.set_expiry(1); // 1970: long past
        assert!(session.is_expired());
        session.set_expiry(clock::wall_clock_secs() + 3_600);
        assert!(!session.is_expired());
    }
}
