//! Top of the session chain: egress RTP with concurrent RTCP sender-report
//! generation, ingress RTCP parse + dispatch to the owning session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::pipeline::node::{NodeBase, NodeType, SessionNode};
use crate::publisher::session::RtcSession;
use crate::rtcp::{RtcpRecord, RtcpSrGenerator};
use crate::rtp::RtpPacket;
use crate::{sink_debug, sink_warn};

pub struct RtpRtcp {
    base: NodeBase,
    /// Weak back-reference to the owning session; write-held only by stop.
    session: RwLock<Option<Weak<RtcSession>>>,
    /// Keyed by egress SSRC; built once at session construction.
    sr_generators: HashMap<u32, Mutex<RtcpSrGenerator>>,
    logger: Arc<dyn LogSink>,
}

impl RtpRtcp {
    pub fn new(
        id: u32,
        session: Weak<RtcSession>,
        ssrc_list: &[(u32, u32)], // (ssrc, clock rate)
        cname: &str,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let mut sr_generators = HashMap::new();
        for (ssrc, clock_rate) in ssrc_list {
            sr_generators.insert(
                *ssrc,
                Mutex::new(RtcpSrGenerator::new(*ssrc, *clock_rate, cname)),
            );
        }
        Arc::new(Self {
            base: NodeBase::new(id, NodeType::Rtp),
            session: RwLock::new(Some(session)),
            sr_generators,
            logger,
        })
    }

    /// Egress entry point, called by the stream fan-out.
    ///
    /// Returns success iff the RTP forward succeeded; a failed SR forward is
    /// logged but does not fail the media packet.
    pub fn send_outgoing_data(&self, packet: &RtpPacket) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        let Some(lower) = self.base.lower() else {
            return false;
        };

        if let Some(generator) = self.sr_generators.get(&packet.ssrc()) {
            if let Ok(mut generator) = generator.lock() {
                generator.on_rtp_sent(packet.timestamp(), packet.payload_len());
                if let Some(sr) = generator.pop_sr() {
                    if !lower.send_data(NodeType::Rtcp, sr) {
                        sink_debug!(
                            &self.logger,
                            "[RTCP] SR send failed: ssrc({})",
                            packet.ssrc()
                        );
                    }
                }
            }
        }

        lower.send_data(NodeType::Rtp, packet.data().clone())
    }

    #[cfg(test)]
    pub(crate) fn sr_counts(&self, ssrc: u32) -> Option<(u32, u32)> {
        self.sr_generators
            .get(&ssrc)
            .and_then(|g| g.lock().ok())
            .map(|g| (g.packet_count(), g.octet_count()))
    }
}

impl SessionNode for RtpRtcp {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    /// Nothing above this node pushes through the generic path.
    fn send_data(&self, _to_type: NodeType, _data: Bytes) -> bool {
        true
    }

    /// Decrypted RTCP from SRTP; the receive path ends here.
    fn on_data_received(&self, _from_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }

        let records = match RtcpRecord::decode_compound(&data) {
            Ok(records) => records,
            Err(e) => {
                sink_warn!(&self.logger, "[RTCP] malformed compound dropped: {e}");
                return false;
            }
        };

        for record in records {
            // Reader lock only around the dispatch, never across I/O.
            let session = self
                .session
                .read()
                .ok()
                .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));
            match session {
                Some(session) => session.on_rtcp_received(&record),
                None => return true, // detached mid-teardown: drop silently
            }
        }
        true
    }

    fn stop(&self) -> bool {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
        self.base.transition_stopped()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;
    use crate::pipeline::node::link;

    struct CaptureNode {
        base: NodeBase,
        seen: Mutex<Vec<(NodeType, Bytes)>>,
    }

    impl CaptureNode {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                base: NodeBase::new(99, NodeType::Srtp),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn seen(&self) -> Vec<(NodeType, Bytes)> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl SessionNode for CaptureNode {
        fn base(&self) -> &NodeBase {
            &self.base
        }
        fn send_data(&self, to_type: NodeType, data: Bytes) -> bool {
            self.seen.lock().unwrap().push((to_type, data));
            true
        }
        fn on_data_received(&self, _from_type: NodeType, _data: Bytes) -> bool {
            true
        }
    }

    fn node_with_lower() -> (Arc<RtpRtcp>, Arc<CaptureNode>) {
        let node = RtpRtcp::new(
            1,
            Weak::new(),
            &[(0xAA, 90_000)],
            "cname",
            Arc::new(NoopLogSink),
        );
        let lower = CaptureNode::new();
        let node_dyn: Arc<dyn SessionNode> = node.clone();
        let lower_dyn: Arc<dyn SessionNode> = lower.clone();
        link(&node_dyn, &lower_dyn);
        node.start();
        lower.start();
        (node, lower)
    }

    fn packet(seq: u16, payload_len: usize) -> RtpPacket {
        RtpPacket::build(96, false, seq, 1_000, 0xAA, &[], &vec![0u8; payload_len]).unwrap()
    }

    #[test]
    fn counts_advance_per_packet_and_rtp_forwards_in_order() {
        let (node, lower) = node_with_lower();
        for seq in 0..1_000u16 {
            assert!(node.send_outgoing_data(&packet(seq, 200)));
        }
        assert_eq!(node.sr_counts(0xAA), Some((1_000, 200_000)));

        let rtp: Vec<Bytes> = lower
            .seen()
            .into_iter()
            .filter(|(t, _)| *t == NodeType::Rtp)
            .map(|(_, d)| d)
            .collect();
        assert_eq!(rtp.len(), 1_000);
        // same order the stream handed them in
        for (i, wire) in rtp.iter().enumerate() {
            let parsed = RtpPacket::parse(wire.clone()).unwrap();
            assert_eq!(parsed.sequence_number(), i as u16);
        }
    }

    #[test]
    fn unknown_ssrc_has_no_generator_but_still_forwards() {
        let (node, lower) = node_with_lower();
        let other = RtpPacket::build(96, false, 1, 2, 0xBB, &[], b"x").unwrap();
        assert!(node.send_outgoing_data(&other));
        assert_eq!(lower.seen().len(), 1);
        assert_eq!(node.sr_counts(0xAA), Some((0, 0)));
    }

    #[test]
    fn egress_fails_without_lower_node() {
        let node = RtpRtcp::new(
            1,
            Weak::new(),
            &[(0xAA, 90_000)],
            "cname",
            Arc::new(NoopLogSink),
        );
        node.start();
        assert!(!node.send_outgoing_data(&packet(0, 10)));
    }

    #[test]
    fn traffic_before_start_is_dropped_silently() {
        let node = RtpRtcp::new(1, Weak::new(), &[], "cname", Arc::new(NoopLogSink));
        assert!(!node.on_data_received(NodeType::Srtp, Bytes::from_static(b"xx")));
        assert_eq!(node.base().dropped_not_started(), 1);
    }

    #[test]
    fn malformed_compound_is_rejected() {
        let (node, _lower) = node_with_lower();
        assert!(!node.on_data_received(NodeType::Srtp, Bytes::from_static(&[0x80, 0x00, 0x00])));
    }
}
