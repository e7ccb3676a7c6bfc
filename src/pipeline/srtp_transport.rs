//! SRTP layer of the session chain: protects RTP/RTCP on the way down,
//! unprotects on the way up. Drops traffic until DTLS installs keys.

use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::pipeline::node::{NodeBase, NodeType, SessionNode};
use crate::srtp::{SrtpContext, SrtpSessionConfig};
use crate::{sink_debug, sink_trace, sink_warn};

pub struct SrtpTransport {
    base: NodeBase,
    outbound: Mutex<Option<SrtpContext>>,
    inbound: Mutex<Option<SrtpContext>>,
    logger: Arc<dyn LogSink>,
}

impl SrtpTransport {
    pub fn new(id: u32, logger: Arc<dyn LogSink>) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(id, NodeType::Srtp),
            outbound: Mutex::new(None),
            inbound: Mutex::new(None),
            logger,
        })
    }

    /// Called by the DTLS node once the handshake exported key material.
    pub fn install_keys(&self, config: &SrtpSessionConfig) {
        if let Ok(mut outbound) = self.outbound.lock() {
            *outbound = Some(SrtpContext::new(self.logger.clone(), &config.outbound));
        }
        if let Ok(mut inbound) = self.inbound.lock() {
            *inbound = Some(SrtpContext::new(self.logger.clone(), &config.inbound));
        }
        sink_debug!(&self.logger, "[SRTP] session keys installed");
    }

    pub fn has_keys(&self) -> bool {
        self.outbound
            .lock()
            .map(|guard| guard.is_some())
            .unwrap_or(false)
    }

    /// RFC 5761 demux on the receive path: RTCP packet types land in
    /// 64..=95 after masking the marker bit.
    fn looks_like_rtcp(data: &[u8]) -> bool {
        data.len() > 1 && (64..=95).contains(&(data[1] & 0x7F))
    }
}

impl SessionNode for SrtpTransport {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn send_data(&self, to_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        let Some(lower) = self.base.lower() else {
            return false;
        };

        let mut packet = data.to_vec();
        {
            let Ok(mut outbound) = self.outbound.lock() else {
                return false;
            };
            let Some(context) = outbound.as_mut() else {
                // Handshake not finished yet; media cannot leave in the clear.
                sink_trace!(&self.logger, "[SRTP] dropping egress before keys");
                return false;
            };
            let protected = match to_type {
                NodeType::Rtp => context.protect_rtp(&mut packet),
                NodeType::Rtcp => context.protect_rtcp(&mut packet),
                _ => Ok(()),
            };
            if let Err(e) = protected {
                sink_warn!(&self.logger, "[SRTP] protect failed: {e}");
                return false;
            }
        }
        lower.send_data(to_type, Bytes::from(packet))
    }

    fn on_data_received(&self, _from_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        let Some(upper) = self.base.upper() else {
            return false;
        };

        let mut packet = data.to_vec();
        let is_rtcp = Self::looks_like_rtcp(&packet);
        {
            let Ok(mut inbound) = self.inbound.lock() else {
                return false;
            };
            let Some(context) = inbound.as_mut() else {
                sink_trace!(&self.logger, "[SRTP] dropping ingress before keys");
                return false;
            };
            let result = if is_rtcp {
                context.unprotect_rtcp(&mut packet)
            } else {
                context.unprotect_rtp(&mut packet)
            };
            if let Err(e) = result {
                sink_warn!(&self.logger, "[SRTP] unprotect failed: {e}");
                return false;
            }
        }

        if is_rtcp {
            upper.on_data_received(NodeType::Rtcp, Bytes::from(packet))
        } else {
            // Egress sessions are sendonly; viewer RTP has nowhere to go.
            sink_trace!(&self.logger, "[SRTP] ignoring inbound RTP on sendonly session");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn rtcp_demux_by_payload_type() {
        // RTCP SR: pt 200 -> second byte 200
        assert!(SrtpTransport::looks_like_rtcp(&[0x80, 200]));
        // RTP pt 96, marker set -> byte 224
        assert!(!SrtpTransport::looks_like_rtcp(&[0x80, 224]));
        // RTP pt 96, no marker
        assert!(!SrtpTransport::looks_like_rtcp(&[0x80, 96]));
    }
}
