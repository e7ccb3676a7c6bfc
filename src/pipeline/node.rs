//! The per-session pipeline contract.
//!
//! A session owns an ordered chain of nodes (RtpRtcp at the top, the ICE
//! adapter at the bottom). `send_data` moves bytes toward the socket,
//! `on_data_received` moves them back up. Links are weak in both directions;
//! ownership stays with the session.

use std::sync::{
    Arc, Mutex, RwLock, Weak,
    atomic::{AtomicU64, Ordering},
};

use bytes::Bytes;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Rtp,
    Rtcp,
    Srtp,
    Dtls,
    Ice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Ready,
    Started,
    Stopped,
    Error,
}

pub trait SessionNode: Send + Sync {
    fn base(&self) -> &NodeBase;

    /// Hand bytes to the lower node, tagged with their semantic type so a
    /// multiplexing node (SRTP) can tell RTP from RTCP.
    fn send_data(&self, to_type: NodeType, data: Bytes) -> bool;

    /// Bytes arriving from the lower node on the receive path.
    fn on_data_received(&self, from_type: NodeType, data: Bytes) -> bool;

    fn id(&self) -> u32 {
        self.base().id
    }

    fn node_type(&self) -> NodeType {
        self.base().node_type
    }

    fn state(&self) -> NodeState {
        self.base().state()
    }

    fn start(&self) -> bool {
        self.base().transition_started()
    }

    fn stop(&self) -> bool {
        self.base().transition_stopped()
    }
}

/// Shared id/state/link bookkeeping every node embeds.
pub struct NodeBase {
    id: u32,
    node_type: NodeType,
    state: Mutex<NodeState>,
    upper: RwLock<Option<Weak<dyn SessionNode>>>,
    lower: RwLock<Option<Weak<dyn SessionNode>>>,
    dropped_not_started: AtomicU64,
}

impl NodeBase {
    pub fn new(id: u32, node_type: NodeType) -> Self {
        Self {
            id,
            node_type,
            state: Mutex::new(NodeState::Ready),
            upper: RwLock::new(None),
            lower: RwLock::new(None),
            dropped_not_started: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> NodeState {
        self.state.lock().map(|s| *s).unwrap_or(NodeState::Error)
    }

    pub fn is_started(&self) -> bool {
        self.state() == NodeState::Started
    }

    /// Ready -> Started; anything else is refused.
    pub fn transition_started(&self) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if *state == NodeState::Ready {
            *state = NodeState::Started;
            true
        } else {
            false
        }
    }

    /// Idempotent. Releases both links so the graph can collect.
    pub fn transition_stopped(&self) -> bool {
        if let Ok(mut state) = self.state.lock() {
            *state = NodeState::Stopped;
        }
        self.clear_links();
        true
    }

    pub fn mark_error(&self) {
        if let Ok(mut state) = self.state.lock() {
            *state = NodeState::Error;
        }
    }

    pub fn set_upper(&self, node: Weak<dyn SessionNode>) {
        if let Ok(mut upper) = self.upper.write() {
            *upper = Some(node);
        }
    }

    pub fn set_lower(&self, node: Weak<dyn SessionNode>) {
        if let Ok(mut lower) = self.lower.write() {
            *lower = Some(node);
        }
    }

    pub fn upper(&self) -> Option<Arc<dyn SessionNode>> {
        self.upper
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    pub fn lower(&self) -> Option<Arc<dyn SessionNode>> {
        self.lower
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    pub fn clear_links(&self) {
        if let Ok(mut upper) = self.upper.write() {
            *upper = None;
        }
        if let Ok(mut lower) = self.lower.write() {
            *lower = None;
        }
    }

    /// Traffic seen outside Started is dropped silently but counted.
    pub fn count_dropped(&self) {
        self.dropped_not_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped_not_started(&self) -> u64 {
        self.dropped_not_started.load(Ordering::Relaxed)
    }
}

/// Wire two adjacent nodes together (upper above lower).
pub fn link(upper: &Arc<dyn SessionNode>, lower: &Arc<dyn SessionNode>) {
    upper.base().set_lower(Arc::downgrade(lower));
    lower.base().set_upper(Arc::downgrade(upper));
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    struct EchoNode {
        base: NodeBase,
    }

    impl SessionNode for EchoNode {
        fn base(&self) -> &NodeBase {
            &self.base
        }
        fn send_data(&self, _to_type: NodeType, _data: Bytes) -> bool {
            self.base.is_started()
        }
        fn on_data_received(&self, _from_type: NodeType, _data: Bytes) -> bool {
            if !self.base.is_started() {
                self.base.count_dropped();
                return false;
            }
            true
        }
    }

    fn node() -> Arc<EchoNode> {
        Arc::new(EchoNode {
            base: NodeBase::new(1, NodeType::Srtp),
        })
    }

    #[test]
    fn lifecycle_ready_started_stopped() {
        let n = node();
        assert_eq!(n.state(), NodeState::Ready);
        assert!(n.start());
        assert_eq!(n.state(), NodeState::Started);
        assert!(!n.start(), "start is not re-entrant");
        assert!(n.stop());
        assert!(n.stop(), "stop is idempotent");
        assert_eq!(n.state(), NodeState::Stopped);
    }

    #[test]
    fn data_before_start_dropped_and_counted() {
        let n = node();
        assert!(!n.on_data_received(NodeType::Ice, Bytes::from_static(b"x")));
        assert_eq!(n.base().dropped_not_started(), 1);
        n.start();
        assert!(n.on_data_received(NodeType::Ice, Bytes::from_static(b"x")));
        assert_eq!(n.base().dropped_not_started(), 1);
    }

    #[test]
    fn stop_releases_links() {
        let a = node();
        let b = node();
        let a_dyn: Arc<dyn SessionNode> = a.clone();
        let b_dyn: Arc<dyn SessionNode> = b.clone();
        link(&a_dyn, &b_dyn);
        assert!(a.base().lower().is_some());
        assert!(b.base().upper().is_some());
        a.stop();
        assert!(a.base().lower().is_none());
    }
}
