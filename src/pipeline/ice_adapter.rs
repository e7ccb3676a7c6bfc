//! Bottom of the session chain: bridges the per-session pipeline onto the
//! shared ICE port. Outbound datagrams go to the selected remote candidate;
//! inbound ones are injected upward by the session.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use crate::ice::IcePort;
use crate::log::log_sink::LogSink;
use crate::pipeline::node::{NodeBase, NodeType, SessionNode};
use crate::sink_trace;

pub struct IceAdapter {
    base: NodeBase,
    port: Weak<IcePort>,
    /// Remote transport address learned from the first valid binding.
    transport: Mutex<Option<SocketAddr>>,
    logger: Arc<dyn LogSink>,
}

impl IceAdapter {
    pub fn new(id: u32, port: Weak<IcePort>, logger: Arc<dyn LogSink>) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(id, NodeType::Ice),
            port,
            transport: Mutex::new(None),
            logger,
        })
    }

    pub fn set_transport(&self, addr: SocketAddr) {
        if let Ok(mut transport) = self.transport.lock() {
            *transport = Some(addr);
        }
    }

    pub fn transport(&self) -> Option<SocketAddr> {
        self.transport.lock().ok().and_then(|t| *t)
    }
}

impl SessionNode for IceAdapter {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn send_data(&self, _to_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        let Some(addr) = self.transport() else {
            // No nominated pair yet; nothing can leave.
            sink_trace!(&self.logger, "[ICE] egress before candidate selection dropped");
            return false;
        };
        let Some(port) = self.port.upgrade() else {
            return false;
        };
        port.send_to(addr, &data)
    }

    fn on_data_received(&self, _from_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        match self.base.upper() {
            Some(upper) => upper.on_data_received(NodeType::Ice, data),
            None => false,
        }
    }
}
