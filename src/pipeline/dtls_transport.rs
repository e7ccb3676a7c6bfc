//! DTLS layer of the session chain.
//!
//! SRTP packets pass straight through in both directions; only DTLS records
//! (first byte 20..=63) are consumed here, feeding the handshake that runs
//! on a per-session worker. On completion the exported keys are installed
//! into the SRTP node bound at construction.

use std::sync::{
    Arc, Mutex, RwLock, Weak,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::dtls::{DatagramChannel, DtlsIdentity, DtlsRole, run_dtls_handshake};
use crate::log::log_sink::LogSink;
use crate::pipeline::node::{NodeBase, NodeType, SessionNode};
use crate::pipeline::srtp_transport::SrtpTransport;
use crate::publisher::session::RtcSession;
use crate::{sink_debug, sink_error};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);

pub struct DtlsTransport {
    base: NodeBase,
    logger: Arc<dyn LogSink>,
    identity: DtlsIdentity,
    /// Pinned from the answer SDP `a=fingerprint:` line.
    peer_fingerprint: Option<String>,
    srtp: Arc<SrtpTransport>,
    session: RwLock<Option<Weak<RtcSession>>>,
    channel: Mutex<Option<DatagramChannel>>,
    established: AtomicBool,
    handshake: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DtlsTransport {
    pub fn new(
        id: u32,
        session: Weak<RtcSession>,
        srtp: Arc<SrtpTransport>,
        identity: DtlsIdentity,
        peer_fingerprint: Option<String>,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            base: NodeBase::new(id, NodeType::Dtls),
            logger,
            identity,
            peer_fingerprint,
            srtp,
            session: RwLock::new(Some(session)),
            channel: Mutex::new(None),
            established: AtomicBool::new(false),
            handshake: Mutex::new(None),
        })
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::SeqCst)
    }

    fn spawn_handshake(self: &Arc<Self>) {
        // The lower link must exist before start so handshake flights can
        // leave through the ICE adapter.
        let Some(lower) = self.base.lower() else {
            self.base.mark_error();
            return;
        };
        let lower_weak = Arc::downgrade(&lower);
        let channel = DatagramChannel::new(
            Box::new(move |bytes: Bytes| {
                lower_weak
                    .upgrade()
                    .map(|node| node.send_data(NodeType::Dtls, bytes))
                    .unwrap_or(false)
            }),
            HANDSHAKE_TIMEOUT,
        );
        if let Ok(mut slot) = self.channel.lock() {
            *slot = Some(channel.clone());
        }

        let this = Arc::clone(self);
        let handle = thread::Builder::new()
            .name(format!("dtls-hs-{}", self.base.id()))
            .spawn(move || {
                let result = run_dtls_handshake(
                    channel,
                    DtlsRole::Server,
                    &this.identity,
                    this.peer_fingerprint.clone(),
                    this.logger.clone(),
                );
                let session = this
                    .session
                    .read()
                    .ok()
                    .and_then(|slot| slot.as_ref().and_then(Weak::upgrade));
                match result {
                    Ok(config) => {
                        this.srtp.install_keys(&config);
                        this.established.store(true, Ordering::SeqCst);
                        if let Some(session) = session {
                            session.on_dtls_result(true);
                        }
                    }
                    Err(e) => {
                        sink_error!(&this.logger, "[DTLS] handshake failed: {e}");
                        this.base.mark_error();
                        if let Some(session) = session {
                            session.on_dtls_result(false);
                        }
                    }
                }
            })
            .ok();
        if let Ok(mut slot) = self.handshake.lock() {
            *slot = handle;
        }
    }

    /// `start()` lives on the trait but the handshake worker needs an
    /// `Arc<Self>`; sessions call this right after linking the chain.
    pub fn start_with_handshake(self: &Arc<Self>) -> bool {
        if !self.base.transition_started() {
            return false;
        }
        self.spawn_handshake();
        true
    }
}

impl SessionNode for DtlsTransport {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    /// SRTP bypasses the DTLS record layer on the way down.
    fn send_data(&self, to_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }
        let Some(lower) = self.base.lower() else {
            return false;
        };
        lower.send_data(to_type, data)
    }

    fn on_data_received(&self, from_type: NodeType, data: Bytes) -> bool {
        if !self.base.is_started() {
            self.base.count_dropped();
            return false;
        }

        match data.first() {
            Some(20..=63) => {
                if self.is_established() {
                    // Post-handshake records (re-handshake, close_notify) are
                    // not supported on the egress path.
                    sink_debug!(&self.logger, "[DTLS] record after establishment ignored");
                    return true;
                }
                let channel = self.channel.lock().ok().and_then(|slot| slot.clone());
                match channel {
                    Some(channel) => {
                        channel.push_incoming(data.to_vec());
                        true
                    }
                    None => false,
                }
            }
            _ => match self.base.upper() {
                Some(upper) => upper.on_data_received(from_type, data),
                None => false,
            },
        }
    }

    fn stop(&self) -> bool {
        if let Ok(mut session) = self.session.write() {
            *session = None;
        }
        if let Ok(slot) = self.channel.lock() {
            if let Some(channel) = slot.as_ref() {
                channel.close();
            }
        }
        let handle = self.handshake.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        self.base.transition_stopped()
    }
}
