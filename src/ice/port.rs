//! Shared ICE port: owns the media UDP socket, answers STUN connectivity
//! checks and demultiplexes inbound datagrams (STUN vs DTLS vs SRTP) onto
//! the owning sessions.
//!
//! Routing is two-level: STUN binding requests carry the local ufrag in
//! their USERNAME, data packets are matched by the remote 5-tuple learned
//! from the first authenticated binding.

use std::{
    collections::HashMap,
    net::{SocketAddr, UdpSocket},
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use bytes::Bytes;
use rand::{Rng, distributions::Alphanumeric};

use crate::ice::candidate::IceCandidate;
use crate::ice::ice_error::IceError;
use crate::ice::stun::{self, StunClass, StunMessage};
use crate::log::log_sink::LogSink;
use crate::publisher::session::RtcSession;
use crate::sdp::session_description::SessionDescription;
use crate::{sink_debug, sink_info, sink_warn};

/// Connectivity as mirrored into the owning sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

/// Delivered from the port's own worker; implementations must not block.
pub trait IcePortObserver: Send + Sync {
    fn on_ice_state_changed(&self, session: Arc<RtcSession>, state: IceConnectionState);
    fn on_ice_data(&self, session: Arc<RtcSession>, data: Bytes);
}

const RECV_TIMEOUT: Duration = Duration::from_millis(500);
/// Per-session budget to produce a first authenticated binding.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Consent freshness: no valid binding for this long drops the session.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(30);

struct IceSessionEntry {
    session: Weak<RtcSession>,
    session_id: u32,
    local_pwd: String,
    remote_ufrag: String,
    state: IceConnectionState,
    registered_at: Instant,
    last_binding_at: Option<Instant>,
}

#[derive(Default)]
struct RoutingTable {
    by_ufrag: HashMap<String, IceSessionEntry>,
    by_addr: HashMap<SocketAddr, String>,
}

pub struct IcePort {
    logger: Arc<dyn LogSink>,
    socket: Arc<UdpSocket>,
    candidates: Vec<IceCandidate>,
    observer: RwLock<Option<Weak<dyn IcePortObserver>>>,
    table: Mutex<RoutingTable>,
    run_flag: Arc<AtomicBool>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    dropped_datagrams: AtomicU64,
}

impl IcePort {
    /// Bind the media socket and build the advertised candidate list.
    pub fn create(
        logger: Arc<dyn LogSink>,
        bind_ip: &str,
        media_port: u16,
        candidate_ips: &[String],
    ) -> Result<Arc<Self>, IceError> {
        let bind_addr = format!("{bind_ip}:{media_port}");
        let socket = UdpSocket::bind(&bind_addr).map_err(|source| IceError::Bind {
            addr: bind_addr.clone(),
            source,
        })?;
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(IceError::Socket)?;

        let mut candidates = Vec::new();
        if candidate_ips.is_empty() {
            if let Ok(addr) = format!("{bind_ip}:{media_port}").parse() {
                candidates.push(IceCandidate::host(addr));
            }
        } else {
            for ip in candidate_ips {
                if let Ok(addr) = format!("{ip}:{media_port}").parse() {
                    candidates.push(IceCandidate::host(addr));
                }
            }
        }

        sink_info!(
            &logger,
            "[ICE] port bound on {} with {} candidate(s)",
            bind_addr,
            candidates.len()
        );

        Ok(Arc::new(Self {
            logger,
            socket: Arc::new(socket),
            candidates,
            observer: RwLock::new(None),
            table: Mutex::new(RoutingTable::default()),
            run_flag: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            dropped_datagrams: AtomicU64::new(0),
        }))
    }

    pub fn set_observer(&self, observer: Weak<dyn IcePortObserver>) {
        if let Ok(mut slot) = self.observer.write() {
            *slot = Some(observer);
        }
    }

    pub fn candidates(&self) -> &[IceCandidate] {
        &self.candidates
    }

    pub fn dropped_datagrams(&self) -> u64 {
        self.dropped_datagrams.load(Ordering::Relaxed)
    }

    /// Fresh random ufrag, unique among registered sessions.
    pub fn generate_ufrag(&self) -> String {
        loop {
            let ufrag: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(8)
                .map(char::from)
                .collect();
            let Ok(table) = self.table.lock() else {
                return ufrag;
            };
            if !table.by_ufrag.contains_key(&ufrag) {
                return ufrag;
            }
        }
    }

    pub fn generate_pwd(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect()
    }

    /// Register a session under the ufrag pair from its offer/answer.
    pub fn add_session(
        &self,
        session: &Arc<RtcSession>,
        offer: &SessionDescription,
        answer: &SessionDescription,
    ) {
        let local_ufrag = offer.ice_ufrag.clone();
        let entry = IceSessionEntry {
            session: Arc::downgrade(session),
            session_id: session.id(),
            local_pwd: offer.ice_pwd.clone(),
            remote_ufrag: answer.ice_ufrag.clone(),
            state: IceConnectionState::Checking,
            registered_at: Instant::now(),
            last_binding_at: None,
        };
        if let Ok(mut table) = self.table.lock() {
            table.by_ufrag.insert(local_ufrag.clone(), entry);
        }
        session.on_ice_registered();
        sink_debug!(
            &self.logger,
            "[ICE] session {} registered (ufrag {})",
            session.id(),
            local_ufrag
        );
    }

    /// Unregister; safe to call repeatedly (later calls are no-ops).
    pub fn remove_session(&self, session_id: u32) -> bool {
        let Ok(mut table) = self.table.lock() else {
            return false;
        };
        let Some(ufrag) = table
            .by_ufrag
            .iter()
            .find(|(_, e)| e.session_id == session_id)
            .map(|(u, _)| u.clone())
        else {
            return false;
        };
        table.by_ufrag.remove(&ufrag);
        table.by_addr.retain(|_, u| *u != ufrag);
        sink_debug!(&self.logger, "[ICE] session {} unregistered", session_id);
        true
    }

    pub fn send_to(&self, addr: SocketAddr, data: &[u8]) -> bool {
        self.socket.send_to(data, addr).is_ok()
    }

    pub fn start(self: &Arc<Self>) {
        if self.run_flag.swap(true, Ordering::SeqCst) {
            return;
        }
        let port = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("ice-port-worker".into())
            .spawn(move || port.run_worker())
            .ok();
        if let Ok(mut worker) = self.worker.lock() {
            *worker = handle;
        }
    }

    pub fn stop(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
        let handle = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    fn run_worker(self: Arc<Self>) {
        let mut buf = [0u8; 2048];
        let mut last_sweep = Instant::now();

        while self.run_flag.load(Ordering::SeqCst) {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => self.dispatch(&buf[..n], from),
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    sink_warn!(&self.logger, "[ICE] recv error: {e}");
                }
            }

            if last_sweep.elapsed() >= Duration::from_secs(1) {
                self.sweep_timeouts();
                last_sweep = Instant::now();
            }
        }
    }

    /// RFC 7983 first-byte demux: STUN < 4, DTLS 20..=63, RTP/RTCP 128..=191.
    fn dispatch(self: &Arc<Self>, datagram: &[u8], from: SocketAddr) {
        match datagram.first() {
            Some(b) if *b < 4 && stun::is_stun(datagram) => self.handle_stun(datagram, from),
            Some(20..=63) | Some(128..=191) => self.handle_data(datagram, from),
            _ => {
                self.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn handle_stun(self: &Arc<Self>, datagram: &[u8], from: SocketAddr) {
        let Ok(message) = StunMessage::decode(datagram) else {
            self.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
            return;
        };
        if message.class != StunClass::Request || message.method != stun::METHOD_BINDING {
            // responses/indications need no action on the lite side
            return;
        }

        // USERNAME is "local-ufrag:remote-ufrag"
        let Some(local_ufrag) = message
            .username()
            .and_then(|u| u.split(':').next())
            .map(str::to_string)
        else {
            self.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let mut notification = None;
        let response;
        {
            let Ok(mut table) = self.table.lock() else {
                return;
            };
            let Some(entry) = table.by_ufrag.get_mut(&local_ufrag) else {
                sink_debug!(
                    &self.logger,
                    "[ICE] binding request for unknown ufrag {} from {}",
                    local_ufrag,
                    from
                );
                return;
            };

            match stun::verify_integrity(datagram, entry.local_pwd.as_bytes()) {
                Ok(true) => {}
                _ => {
                    sink_warn!(
                        &self.logger,
                        "[ICE] binding request failed integrity check (ufrag {})",
                        local_ufrag
                    );
                    return;
                }
            }

            entry.last_binding_at = Some(Instant::now());
            response = StunMessage::binding_success(message.transaction_id, from)
                .encode(Some(entry.local_pwd.as_bytes()));

            if matches!(
                entry.state,
                IceConnectionState::New | IceConnectionState::Checking
            ) {
                entry.state = IceConnectionState::Connected;
                if let Some(session) = entry.session.upgrade() {
                    session.on_ice_transport_selected(from);
                    notification = Some((session, IceConnectionState::Connected));
                }
                sink_info!(
                    &self.logger,
                    "[ICE] session {} connected via {} (remote ufrag {})",
                    entry.session_id,
                    from,
                    entry.remote_ufrag
                );
            }
            table.by_addr.insert(from, local_ufrag);
        }

        self.send_to(from, &response);
        if let Some((session, state)) = notification {
            self.notify_state(session, state);
        }
    }

    fn handle_data(self: &Arc<Self>, datagram: &[u8], from: SocketAddr) {
        let session = {
            let Ok(table) = self.table.lock() else {
                return;
            };
            table
                .by_addr
                .get(&from)
                .and_then(|ufrag| table.by_ufrag.get(ufrag))
                .and_then(|entry| entry.session.upgrade())
        };

        match session {
            Some(session) => {
                if let Some(observer) = self.observer() {
                    observer.on_ice_data(session, Bytes::copy_from_slice(datagram));
                }
            }
            None => {
                self.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn sweep_timeouts(self: &Arc<Self>) {
        let mut notifications = Vec::new();
        {
            let Ok(mut table) = self.table.lock() else {
                return;
            };
            for entry in table.by_ufrag.values_mut() {
                let next_state = match entry.state {
                    IceConnectionState::Checking
                        if entry.registered_at.elapsed() > CONNECT_TIMEOUT =>
                    {
                        Some(IceConnectionState::Failed)
                    }
                    IceConnectionState::Connected | IceConnectionState::Completed => {
                        match entry.last_binding_at {
                            Some(at) if at.elapsed() > CONSENT_TIMEOUT => {
                                Some(IceConnectionState::Disconnected)
                            }
                            _ => None,
                        }
                    }
                    _ => None,
                };
                if let Some(state) = next_state {
                    entry.state = state;
                    if let Some(session) = entry.session.upgrade() {
                        notifications.push((session, state));
                    }
                }
            }
        }
        for (session, state) in notifications {
            sink_info!(
                &self.logger,
                "[ICE] session {} moved to {:?}",
                session.id(),
                state
            );
            self.notify_state(session, state);
        }
    }

    fn observer(&self) -> Option<Arc<dyn IcePortObserver>> {
        self.observer
            .read()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(Weak::upgrade))
    }

    fn notify_state(&self, session: Arc<RtcSession>, state: IceConnectionState) {
        if let Some(observer) = self.observer() {
            observer.on_ice_state_changed(session, state);
        }
    }
}
