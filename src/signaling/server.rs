//! Signalling listener shell: plain and TLS acceptors plus the typed
//! message dispatcher. WebSocket framing is handled by an external layer
//! that drains accepted connections and feeds decoded messages through
//! [`SignallingServer::dispatch`].

use std::{
    collections::{HashMap, VecDeque},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::{
        Arc, Mutex, RwLock, Weak,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use rustls::{ServerConfig, ServerConnection, StreamOwned};

use crate::log::log_sink::LogSink;
use crate::sdp::SessionDescription;
use crate::signaling::messages::{RequestContext, SignalMessage, SignalReply};
use crate::signaling::observer::SignalObserver;
use crate::signaling::signaling_error::SignalingError;
use crate::{sink_debug, sink_info, sink_warn};

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const PENDING_CAP: usize = 256;

/// An accepted signalling connection, TLS already layered where applicable.
pub enum SignalConnection {
    Plain(TcpStream),
    Tls(Box<StreamOwned<ServerConnection, TcpStream>>),
}

struct PendingQueue {
    queue: Mutex<VecDeque<SignalConnection>>,
}

impl PendingQueue {
    fn push(&self, connection: SignalConnection) -> bool {
        let Ok(mut queue) = self.queue.lock() else {
            return false;
        };
        if queue.len() >= PENDING_CAP {
            return false;
        }
        queue.push_back(connection);
        true
    }

    fn pop(&self) -> Option<SignalConnection> {
        self.queue.lock().ok().and_then(|mut queue| queue.pop_front())
    }
}

pub struct SignallingServer {
    logger: Arc<dyn LogSink>,
    observers: RwLock<Vec<Weak<dyn SignalObserver>>>,
    /// Offers issued through this server, so an answer can be matched to
    /// the offer it belongs to.
    issued_offers: Mutex<HashMap<u32, SessionDescription>>,
    pending: Arc<PendingQueue>,
    run_flag: Arc<AtomicBool>,
    acceptors: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl SignallingServer {
    pub fn new(logger: Arc<dyn LogSink>) -> Self {
        Self {
            logger,
            observers: RwLock::new(Vec::new()),
            issued_offers: Mutex::new(HashMap::new()),
            pending: Arc::new(PendingQueue {
                queue: Mutex::new(VecDeque::new()),
            }),
            run_flag: Arc::new(AtomicBool::new(false)),
            acceptors: Mutex::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Weak<dyn SignalObserver>) {
        if let Ok(mut observers) = self.observers.write() {
            observers.push(observer);
        }
    }

    pub fn remove_observers(&self) {
        if let Ok(mut observers) = self.observers.write() {
            observers.clear();
        }
    }

    /// Bind the configured listeners. The TLS listener binds the TLS
    /// address; a failure on either rolls the whole start back.
    pub fn start(
        &self,
        plain_addr: Option<SocketAddr>,
        tls_addr: Option<SocketAddr>,
        tls_config: Option<Arc<ServerConfig>>,
        worker_count: usize,
    ) -> Result<(), SignalingError> {
        if plain_addr.is_none() && tls_addr.is_none() {
            return Err(SignalingError::NoListener);
        }
        self.run_flag.store(true, Ordering::SeqCst);
        let mut handles = Vec::new();

        if let Some(addr) = plain_addr {
            let listener = bind(addr)?;
            for worker in 0..worker_count.max(1) {
                let listener = listener.try_clone().map_err(|source| SignalingError::Bind {
                    addr: addr.to_string(),
                    source,
                })?;
                handles.push(self.spawn_acceptor(listener, None, worker));
            }
            sink_info!(&self.logger, "[Signalling] listening on {}", addr);
        }

        if let Some(addr) = tls_addr {
            let config = tls_config
                .ok_or_else(|| SignalingError::Tls("TLS listener without a TLS config".into()))?;
            let listener = bind(addr)?;
            for worker in 0..worker_count.max(1) {
                let listener = listener.try_clone().map_err(|source| SignalingError::Bind {
                    addr: addr.to_string(),
                    source,
                })?;
                handles.push(self.spawn_acceptor(listener, Some(Arc::clone(&config)), worker));
            }
            sink_info!(&self.logger, "[Signalling] listening on TLS: {}", addr);
        }

        if let Ok(mut acceptors) = self.acceptors.lock() {
            acceptors.extend(handles.into_iter().flatten());
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.run_flag.store(false, Ordering::SeqCst);
        let handles: Vec<_> = self
            .acceptors
            .lock()
            .map(|mut acceptors| acceptors.drain(..).collect())
            .unwrap_or_default();
        for handle in handles {
            let _ = handle.join();
        }
    }

    /// Take one accepted connection for the WebSocket layer to drive.
    pub fn take_connection(&self) -> Option<SignalConnection> {
        self.pending.pop()
    }

    fn spawn_acceptor(
        &self,
        listener: TcpListener,
        tls: Option<Arc<ServerConfig>>,
        worker: usize,
    ) -> Option<thread::JoinHandle<()>> {
        let run_flag = Arc::clone(&self.run_flag);
        let pending = Arc::clone(&self.pending);
        let logger = self.logger.clone();
        let _ = listener.set_nonblocking(true);

        thread::Builder::new()
            .name(format!("signal-accept-{worker}"))
            .spawn(move || {
                while run_flag.load(Ordering::SeqCst) {
                    match listener.accept() {
                        Ok((stream, from)) => {
                            let _ = stream.set_nonblocking(false);
                            let connection = match &tls {
                                None => Some(SignalConnection::Plain(stream)),
                                Some(config) => match ServerConnection::new(Arc::clone(config)) {
                                    Ok(conn) => Some(SignalConnection::Tls(Box::new(
                                        StreamOwned::new(conn, stream),
                                    ))),
                                    Err(e) => {
                                        sink_warn!(&logger, "[Signalling] TLS setup failed: {e}");
                                        None
                                    }
                                },
                            };
                            if let Some(connection) = connection {
                                if !pending.push(connection) {
                                    sink_warn!(
                                        &logger,
                                        "[Signalling] pending queue full, dropping {}",
                                        from
                                    );
                                }
                            }
                        }
                        Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                            thread::sleep(ACCEPT_POLL);
                        }
                        Err(e) => {
                            sink_warn!(&logger, "[Signalling] accept error: {e}");
                            thread::sleep(ACCEPT_POLL);
                        }
                    }
                }
            })
            .ok()
    }

    /// Route one decoded message to the observer surface.
    pub fn dispatch(&self, context: &RequestContext, message: SignalMessage) -> SignalReply {
        let Some(observer) = self.first_observer() else {
            return SignalReply::Denied("no signalling observer attached".into());
        };

        match message {
            SignalMessage::RequestOffer {
                application,
                stream,
            } => match observer.on_request_offer(context, &application, &stream) {
                Ok(response) => {
                    if let Ok(mut issued) = self.issued_offers.lock() {
                        issued.insert(response.session_id, response.sdp.clone());
                    }
                    SignalReply::Offer {
                        session_id: response.session_id,
                        sdp: response.sdp,
                        candidates: response.candidates,
                    }
                }
                Err(e) => SignalReply::Denied(e.to_string()),
            },

            SignalMessage::Answer {
                application,
                stream,
                session_id,
                sdp,
            } => {
                let offer = self
                    .issued_offers
                    .lock()
                    .ok()
                    .and_then(|issued| issued.get(&session_id).cloned());
                let Some(offer) = offer else {
                    return SignalReply::Denied(format!("unknown session id {session_id}"));
                };
                let answer = match SessionDescription::parse(&sdp) {
                    Ok(answer) => answer,
                    Err(e) => return SignalReply::Denied(format!("bad answer sdp: {e}")),
                };
                match observer.on_add_remote_description(
                    context,
                    &application,
                    &stream,
                    &offer,
                    &answer,
                ) {
                    Ok(()) => SignalReply::Accepted,
                    Err(e) => SignalReply::Denied(e.to_string()),
                }
            }

            SignalMessage::Candidate {
                application,
                stream,
                session_id,
                candidate,
            } => {
                observer.on_ice_candidate(&application, &stream, session_id, &candidate);
                SignalReply::Accepted
            }

            SignalMessage::Stop {
                application,
                stream,
                session_id,
            } => {
                if let Ok(mut issued) = self.issued_offers.lock() {
                    issued.remove(&session_id);
                }
                match observer.on_stop_command(&application, &stream, session_id) {
                    Ok(()) => SignalReply::Accepted,
                    Err(e) => SignalReply::Denied(e.to_string()),
                }
            }

            SignalMessage::BitrateRequest {
                application,
                stream,
            } => {
                let bitrate = observer.on_get_bitrate(&application, &stream);
                sink_debug!(
                    &self.logger,
                    "[Signalling] bitrate request {}/{} -> {}",
                    application,
                    stream,
                    bitrate
                );
                SignalReply::Bitrate(bitrate)
            }
        }
    }

    fn first_observer(&self) -> Option<Arc<dyn SignalObserver>> {
        self.observers
            .read()
            .ok()?
            .iter()
            .find_map(Weak::upgrade)
    }
}

fn bind(addr: SocketAddr) -> Result<TcpListener, SignalingError> {
    TcpListener::bind(addr).map_err(|source| SignalingError::Bind {
        addr: addr.to_string(),
        source,
    })
}
