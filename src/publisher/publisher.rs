//! The WebRTC egress publisher: signalling listeners, the shared ICE port,
//! the per-viewer session lifecycle and the operator statistics around it.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread;
use std::time::Duration;

use bytes::Bytes;

use crate::config::PublisherConfig;
use crate::dtls::{DtlsIdentity, certificate_fingerprint};
use crate::ice::{IceConnectionState, IcePort, IcePortObserver};
use crate::log::log_sink::LogSink;
use crate::publisher::application::{OriginConnector, RtcApplication};
use crate::publisher::error::PublisherError;
use crate::publisher::message_thread::{DisconnectReason, MessageThread, PublisherMessage};
use crate::publisher::session::RtcSession;
use crate::publisher::signed_policy::{
    CheckSignatureResult, check_signed_policy, check_signed_token,
};
use crate::publisher::stream::RtcStream;
use crate::publisher::track::MediaTrack;
use crate::sdp::SessionDescription;
use crate::signaling::{
    OfferResponse, RequestContext, SignalObserver, SignallingServer, tls,
};
use crate::stats::{ACTION_CREATE_SESSION, ACTION_DELETE_SESSION, StatLog};
use crate::{sink_debug, sink_error, sink_info, sink_warn};

/// Budget for a requested stream to become ready to serve.
const STREAM_READY_TIMEOUT_MS: u64 = 3_000;
/// Telemetry and expiry sweep cadence.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

pub struct RtcPublisher {
    config: PublisherConfig,
    logger: Arc<dyn LogSink>,
    stats: Arc<StatLog>,
    identity: DtlsIdentity,
    dtls_fingerprint: Mutex<Option<String>>,

    signalling: SignallingServer,
    ice_port: Mutex<Option<Arc<IcePort>>>,
    applications: RwLock<HashMap<String, Arc<RtcApplication>>>,

    /// Publisher-scoped monotonic allocator for offer session ids.
    last_issued_session_id: AtomicU32,
    connected_sessions: AtomicU64,

    message_thread: MessageThread,
    /// Session ids with a disconnect queued but not yet handled.
    pending_disconnects: Mutex<HashSet<u32>>,
    timer_run: Arc<AtomicBool>,
    timer: Mutex<Option<thread::JoinHandle<()>>>,
    running: AtomicBool,
}

impl RtcPublisher {
    pub fn new(config: PublisherConfig, logger: Arc<dyn LogSink>, stats: Arc<StatLog>) -> Arc<Self> {
        let identity = DtlsIdentity {
            cert_path: config.dtls_cert_path.clone(),
            key_path: config.dtls_key_path.clone(),
        };
        Arc::new(Self {
            signalling: SignallingServer::new(logger.clone()),
            identity,
            dtls_fingerprint: Mutex::new(None),
            config,
            logger,
            stats,
            ice_port: Mutex::new(None),
            applications: RwLock::new(HashMap::new()),
            last_issued_session_id: AtomicU32::new(0),
            connected_sessions: AtomicU64::new(0),
            message_thread: MessageThread::new(),
            pending_disconnects: Mutex::new(HashSet::new()),
            timer_run: Arc::new(AtomicBool::new(false)),
            timer: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    /// Bring up signalling and ICE. Any failure rolls back the servers
    /// created so far and returns the error.
    pub fn start(self: &Arc<Self>) -> Result<(), PublisherError> {
        let plain_addr = socket_addr(&self.config.bind_ip, self.config.signalling_port);
        let tls_addr = socket_addr(&self.config.bind_ip, self.config.signalling_tls_port);
        if plain_addr.is_none() && tls_addr.is_none() {
            return Err(PublisherError::SignallingStart(
                "no signalling port configured".into(),
            ));
        }

        let tls_config = match (&tls_addr, &self.config.tls_cert_path, &self.config.tls_key_path) {
            (Some(_), Some(cert), Some(key)) => Some(
                tls::build_signalling_server_config(cert, key)
                    .map_err(|e| PublisherError::SignallingStart(e.to_string()))?,
            ),
            (Some(_), _, _) => {
                return Err(PublisherError::SignallingStart(
                    "TLS port configured without certificate material".into(),
                ));
            }
            _ => None,
        };

        let observer: Weak<dyn SignalObserver> = Arc::downgrade(&(self.clone() as Arc<dyn SignalObserver>));
        self.signalling.add_observer(observer);
        self.signalling
            .start(
                plain_addr,
                tls_addr,
                tls_config,
                self.config.worker_count,
            )
            .map_err(|e| PublisherError::SignallingStart(e.to_string()))?;

        let ice_port = match IcePort::create(
            self.logger.clone(),
            &self.config.bind_ip,
            self.config.media_port,
            &self.config.ice_candidate_ips,
        ) {
            Ok(port) => port,
            Err(e) => {
                // Roll back servers created so far.
                sink_error!(
                    &self.logger,
                    "[Publisher] could not initialize the ICE port, stopping signalling: {e}"
                );
                self.signalling.remove_observers();
                self.signalling.stop();
                return Err(e.into());
            }
        };
        let ice_observer: Weak<dyn IcePortObserver> = Arc::downgrade(&(self.clone() as Arc<dyn IcePortObserver>));
        ice_port.set_observer(ice_observer);
        ice_port.start();
        if let Ok(mut slot) = self.ice_port.lock() {
            *slot = Some(ice_port);
        }

        match certificate_fingerprint(&self.identity.cert_path) {
            Ok(fp) => {
                if let Ok(mut slot) = self.dtls_fingerprint.lock() {
                    *slot = Some(fp);
                }
            }
            Err(e) => {
                sink_warn!(
                    &self.logger,
                    "[Publisher] DTLS certificate fingerprint unavailable: {e}"
                );
            }
        }

        let weak = Arc::downgrade(self);
        self.message_thread.start(move |message| {
            if let Some(publisher) = weak.upgrade() {
                publisher.on_message(message);
            }
        });

        self.start_timer();
        self.running.store(true, Ordering::SeqCst);
        sink_info!(
            &self.logger,
            "[Publisher] {} started (plain {:?}, tls {:?})",
            self.config.server_name,
            plain_addr,
            tls_addr
        );
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.timer_run.store(false, Ordering::SeqCst);
        let timer = self.timer.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = timer {
            let _ = handle.join();
        }

        // Stop every remaining session before the transports go away.
        for application in self.applications_snapshot() {
            for stream in application.streams_snapshot() {
                for session in stream.tear_down() {
                    self.finish_session_teardown(&session, DisconnectReason::StreamTearDown);
                }
            }
        }

        if let Some(port) = self.ice_port() {
            port.stop();
        }
        self.signalling.remove_observers();
        self.signalling.stop();
        self.message_thread.stop();
        sink_info!(&self.logger, "[Publisher] stopped");
    }

    pub fn signalling_server(&self) -> &SignallingServer {
        &self.signalling
    }

    pub fn connected_sessions(&self) -> u64 {
        self.connected_sessions.load(Ordering::Relaxed)
    }

    pub fn create_application(
        &self,
        name: &str,
        origin: Option<Arc<dyn OriginConnector>>,
    ) -> Arc<RtcApplication> {
        let application = RtcApplication::new(name, origin, self.logger.clone());
        if let Ok(mut applications) = self.applications.write() {
            applications.insert(name.to_string(), Arc::clone(&application));
        }
        application
    }

    pub fn get_application(&self, name: &str) -> Option<Arc<RtcApplication>> {
        self.applications
            .read()
            .ok()
            .and_then(|applications| applications.get(name).cloned())
    }

    /// Register a native (locally published) stream.
    pub fn create_stream(
        &self,
        app_name: &str,
        stream_name: &str,
        media_source: &str,
        tracks: Vec<MediaTrack>,
    ) -> Result<Arc<RtcStream>, PublisherError> {
        let application = self
            .get_application(app_name)
            .ok_or_else(|| PublisherError::NotFound {
                what: "application",
                name: app_name.to_string(),
            })?;
        let fingerprint = self.sdp_fingerprint();
        let stream = RtcStream::new(
            app_name,
            stream_name,
            media_source,
            tracks,
            fingerprint,
            self.logger.clone(),
        );
        application.add_stream(Arc::clone(&stream));
        Ok(stream)
    }

    /// Queue a session teardown onto the message thread; never re-enters
    /// ICE or stream locks from the caller's context.
    ///
    /// Per-session deduplication: an ICE failure and the expiry sweep can
    /// both decide to disconnect the same session before the first message
    /// drains. The second request is a logged no-op, and a post that the
    /// message thread refuses (stopped, queue gone) is logged rather than
    /// silently discarded.
    pub fn disconnect_session(&self, session: Arc<RtcSession>, reason: DisconnectReason) -> bool {
        let session_id = session.id();
        {
            let Ok(mut pending) = self.pending_disconnects.lock() else {
                return false;
            };
            if !pending.insert(session_id) {
                sink_debug!(
                    &self.logger,
                    "[Publisher] disconnect already queued for session {} ({:?})",
                    session_id,
                    reason
                );
                return true;
            }
        }

        if self
            .message_thread
            .post(PublisherMessage::DisconnectSession { session, reason })
        {
            true
        } else {
            sink_warn!(
                &self.logger,
                "[Publisher] disconnect for session {} ({:?}) lost: message thread unavailable",
                session_id,
                reason
            );
            if let Ok(mut pending) = self.pending_disconnects.lock() {
                pending.remove(&session_id);
            }
            false
        }
    }

    fn on_message(&self, message: PublisherMessage) {
        match message {
            PublisherMessage::DisconnectSession { session, reason } => {
                if let Ok(mut pending) = self.pending_disconnects.lock() {
                    pending.remove(&session.id());
                }
                if let Some(port) = self.ice_port() {
                    port.remove_session(session.id());
                }
                self.disconnect_session_internal(&session, reason);
            }
        }
    }

    fn disconnect_session_internal(&self, session: &Arc<RtcSession>, reason: DisconnectReason) {
        if let Some(stream) = session.stream() {
            stream.remove_session(session.id());
        }
        self.finish_session_teardown(session, reason);
    }

    fn finish_session_teardown(&self, session: &Arc<RtcSession>, reason: DisconnectReason) {
        // stop() returns true exactly once; stats must not double-count.
        if !session.stop() {
            return;
        }
        let stream_name = session
            .stream()
            .map(|s| s.name().to_string())
            .unwrap_or_default();
        self.stats
            .session(ACTION_DELETE_SESSION, &stream_name, session.id());
        self.connected_sessions.fetch_sub(1, Ordering::Relaxed);
        sink_info!(
            &self.logger,
            "[Publisher] session {} disconnected ({:?})",
            session.id(),
            reason
        );
    }

    fn start_timer(self: &Arc<Self>) {
        self.timer_run.store(true, Ordering::SeqCst);
        let run = Arc::clone(&self.timer_run);
        let weak = Arc::downgrade(self);
        let handle = thread::Builder::new()
            .name("publisher-timer".into())
            .spawn(move || {
                while run.load(Ordering::SeqCst) {
                    thread::sleep(MAINTENANCE_INTERVAL);
                    let Some(publisher) = weak.upgrade() else {
                        break;
                    };
                    publisher.on_timer_tick();
                }
            })
            .ok();
        if let Ok(mut slot) = self.timer.lock() {
            *slot = handle;
        }
    }

    /// 1 Hz maintenance: connection-count telemetry plus the expiry and
    /// failed-session sweep (≤1 s granularity as promised to callers).
    fn on_timer_tick(self: &Arc<Self>) {
        self.stats.conn_count(self.connected_sessions());

        for application in self.applications_snapshot() {
            for stream in application.streams_snapshot() {
                for session in stream.sessions() {
                    if session.is_expired() {
                        self.disconnect_session(session, DisconnectReason::Expired);
                    } else if session.state() == crate::publisher::session::SessionState::Failed {
                        self.disconnect_session(session, DisconnectReason::IceFailure);
                    }
                }
            }
        }
    }

    fn applications_snapshot(&self) -> Vec<Arc<RtcApplication>> {
        self.applications
            .read()
            .map(|applications| applications.values().cloned().collect())
            .unwrap_or_default()
    }

    fn ice_port(&self) -> Option<Arc<IcePort>> {
        self.ice_port.lock().ok().and_then(|slot| slot.clone())
    }

    fn sdp_fingerprint(&self) -> Option<String> {
        self.dtls_fingerprint
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|fp| format!("sha-256 {fp}")))
    }

    /// Shared admission gate: signed policy first, signed token when the
    /// policy check is off. Returns the granted expiry (0 = none).
    fn check_admission(&self, context: &RequestContext) -> Result<u64, PublisherError> {
        let (policy_result, policy) =
            check_signed_policy(&context.url, self.config.policy_secret.as_deref());
        match policy_result {
            CheckSignatureResult::Error => {
                return Err(PublisherError::SignaturePolicyFail(policy.err_message));
            }
            CheckSignatureResult::Fail => {
                sink_warn!(&self.logger, "{}", policy.err_message);
                return Err(PublisherError::SignaturePolicyFail(policy.err_message));
            }
            CheckSignatureResult::Pass => return Ok(policy.expire_epoch_secs),
            CheckSignatureResult::Off => {}
        }

        let (token_result, token) =
            check_signed_token(&context.url, self.config.token_secret.as_deref());
        match token_result {
            CheckSignatureResult::Error => {
                Err(PublisherError::SignatureTokenFail(token.err_message))
            }
            CheckSignatureResult::Fail => {
                sink_warn!(&self.logger, "{}", token.err_message);
                Err(PublisherError::SignatureTokenFail(token.err_message))
            }
            CheckSignatureResult::Pass => Ok(token.expire_epoch_secs),
            CheckSignatureResult::Off => Ok(0),
        }
    }

    fn find_stream(
        &self,
        context: &RequestContext,
        app_name: &str,
        stream_name: &str,
    ) -> Result<(Arc<RtcApplication>, Arc<RtcStream>), PublisherError> {
        let application = self
            .get_application(app_name)
            .ok_or_else(|| PublisherError::NotFound {
                what: "application",
                name: app_name.to_string(),
            })?;

        if let Some(stream) = application.get_stream(stream_name) {
            return Ok((application, stream));
        }

        // Not local: ask the origin side to pull it to this edge.
        match application.pull_stream(stream_name) {
            Some(stream) => {
                self.stats
                    .request(app_name, stream.media_source(), &context.remote);
                sink_info!(&self.logger, "URL {} is requested", stream.media_source());
                Ok((application, stream))
            }
            None => {
                sink_error!(
                    &self.logger,
                    "Cannot find stream ({}/{})",
                    app_name,
                    stream_name
                );
                Err(PublisherError::NotFound {
                    what: "stream",
                    name: format!("{app_name}/{stream_name}"),
                })
            }
        }
    }
}

impl SignalObserver for RtcPublisher {
    fn on_request_offer(
        &self,
        context: &RequestContext,
        application: &str,
        stream: &str,
    ) -> Result<OfferResponse, PublisherError> {
        self.check_admission(context)?;

        let (_, stream) = self.find_stream(context, application, stream)?;

        if !stream.wait_until_started(STREAM_READY_TIMEOUT_MS) {
            sink_warn!(
                &self.logger,
                "({}/{}) stream has not started.",
                application,
                stream.name()
            );
            return Err(PublisherError::StreamNotReady {
                app: application.to_string(),
                stream: stream.name().to_string(),
            });
        }

        let Some(port) = self.ice_port() else {
            return Err(PublisherError::SessionCreateFailed(
                "publisher is not started".into(),
            ));
        };

        let session_id = self.last_issued_session_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut sdp = stream.description();
        sdp.set_origin(&self.config.server_name, u64::from(session_id), "127.0.0.1");
        sdp.ice_ufrag = port.generate_ufrag();
        sdp.ice_pwd = port.generate_pwd();
        if sdp.fingerprint.is_none() {
            sdp.fingerprint = self.sdp_fingerprint();
        }

        Ok(OfferResponse {
            session_id,
            sdp,
            candidates: port.candidates().to_vec(),
        })
    }

    fn on_add_remote_description(
        &self,
        context: &RequestContext,
        application: &str,
        stream: &str,
        offer: &SessionDescription,
        answer: &SessionDescription,
    ) -> Result<(), PublisherError> {
        // The pull already happened at offer time; an answer for a stream
        // that is no longer here is simply refused.
        let app = self
            .get_application(application)
            .ok_or_else(|| PublisherError::NotFound {
                what: "application",
                name: application.to_string(),
            })?;
        let stream = app.get_stream(stream).ok_or_else(|| {
            sink_error!(
                &self.logger,
                "Cannot find stream ({}/{})",
                application,
                stream
            );
            PublisherError::NotFound {
                what: "stream",
                name: stream.to_string(),
            }
        })?;
        let session_expiry = self.check_admission(context)?;

        let Some(port) = self.ice_port() else {
            return Err(PublisherError::SessionCreateFailed(
                "publisher is not started".into(),
            ));
        };

        let session = RtcSession::create(
            offer.session_id() as u32,
            &stream,
            offer.clone(),
            answer.clone(),
            &port,
            self.identity.clone(),
            self.logger.clone(),
        );
        if session_expiry != 0 {
            session.set_expiry(session_expiry);
        }

        stream.add_session(Arc::clone(&session));
        port.add_session(&session, offer, answer);

        self.stats
            .session(ACTION_CREATE_SESSION, stream.name(), session.id());
        self.connected_sessions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_stop_command(
        &self,
        application: &str,
        stream: &str,
        session_id: u32,
    ) -> Result<(), PublisherError> {
        sink_info!(
            &self.logger,
            "Stop command received : {}/{}/{}",
            application,
            stream,
            session_id
        );
        let app = self
            .get_application(application)
            .ok_or_else(|| PublisherError::NotFound {
                what: "application",
                name: application.to_string(),
            })?;
        let stream = app.get_stream(stream).ok_or_else(|| PublisherError::NotFound {
            what: "stream",
            name: stream.to_string(),
        })?;
        let session = stream
            .get_session(session_id)
            .ok_or_else(|| PublisherError::NotFound {
                what: "session",
                name: session_id.to_string(),
            })?;

        self.disconnect_session_internal(&session, DisconnectReason::ClientStop);
        if let Some(port) = self.ice_port() {
            port.remove_session(session_id);
        }
        Ok(())
    }

    fn on_ice_candidate(
        &self,
        _application: &str,
        _stream: &str,
        _session_id: u32,
        _candidate: &str,
    ) -> bool {
        // Candidates are advertised from configured host addresses only.
        true
    }

    fn on_get_bitrate(&self, application: &str, stream: &str) -> u32 {
        let Some(app) = self.get_application(application) else {
            return 0;
        };
        let Some(stream) = app.get_stream(stream) else {
            sink_error!(
                &self.logger,
                "Cannot find stream ({}/{})",
                application,
                stream
            );
            return 0;
        };
        stream
            .tracks()
            .iter()
            .filter(|t| t.codec.peer_supported())
            .map(|t| t.bitrate_bps)
            .sum()
    }
}

impl IcePortObserver for RtcPublisher {
    fn on_ice_state_changed(&self, session: Arc<RtcSession>, state: IceConnectionState) {
        session.on_ice_state_changed(state);
        match state {
            IceConnectionState::Failed
            | IceConnectionState::Disconnected
            | IceConnectionState::Closed => {
                let stream_name = session
                    .stream()
                    .map(|s| format!("{}/{}", s.app_name(), s.name()))
                    .unwrap_or_default();
                sink_info!(
                    &self.logger,
                    "IcePort is disconnected. : ({}/{}) reason({:?})",
                    stream_name,
                    session.id(),
                    state
                );
                self.disconnect_session(session, DisconnectReason::IceFailure);
            }
            _ => {}
        }
    }

    fn on_ice_data(&self, session: Arc<RtcSession>, data: Bytes) {
        let application = session
            .stream()
            .and_then(|stream| self.get_application(stream.app_name()));
        match application {
            Some(application) => application.push_incoming_packet(&session, data),
            None => session.receive_from_lower(data),
        }
    }
}

fn socket_addr(ip: &str, port: u16) -> Option<SocketAddr> {
    if port == 0 {
        return None;
    }
    format!("{ip}:{port}").parse().ok()
}
