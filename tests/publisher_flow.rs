//! End-to-end publisher flows over the signalling observer surface:
//! offer allocation, session creation, stop, expiry and failure teardown.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use streamedge::config::PublisherConfig;
use streamedge::ice::IceConnectionState;
use streamedge::log::NoopLogSink;
use streamedge::publisher::{CodecId, MediaTrack, PublisherError, RtcPublisher, RtcStream};
use streamedge::sdp::SessionDescription;
use streamedge::signaling::{RequestContext, SignalObserver};
use streamedge::stats::StatLog;

static NEXT_PORT: AtomicU16 = AtomicU16::new(0);

fn alloc_ports() -> (u16, u16) {
    let n = NEXT_PORT.fetch_add(1, Ordering::SeqCst);
    let base = 21000 + (std::process::id() % 5000) as u16 + n * 11;
    (base, base + 5)
}

fn test_config(policy_secret: Option<String>) -> PublisherConfig {
    let (signal_port, media_port) = alloc_ports();
    PublisherConfig {
        server_name: "streamedge".into(),
        bind_ip: "127.0.0.1".into(),
        signalling_port: signal_port,
        signalling_tls_port: 0,
        worker_count: 1,
        media_port,
        ice_candidate_ips: vec![],
        tls_cert_path: None,
        tls_key_path: None,
        dtls_cert_path: "certs/dtls/cert.pem".into(),
        dtls_key_path: "certs/dtls/key.pem".into(),
        policy_secret,
        token_secret: None,
        segment_count: 3,
        segment_duration_ms: 5_000,
    }
}

struct TestServer {
    publisher: Arc<RtcPublisher>,
    stream: Arc<RtcStream>,
    stat_dir: PathBuf,
}

impl TestServer {
    fn start(policy_secret: Option<String>, mark_started: bool) -> Self {
        let stat_dir = std::env::temp_dir().join(format!(
            "streamedge-test-{}-{}",
            std::process::id(),
            NEXT_PORT.fetch_add(1, Ordering::SeqCst)
        ));
        let stats = Arc::new(StatLog::start_in_dir(&stat_dir, "test", 256));
        let publisher = RtcPublisher::new(test_config(policy_secret), Arc::new(NoopLogSink), stats);
        publisher.create_application("app", None);
        publisher.start().expect("publisher should start");

        let tracks = vec![
            MediaTrack::new(0, CodecId::H264, 90_000, 2_500_000, 0x0101_0101, 96),
            MediaTrack::new(1, CodecId::Opus, 48_000, 64_000, 0x0202_0202, 111),
        ];
        let stream = publisher
            .create_stream("app", "stream1", "rtsp://origin/app/stream1", tracks)
            .unwrap();
        if mark_started {
            stream.mark_started();
        }

        Self {
            publisher,
            stream,
            stat_dir,
        }
    }

    fn stat_lines_matching(&self, needle: &str) -> usize {
        let path = self.stat_dir.join("test-stat.log");
        fs::read_to_string(path)
            .map(|content| content.lines().filter(|l| l.contains(needle)).count())
            .unwrap_or(0)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.publisher.stop();
        let _ = fs::remove_dir_all(&self.stat_dir);
    }
}

fn context(url: &str) -> RequestContext {
    RequestContext {
        url: url.to_string(),
        remote: "10.0.0.9:5555".to_string(),
    }
}

fn peer_answer() -> SessionDescription {
    let mut answer = SessionDescription::new("-");
    answer.set_origin("-", 1, "0.0.0.0");
    answer.ice_ufrag = "peerUfrag".into();
    answer.ice_pwd = "peerPwdPeerPwdPeerPwd".into();
    answer.setup = Some("active".into());
    answer
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn signed_policy_url(secret: &str, expire_epoch_secs: u64) -> String {
    type HmacSha256 = Hmac<Sha256>;
    let base = format!("ws://edge/app/stream1?policy=expire:{expire_epoch_secs}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(base.as_bytes());
    format!("{base}&signature={}", hex::encode(mac.finalize().into_bytes()))
}

#[test]
fn offer_ids_are_monotonic_with_fresh_ufrags() {
    let server = TestServer::start(None, true);
    let ctx = context("ws://edge/app/stream1");

    let first = server
        .publisher
        .on_request_offer(&ctx, "app", "stream1")
        .unwrap();
    let second = server
        .publisher
        .on_request_offer(&ctx, "app", "stream1")
        .unwrap();

    assert_eq!(second.session_id, first.session_id + 1);
    assert_ne!(first.sdp.ice_ufrag, second.sdp.ice_ufrag);
    assert_eq!(first.sdp.session_id(), u64::from(first.session_id));
    assert!(!first.candidates.is_empty());
    assert_eq!(first.sdp.media.len(), 2);

    // the rendered offer parses back to the same media sections,
    // advertised ufrag and origin session id
    let reparsed = SessionDescription::parse(&first.sdp.to_string()).unwrap();
    assert_eq!(reparsed.media, first.sdp.media);
    assert_eq!(reparsed.ice_ufrag, first.sdp.ice_ufrag);
    assert_eq!(reparsed.session_id(), u64::from(first.session_id));
}

#[test]
fn unready_stream_fails_after_wait_budget() {
    let server = TestServer::start(None, false);
    let ctx = context("ws://edge/app/stream1");

    let started = Instant::now();
    let result = server.publisher.on_request_offer(&ctx, "app", "stream1");
    let waited = started.elapsed();

    assert!(matches!(result, Err(PublisherError::StreamNotReady { .. })));
    assert!(waited >= Duration::from_millis(2_900));
    assert!(waited < Duration::from_millis(4_500));
}

#[test]
fn missing_stream_is_not_found() {
    let server = TestServer::start(None, true);
    let ctx = context("ws://edge/app/nope");
    let result = server.publisher.on_request_offer(&ctx, "app", "nope");
    assert!(matches!(result, Err(PublisherError::NotFound { .. })));
}

#[test]
fn answer_creates_session_and_stop_removes_it() {
    let server = TestServer::start(None, true);
    let ctx = context("ws://edge/app/stream1");

    let offer = server
        .publisher
        .on_request_offer(&ctx, "app", "stream1")
        .unwrap();
    server
        .publisher
        .on_add_remote_description(&ctx, "app", "stream1", &offer.sdp, &peer_answer())
        .unwrap();

    let session = server.stream.get_session(offer.session_id).expect("session");
    assert_eq!(session.id(), offer.session_id);
    assert_eq!(server.publisher.connected_sessions(), 1);

    server
        .publisher
        .on_stop_command("app", "stream1", offer.session_id)
        .unwrap();
    assert!(server.stream.get_session(offer.session_id).is_none());
    assert_eq!(server.publisher.connected_sessions(), 0);

    thread::sleep(Duration::from_millis(300));
    assert_eq!(server.stat_lines_matching("createClientSession"), 1);
    assert_eq!(server.stat_lines_matching("deleteClientSession"), 1);
}

#[test]
fn denied_policy_creates_nothing() {
    let server = TestServer::start(Some("edge-secret".into()), true);
    // signature computed with the wrong secret
    let url = signed_policy_url("not-the-secret", now_epoch_secs() + 60);
    let ctx = context(&url);

    let result = server.publisher.on_request_offer(&ctx, "app", "stream1");
    assert!(matches!(
        result,
        Err(PublisherError::SignaturePolicyFail(_))
    ));
    assert_eq!(server.publisher.connected_sessions(), 0);
    assert_eq!(server.stream.session_count(), 0);
}

#[test]
fn expired_session_is_swept_by_maintenance() {
    let server = TestServer::start(Some("edge-secret".into()), true);
    let url = signed_policy_url("edge-secret", now_epoch_secs() + 2);
    let ctx = context(&url);

    let offer = server
        .publisher
        .on_request_offer(&ctx, "app", "stream1")
        .unwrap();
    server
        .publisher
        .on_add_remote_description(&ctx, "app", "stream1", &offer.sdp, &peer_answer())
        .unwrap();

    let session = server.stream.get_session(offer.session_id).expect("session");
    assert!(session.expiry() > 0);

    // Maintenance runs at 1 Hz; the breach at +2 s must be acted on by +3 s.
    thread::sleep(Duration::from_millis(3_600));
    assert!(server.stream.get_session(offer.session_id).is_none());
    assert!(session.is_stopped());
    assert_eq!(server.stat_lines_matching("deleteClientSession"), 1);
}

#[test]
fn ice_failure_detaches_session_within_a_sweep() {
    let server = TestServer::start(None, true);
    let ctx = context("ws://edge/app/stream1");

    let offer = server
        .publisher
        .on_request_offer(&ctx, "app", "stream1")
        .unwrap();
    server
        .publisher
        .on_add_remote_description(&ctx, "app", "stream1", &offer.sdp, &peer_answer())
        .unwrap();
    let session = server.stream.get_session(offer.session_id).expect("session");

    session.on_ice_state_changed(IceConnectionState::Failed);
    thread::sleep(Duration::from_millis(2_500));

    assert!(server.stream.get_session(offer.session_id).is_none());
    assert!(session.is_stopped());
    assert_eq!(server.stat_lines_matching("deleteClientSession"), 1);
}
