//! A published media source: its encoded tracks, the canonical session
//! description offers are cloned from, and the set of viewer sessions the
//! media fans out to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::log::log_sink::LogSink;
use crate::publisher::session::RtcSession;
use crate::publisher::track::{CodecId, MediaTrack};
use crate::rtp::RtpPacket;
use crate::sdp::{MediaDescription, MediaKind, PayloadMap, SessionDescription};
use crate::{sink_debug, sink_warn};

struct ReadyState {
    started: bool,
    torn_down: bool,
}

pub struct RtcStream {
    app_name: String,
    name: String,
    /// Origin URL when this stream was pulled from an upstream edge.
    media_source: String,
    tracks: Vec<MediaTrack>,
    description: SessionDescription,
    sessions: Mutex<HashMap<u32, Arc<RtcSession>>>,
    ready: Mutex<ReadyState>,
    ready_cond: Condvar,
    /// Per-track egress sequence counters, parallel to `tracks`.
    seq_counters: Vec<AtomicU16>,
    logger: Arc<dyn LogSink>,
}

impl RtcStream {
    pub fn new(
        app_name: impl Into<String>,
        name: impl Into<String>,
        media_source: impl Into<String>,
        tracks: Vec<MediaTrack>,
        dtls_fingerprint: Option<String>,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        let app_name = app_name.into();
        let name = name.into();
        let cname = format!("{app_name}.{name}");

        let mut description = SessionDescription::new(name.clone());
        description.setup = Some("actpass".to_string());
        description.fingerprint = dtls_fingerprint;
        for track in &tracks {
            let kind = if track.codec.is_video() {
                MediaKind::Video
            } else {
                MediaKind::Audio
            };
            let mut payload = PayloadMap::new(
                track.payload_type,
                track.codec.encoding_name(),
                track.clock_rate,
            );
            if track.codec == CodecId::Opus {
                payload.channels = Some(2);
            }
            description
                .add_media(MediaDescription::new(kind, track.ssrc, cname.clone()).with_payload(payload));
        }

        let seq_counters = tracks.iter().map(|_| AtomicU16::new(0)).collect();

        Arc::new(Self {
            app_name,
            name,
            media_source: media_source.into(),
            tracks,
            description,
            sessions: Mutex::new(HashMap::new()),
            ready: Mutex::new(ReadyState {
                started: false,
                torn_down: false,
            }),
            ready_cond: Condvar::new(),
            seq_counters,
            logger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn media_source(&self) -> &str {
        &self.media_source
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Copy of the canonical description for a new offer.
    pub fn description(&self) -> SessionDescription {
        self.description.clone()
    }

    /// Latched by the ingest side once codec parameters and the first
    /// keyframe are available.
    pub fn mark_started(&self) {
        if let Ok(mut ready) = self.ready.lock() {
            ready.started = true;
        }
        self.ready_cond.notify_all();
    }

    pub fn is_started(&self) -> bool {
        self.ready.lock().map(|r| r.started).unwrap_or(false)
    }

    /// Block up to `timeout_ms` for stream readiness. Returns false on
    /// timeout or teardown; never busy-waits.
    pub fn wait_until_started(&self, timeout_ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let Ok(mut ready) = self.ready.lock() else {
            return false;
        };
        loop {
            if ready.started {
                return true;
            }
            if ready.torn_down {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.ready_cond.wait_timeout(ready, deadline - now) {
                Ok((next, _)) => ready = next,
                Err(_) => return false,
            }
        }
    }

    pub fn add_session(&self, session: Arc<RtcSession>) {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(session.id(), session);
        }
    }

    /// Detach a session from the fan-out; the caller finishes the teardown.
    pub fn remove_session(&self, session_id: u32) -> Option<Arc<RtcSession>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|mut sessions| sessions.remove(&session_id))
    }

    pub fn get_session(&self, session_id: u32) -> Option<Arc<RtcSession>> {
        self.sessions
            .lock()
            .ok()
            .and_then(|sessions| sessions.get(&session_id).cloned())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn sessions(&self) -> Vec<Arc<RtcSession>> {
        self.sessions
            .lock()
            .map(|sessions| sessions.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Cancel readiness waiters and detach every session.
    /// Returns the drained sessions so the publisher can finish their
    /// teardown (ICE removal, stats) outside the stream lock.
    pub fn tear_down(&self) -> Vec<Arc<RtcSession>> {
        if let Ok(mut ready) = self.ready.lock() {
            ready.torn_down = true;
        }
        self.ready_cond.notify_all();

        let drained: Vec<Arc<RtcSession>> = self
            .sessions
            .lock()
            .map(|mut sessions| sessions.drain().map(|(_, s)| s).collect())
            .unwrap_or_default();
        sink_debug!(
            &self.logger,
            "[Stream] {}/{} torn down, {} session(s) detached",
            self.app_name,
            self.name,
            drained.len()
        );
        drained
    }

    /// Packetize one encoded frame into RTP once and hand the same immutable
    /// packet to every subscribed session. Returns the delivery count.
    pub fn send_frame(&self, track_id: u32, payload: &[u8], timestamp: u32, marker: bool) -> usize {
        let Some((index, track)) = self
            .tracks
            .iter()
            .enumerate()
            .find(|(_, t)| t.id == track_id)
        else {
            sink_warn!(
                &self.logger,
                "[Stream] frame for unknown track {} dropped",
                track_id
            );
            return 0;
        };

        let sequence = self.seq_counters[index].fetch_add(1, Ordering::Relaxed);
        let packet = match RtpPacket::build(
            track.payload_type,
            marker,
            sequence,
            timestamp,
            track.ssrc,
            &[],
            payload,
        ) {
            Ok(packet) => packet,
            Err(e) => {
                sink_warn!(&self.logger, "[Stream] packetize failed: {e}");
                return 0;
            }
        };
        self.broadcast_rtp(&packet)
    }

    /// Fan one packet out to every session; per-SSRC order is preserved
    /// because the fan-out runs on the caller's single delivery thread.
    pub fn broadcast_rtp(&self, packet: &RtpPacket) -> usize {
        let mut delivered = 0;
        for session in self.sessions() {
            if session.send_media(packet) {
                delivered += 1;
            }
        }
        delivered
    }
}
