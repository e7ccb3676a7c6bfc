//! Per-namespace container of streams. Inbound packets from the ICE port
//! are dispatched through here to the owning session.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::log::log_sink::LogSink;
use crate::publisher::session::RtcSession;
use crate::publisher::stream::RtcStream;
use crate::{sink_info, sink_trace};

/// Boundary to the origin/orchestrator side: asked to pull a stream that is
/// not present locally. External collaborator, injected at construction.
pub trait OriginConnector: Send + Sync {
    fn pull_stream(&self, app_name: &str, stream_name: &str) -> Option<Arc<RtcStream>>;
}

pub struct RtcApplication {
    name: String,
    streams: RwLock<HashMap<String, Arc<RtcStream>>>,
    origin: Option<Arc<dyn OriginConnector>>,
    logger: Arc<dyn LogSink>,
}

impl RtcApplication {
    pub fn new(
        name: impl Into<String>,
        origin: Option<Arc<dyn OriginConnector>>,
        logger: Arc<dyn LogSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            streams: RwLock::new(HashMap::new()),
            origin,
            logger,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get_stream(&self, stream_name: &str) -> Option<Arc<RtcStream>> {
        self.streams
            .read()
            .ok()
            .and_then(|streams| streams.get(stream_name).cloned())
    }

    pub fn add_stream(&self, stream: Arc<RtcStream>) {
        if let Ok(mut streams) = self.streams.write() {
            streams.insert(stream.name().to_string(), stream);
        }
    }

    /// Ask the origin connector for a stream that is not local; a pulled
    /// stream is registered like a native one.
    pub fn pull_stream(&self, stream_name: &str) -> Option<Arc<RtcStream>> {
        let origin = self.origin.as_ref()?;
        let stream = origin.pull_stream(&self.name, stream_name)?;
        sink_info!(
            &self.logger,
            "[App] {} pulled stream {} from origin ({})",
            self.name,
            stream_name,
            stream.media_source()
        );
        self.add_stream(Arc::clone(&stream));
        Some(stream)
    }

    /// Detach and tear down a stream. Returns the sessions that were still
    /// attached so the publisher can finish their teardown.
    pub fn delete_stream(&self, stream_name: &str) -> Vec<Arc<RtcSession>> {
        let removed = self
            .streams
            .write()
            .ok()
            .and_then(|mut streams| streams.remove(stream_name));
        match removed {
            Some(stream) => stream.tear_down(),
            None => Vec::new(),
        }
    }

    pub fn streams_snapshot(&self) -> Vec<Arc<RtcStream>> {
        self.streams
            .read()
            .map(|streams| streams.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connected_session_count(&self) -> u64 {
        self.streams_snapshot()
            .iter()
            .map(|s| s.session_count() as u64)
            .sum()
    }

    /// Inbound ICE payload for one of our sessions.
    pub fn push_incoming_packet(&self, session: &Arc<RtcSession>, data: Bytes) {
        sink_trace!(
            &self.logger,
            "[App] {} dispatching {} byte(s) to session {}",
            self.name,
            data.len(),
            session.id()
        );
        session.receive_from_lower(data);
    }
}
