//! Rolling segment window for HTTP-segment (HLS/DASH style) viewers.
//!
//! Each track keeps a fixed ring of `segment_count * 5` slots; the playable
//! window is the most recent `segment_count` contiguous segments ending at
//! the latest insertion point. The playlist string lives under its own lock
//! so playlist readers never contend with segment appenders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use crate::clock;
use crate::log::log_sink::LogSink;
use crate::segment::segment_item::SegmentItem;
use crate::sink_debug;

/// Ring capacity factor over the playable window.
const SAVE_FACTOR: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

struct SegmentRing {
    slots: Vec<Option<Arc<SegmentItem>>>,
    /// Next insertion index, advancing modulo capacity.
    current: usize,
    /// Total appended so far (sequence source).
    appended: u64,
}

impl SegmentRing {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            current: 0,
            appended: 0,
        }
    }
}

pub struct Packetizer {
    stream_name: String,
    segment_count: usize,
    segment_save_count: usize,
    video_segments: Mutex<SegmentRing>,
    audio_segments: Mutex<SegmentRing>,
    play_list: Mutex<String>,
    /// Latched once the first full window has accumulated; never clears.
    ready_for_streaming: AtomicBool,
    logger: Arc<dyn LogSink>,
}

impl Packetizer {
    pub fn new(stream_name: impl Into<String>, segment_count: usize, logger: Arc<dyn LogSink>) -> Self {
        let segment_count = segment_count.max(1);
        let segment_save_count = segment_count * SAVE_FACTOR;
        Self {
            stream_name: stream_name.into(),
            segment_count,
            segment_save_count,
            video_segments: Mutex::new(SegmentRing::new(segment_save_count)),
            audio_segments: Mutex::new(SegmentRing::new(segment_save_count)),
            play_list: Mutex::new(String::new()),
            ready_for_streaming: AtomicBool::new(false),
            logger,
        }
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn is_ready_for_streaming(&self) -> bool {
        self.ready_for_streaming.load(Ordering::SeqCst)
    }

    /// The playlist is opaque to the serving layer; absent until the first
    /// full window latched readiness.
    pub fn get_play_list(&self) -> Option<String> {
        if !self.is_ready_for_streaming() {
            return None;
        }
        self.play_list.lock().ok().map(|p| p.clone())
    }

    pub fn append_video_segment(&self, duration_ms: u64, data: Bytes) -> u64 {
        let sequence = self.append(TrackKind::Video, duration_ms, data);
        self.refresh_play_list();
        sequence
    }

    pub fn append_audio_segment(&self, duration_ms: u64, data: Bytes) -> u64 {
        let sequence = self.append(TrackKind::Audio, duration_ms, data);
        self.refresh_play_list();
        sequence
    }

    fn ring(&self, kind: TrackKind) -> &Mutex<SegmentRing> {
        match kind {
            TrackKind::Video => &self.video_segments,
            TrackKind::Audio => &self.audio_segments,
        }
    }

    fn append(&self, kind: TrackKind, duration_ms: u64, data: Bytes) -> u64 {
        let Ok(mut ring) = self.ring(kind).lock() else {
            return 0;
        };
        let sequence = ring.appended;
        let item = Arc::new(SegmentItem {
            sequence,
            duration_ms,
            created_tick_ms: clock::tick_ms(),
            data,
        });
        let index = ring.current;
        ring.slots[index] = Some(item);
        ring.current = (ring.current + 1) % self.segment_save_count;
        ring.appended += 1;

        if ring.appended >= self.segment_count as u64 {
            self.ready_for_streaming.store(true, Ordering::SeqCst);
        }
        sequence
    }

    /// The most recent `segment_count` contiguous non-empty segments ending
    /// at the latest insertion point, oldest first. During warm-up (or after
    /// a gap) the window truncates to what is actually there.
    pub fn get_play_segments(&self, kind: TrackKind) -> Vec<Arc<SegmentItem>> {
        let Ok(ring) = self.ring(kind).lock() else {
            return Vec::new();
        };

        let capacity = self.segment_save_count;
        let window = self.segment_count;
        let cur = ring.current;

        let begin = if cur >= window {
            cur - window
        } else {
            capacity - (window - cur)
        };
        let end = if begin <= capacity - window {
            begin + window - 1
        } else {
            window - (capacity - begin) - 1
        };

        let mut indices = Vec::with_capacity(window);
        if begin <= end {
            indices.extend(begin..=end);
        } else {
            indices.extend(begin..capacity);
            indices.extend(0..=end);
        }

        let mut segments = Vec::with_capacity(window);
        for index in indices {
            match &ring.slots[index] {
                Some(item) => segments.push(Arc::clone(item)),
                None if segments.is_empty() => continue, // warm-up: window not filled yet
                None => {
                    if self.is_ready_for_streaming() {
                        sink_debug!(
                            &self.logger,
                            "[Packetizer] {} window truncated at slot {}",
                            self.stream_name,
                            index
                        );
                    }
                    break;
                }
            }
        }
        segments
    }

    /// Rebuild the playlist from the current video window. Takes the track
    /// lock and the playlist lock in sequence, never together.
    fn refresh_play_list(&self) {
        let segments = self.get_play_segments(TrackKind::Video);

        let target_duration = segments
            .iter()
            .map(|s| s.duration_ms.div_ceil(1000))
            .max()
            .unwrap_or(0);

        let mut rendered = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        rendered.push_str(&format!("#EXT-X-TARGETDURATION:{target_duration}\n"));
        if let Some(first) = segments.first() {
            rendered.push_str(&format!("#EXT-X-MEDIA-SEQUENCE:{}\n", first.sequence));
        }
        for segment in &segments {
            rendered.push_str(&format!(
                "#EXTINF:{:.3},\n{}_{}.ts\n",
                segment.duration_ms as f64 / 1000.0,
                self.stream_name,
                segment.sequence
            ));
        }

        if let Ok(mut play_list) = self.play_list.lock() {
            *play_list = rendered;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;

    fn packetizer(segment_count: usize) -> Packetizer {
        Packetizer::new("stream1", segment_count, Arc::new(NoopLogSink))
    }

    fn append_n(p: &Packetizer, n: u64) {
        for _ in 0..n {
            p.append_video_segment(4_000, Bytes::from_static(b"seg"));
        }
    }

    #[test]
    fn warm_up_window_truncates() {
        let p = packetizer(3);
        assert_eq!(p.segment_save_count, 15);
        append_n(&p, 2);

        let segments = p.get_play_segments(TrackKind::Video);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].sequence, 0);
        assert_eq!(segments[1].sequence, 1);
        assert!(!p.is_ready_for_streaming());
        assert!(p.get_play_list().is_none());
    }

    #[test]
    fn steady_state_returns_most_recent_window() {
        let p = packetizer(3);
        append_n(&p, 10);

        let segments = p.get_play_segments(TrackKind::Video);
        let sequences: Vec<u64> = segments.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![7, 8, 9]); // the 8th, 9th and 10th appended
        assert!(p.is_ready_for_streaming());
        assert!(p.get_play_list().is_some());
    }

    #[test]
    fn wrap_around_past_capacity() {
        let p = packetizer(3);
        append_n(&p, 16); // one past the 15-slot capacity

        let segments = p.get_play_segments(TrackKind::Video);
        let sequences: Vec<u64> = segments.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![13, 14, 15]); // the 14th, 15th and 16th
    }

    #[test]
    fn window_invariants_after_every_append() {
        let p = packetizer(3);
        for i in 1..=40u64 {
            p.append_video_segment(4_000, Bytes::from_static(b"seg"));
            let segments = p.get_play_segments(TrackKind::Video);
            assert!(segments.len() <= 3);
            assert_eq!(segments.len(), i.min(3) as usize);
            for pair in segments.windows(2) {
                assert_eq!(pair[1].sequence, pair[0].sequence + 1);
            }
            if let (Some(first), Some(last)) = (segments.first(), segments.last()) {
                assert_eq!(last.sequence - first.sequence, segments.len() as u64 - 1);
            }
        }
    }

    #[test]
    fn readiness_latch_never_clears() {
        let p = packetizer(3);
        append_n(&p, 3);
        assert!(p.is_ready_for_streaming());
        append_n(&p, 100);
        assert!(p.is_ready_for_streaming());
    }

    #[test]
    fn audio_and_video_rings_are_independent() {
        let p = packetizer(2);
        p.append_audio_segment(2_000, Bytes::from_static(b"a"));
        assert_eq!(p.get_play_segments(TrackKind::Video).len(), 0);
        assert_eq!(p.get_play_segments(TrackKind::Audio).len(), 1);
    }

    #[test]
    fn playlist_contains_current_window() {
        let p = packetizer(3);
        append_n(&p, 10);
        let play_list = p.get_play_list().unwrap();
        assert!(play_list.starts_with("#EXTM3U"));
        assert!(play_list.contains("#EXT-X-MEDIA-SEQUENCE:7"));
        assert!(play_list.contains("stream1_9.ts"));
        assert!(!play_list.contains("stream1_6.ts"));
    }
}
