//! Behavior of the segment packetizer's rolling window through warm-up,
//! steady state and ring wrap-around.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use bytes::Bytes;
use streamedge::log::NoopLogSink;
use streamedge::segment::{Packetizer, TrackKind};

fn packetizer() -> Packetizer {
    Packetizer::new("cam1", 3, Arc::new(NoopLogSink))
}

fn append(p: &Packetizer, n: usize) {
    for _ in 0..n {
        p.append_video_segment(4_000, Bytes::from_static(b"segment-bytes"));
    }
}

#[test]
fn warm_up_returns_partial_window_and_no_playlist() {
    let p = packetizer();
    append(&p, 2);

    let window = p.get_play_segments(TrackKind::Video);
    assert_eq!(window.len(), 2);
    assert!(!p.is_ready_for_streaming());
    assert!(p.get_play_list().is_none());
}

#[test]
fn steady_state_returns_last_three_in_order() {
    let p = packetizer();
    append(&p, 10);

    let window = p.get_play_segments(TrackKind::Video);
    let sequences: Vec<u64> = window.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![7, 8, 9]);
    assert!(p.is_ready_for_streaming());
}

#[test]
fn wrap_around_produces_no_duplicates_or_gaps() {
    let p = packetizer();
    append(&p, 16); // capacity is 15: one slot has been overwritten

    let window = p.get_play_segments(TrackKind::Video);
    let sequences: Vec<u64> = window.iter().map(|s| s.sequence).collect();
    assert_eq!(sequences, vec![13, 14, 15]);
}

#[test]
fn every_append_preserves_window_invariants() {
    let p = packetizer();
    for appended in 1..=50usize {
        p.append_video_segment(2_000, Bytes::from_static(b"x"));
        let window = p.get_play_segments(TrackKind::Video);
        assert!(window.len() <= 3);
        assert_eq!(window.len(), appended.min(3));
        if let (Some(first), Some(last)) = (window.first(), window.last()) {
            assert_eq!(last.sequence - first.sequence, window.len() as u64 - 1);
        }
    }
}

#[test]
fn playlist_follows_the_window() {
    let p = packetizer();
    append(&p, 7);
    let playlist = p.get_play_list().unwrap();
    assert!(playlist.contains("#EXT-X-MEDIA-SEQUENCE:4"));
    assert!(playlist.contains("cam1_6.ts"));
    assert!(!playlist.contains("cam1_3.ts"));
}
