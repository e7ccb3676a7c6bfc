//! Per-SSRC sender-report state.
//!
//! Fed with every egress RTP packet; decides when an SR is due and renders
//! it as a ready-to-send compound (SR + SDES CNAME) so the pipeline can
//! forward the bytes without re-serializing.

use std::time::{Duration, Instant};

use bytes::Bytes;

use super::{compound::RtcpRecord, sdes::Sdes, sender_info::SenderInfo, sender_report::SenderReport};
use crate::clock;

/// RFC 3550 recommends ~5 s between reports for a media sender.
pub const DEFAULT_SR_INTERVAL: Duration = Duration::from_secs(5);
/// Emission is also forced well before the u32 SR counters could wrap.
const SR_PACKET_THRESHOLD: u32 = 65_000;
const SR_OCTET_THRESHOLD: u64 = 16 * 1024 * 1024;

pub struct RtcpSrGenerator {
    ssrc: u32,
    clock_rate: u32,
    cname: String,

    packet_count: u32,
    octet_count: u32,
    last_rtp_timestamp: u32,
    last_observed_at: Option<Instant>,

    last_sr_at: Instant,
    packets_since_sr: u32,
    octets_since_sr: u64,
    interval: Duration,

    pending: Option<Bytes>,
}

impl RtcpSrGenerator {
    pub fn new(ssrc: u32, clock_rate: u32, cname: impl Into<String>) -> Self {
        Self::with_interval(ssrc, clock_rate, cname, DEFAULT_SR_INTERVAL)
    }

    pub fn with_interval(
        ssrc: u32,
        clock_rate: u32,
        cname: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            ssrc,
            clock_rate,
            cname: cname.into(),
            packet_count: 0,
            octet_count: 0,
            last_rtp_timestamp: 0,
            last_observed_at: None,
            last_sr_at: Instant::now(),
            packets_since_sr: 0,
            octets_since_sr: 0,
            interval,
            pending: None,
        }
    }

    /// Account one sent RTP packet and render an SR if one is due.
    pub fn on_rtp_sent(&mut self, timestamp: u32, payload_len: usize) {
        self.packet_count = self.packet_count.wrapping_add(1);
        self.octet_count = self.octet_count.wrapping_add(payload_len as u32);
        self.last_rtp_timestamp = timestamp;
        self.last_observed_at = Some(Instant::now());

        self.packets_since_sr = self.packets_since_sr.saturating_add(1);
        self.octets_since_sr = self.octets_since_sr.saturating_add(payload_len as u64);

        if self.is_due() {
            self.pending = self.render_sr();
            self.last_sr_at = Instant::now();
            self.packets_since_sr = 0;
            self.octets_since_sr = 0;
        }
    }

    /// Take the rendered SR, if any. SRs for one SSRC are emitted in order.
    pub fn pop_sr(&mut self) -> Option<Bytes> {
        self.pending.take()
    }

    pub fn has_pending_sr(&self) -> bool {
        self.pending.is_some()
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn octet_count(&self) -> u32 {
        self.octet_count
    }

    fn is_due(&self) -> bool {
        self.last_sr_at.elapsed() >= self.interval
            || self.packets_since_sr >= SR_PACKET_THRESHOLD
            || self.octets_since_sr >= SR_OCTET_THRESHOLD
    }

    fn render_sr(&self) -> Option<Bytes> {
        let (ntp_msw, ntp_lsw) = clock::ntp_now();

        // Extrapolate the most recent RTP timestamp to "now" so the SR maps
        // wall clock to media clock at the emission instant.
        let elapsed_ms = self
            .last_observed_at
            .map(|at| at.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let advance = clock::convert_timescale(elapsed_ms, 1_000, self.clock_rate) as u32;
        let rtp_ts = self.last_rtp_timestamp.wrapping_add(advance);

        let sr = SenderReport::new(
            self.ssrc,
            SenderInfo::new(ntp_msw, ntp_lsw, rtp_ts, self.packet_count, self.octet_count),
            vec![],
        );
        let records = [
            RtcpRecord::Sr(sr),
            RtcpRecord::Sdes(Sdes::cname(self.ssrc, self.cname.clone())),
        ];
        RtcpRecord::encode_compound(&records).ok().map(Bytes::from)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;

    #[test]
    fn counts_track_every_packet_exactly() {
        let mut generator = RtcpSrGenerator::new(0xABCD, 90_000, "cname");
        for i in 0..100u32 {
            generator.on_rtp_sent(i * 3_000, 200);
        }
        assert_eq!(generator.packet_count(), 100);
        assert_eq!(generator.octet_count(), 20_000);
    }

    #[test]
    fn zero_interval_emits_immediately_with_current_counts() {
        let mut generator =
            RtcpSrGenerator::with_interval(0xABCD, 90_000, "cname", Duration::ZERO);
        for _ in 0..1_000u32 {
            generator.on_rtp_sent(1_234, 200);
        }
        let wire = generator.pop_sr().expect("SR should be pending");

        let records = RtcpRecord::decode_compound(&wire).unwrap();
        let RtcpRecord::Sr(sr) = &records[0] else {
            panic!("first record must be the SR");
        };
        assert_eq!(sr.ssrc, 0xABCD);
        assert_eq!(sr.info.packet_count, 1_000);
        assert_eq!(sr.info.octet_count, 200_000);
        assert!(matches!(&records[1], RtcpRecord::Sdes(_)));
    }

    #[test]
    fn long_interval_defers_emission() {
        let mut generator =
            RtcpSrGenerator::with_interval(1, 90_000, "cname", Duration::from_secs(3600));
        for _ in 0..10 {
            generator.on_rtp_sent(0, 100);
        }
        assert!(!generator.has_pending_sr());
    }

    #[test]
    fn pop_clears_pending() {
        let mut generator = RtcpSrGenerator::with_interval(1, 90_000, "c", Duration::ZERO);
        generator.on_rtp_sent(0, 10);
        assert!(generator.pop_sr().is_some());
        assert!(generator.pop_sr().is_none());
    }

    #[test]
    fn sr_rtp_timestamp_tracks_media_clock() {
        let mut generator = RtcpSrGenerator::with_interval(1, 90_000, "c", Duration::ZERO);
        generator.on_rtp_sent(90_000, 10);
        let wire = generator.pop_sr().unwrap();
        let records = RtcpRecord::decode_compound(&wire).unwrap();
        let RtcpRecord::Sr(sr) = &records[0] else {
            panic!("expected SR");
        };
        // Emitted right after the packet: extrapolation adds (almost) nothing.
        assert!(sr.info.rtp_ts >= 90_000 && sr.info.rtp_ts < 90_000 + 9_000);
    }
}
