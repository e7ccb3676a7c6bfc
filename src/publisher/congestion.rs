//! Per-session bitrate estimation driven by the report blocks the viewer
//! returns about our outbound stream.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::log::log_sink::LogSink;
use crate::rtcp::ReportBlock;
use crate::{sink_info, sink_warn};

const LOSS_THRESHOLD: f32 = 0.10; // fraction of packets lost
const INCREASE_INTERVAL: Duration = Duration::from_secs(5);
const INCREASE_FACTOR: f64 = 1.08;
const DECREASE_FACTOR: f64 = 0.85;

pub struct CongestionController {
    current_bitrate_bps: u32,
    min_bitrate_bps: u32,
    max_bitrate_bps: u32,
    last_update: Instant,
    logger: Arc<dyn LogSink>,
}

impl CongestionController {
    pub fn new(
        initial_bitrate: u32,
        min_bitrate: u32,
        max_bitrate: u32,
        logger: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            current_bitrate_bps: initial_bitrate,
            min_bitrate_bps: min_bitrate,
            max_bitrate_bps: max_bitrate,
            last_update: Instant::now(),
            logger,
        }
    }

    pub fn current_bitrate(&self) -> u32 {
        self.current_bitrate_bps
    }

    /// Feed one report block about our outbound SSRC.
    pub fn on_report_block(&mut self, rb: &ReportBlock) {
        let now = Instant::now();
        let mut new_bitrate = self.current_bitrate_bps;
        let fraction_lost = rb.fraction_lost as f32 / 255.0;

        if fraction_lost > LOSS_THRESHOLD {
            new_bitrate = (new_bitrate as f64 * DECREASE_FACTOR) as u32;
            sink_warn!(
                self.logger,
                "[Congestion] high packet loss ({:.2}%), decreasing bitrate to {} bps",
                fraction_lost * 100.0,
                new_bitrate
            );
        } else if now.duration_since(self.last_update) > INCREASE_INTERVAL {
            new_bitrate = (new_bitrate as f64 * INCREASE_FACTOR) as u32;
            sink_info!(
                self.logger,
                "[Congestion] network stable, increasing bitrate to {} bps",
                new_bitrate
            );
        }

        new_bitrate = new_bitrate.clamp(self.min_bitrate_bps, self.max_bitrate_bps);
        if new_bitrate != self.current_bitrate_bps {
            self.current_bitrate_bps = new_bitrate;
            self.last_update = now;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::log::NoopLogSink;

    fn block(fraction_lost: u8) -> ReportBlock {
        ReportBlock {
            fraction_lost,
            ..ReportBlock::default()
        }
    }

    #[test]
    fn heavy_loss_decreases_bitrate() {
        let mut cc = CongestionController::new(1_000_000, 100_000, 4_000_000, Arc::new(NoopLogSink));
        cc.on_report_block(&block(128)); // ~50% loss
        assert!(cc.current_bitrate() < 1_000_000);
    }

    #[test]
    fn bitrate_never_leaves_bounds() {
        let mut cc = CongestionController::new(150_000, 100_000, 4_000_000, Arc::new(NoopLogSink));
        for _ in 0..50 {
            cc.on_report_block(&block(255));
        }
        assert_eq!(cc.current_bitrate(), 100_000);
    }

    #[test]
    fn clean_reports_do_not_decrease() {
        let mut cc = CongestionController::new(1_000_000, 100_000, 4_000_000, Arc::new(NoopLogSink));
        cc.on_report_block(&block(0));
        assert!(cc.current_bitrate() >= 1_000_000);
    }
}
