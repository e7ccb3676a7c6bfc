use bytes::Bytes;

/// One complete media segment held in the rolling window.
#[derive(Debug, Clone)]
pub struct SegmentItem {
    /// Monotonic per-track sequence, assigned at append.
    pub sequence: u64,
    pub duration_ms: u64,
    /// Monotonic tick at creation, for age-based diagnostics.
    pub created_tick_ms: u64,
    pub data: Bytes,
}
