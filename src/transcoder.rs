//! Transcoder boundary types.
//!
//! Codec bindings live outside this crate; what the core fixes is the queue
//! contract their workers run against (bounded in, bounded out, dequeue
//! returns an `Option` so a worker loop never blocks indefinitely) and the
//! outcome notifications a decode call can produce.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Non-fatal outcomes a codec call reports upward. EOF and unknown errors
/// are logged at the binding and the worker keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecOutcome {
    /// Needs more input before producing output.
    Again,
    /// Consumed input, nothing to emit this round.
    NoData,
    /// Output parameters changed; downstream must renegotiate.
    FormatChanged,
}

/// Bounded MPSC-ish queue for codec worker input/output.
pub struct BoundedQueue<T> {
    inner: Mutex<VecDeque<T>>,
    capacity: usize,
    cond: Condvar,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
            cond: Condvar::new(),
        }
    }

    /// Non-blocking push; hands the item back when the queue is full so the
    /// producer can decide to drop or retry.
    pub fn try_push(&self, item: T) -> Result<(), T> {
        let Ok(mut queue) = self.inner.lock() else {
            return Err(item);
        };
        if queue.len() >= self.capacity {
            return Err(item);
        }
        queue.push_back(item);
        self.cond.notify_one();
        Ok(())
    }

    /// Wait up to `timeout` for an item. `None` means the worker loop should
    /// simply continue (check its run flag, poll again).
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.inner.lock().ok()?;
        loop {
            if let Some(item) = queue.pop_front() {
                return Some(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (next, _) = self.cond.wait_timeout(queue, deadline - now).ok()?;
            queue = next;
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|q| q.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
