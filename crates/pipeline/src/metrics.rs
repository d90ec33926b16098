//! Task metrics
//!
//! Atomic counters for one task's ingestion path. All operations use relaxed
//! ordering; values are eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one task.
#[derive(Debug, Default)]
pub struct TaskMetrics {
    /// Messages delivered by the input
    consumed_msgs: AtomicU64,

    /// Messages whose payload failed to parse
    parse_errors: AtomicU64,

    /// Messages dropped left of the ring window (already emitted)
    offsets_too_small: AtomicU64,

    /// Messages that hit the right edge of the ring window
    offsets_too_large: AtomicU64,

    /// Batches emitted towards the writer
    batches_emitted: AtomicU64,

    /// Rows carried by emitted batches
    rows_emitted: AtomicU64,

    /// Keys discovered for dynamic schema evolution
    keys_discovered: AtomicU64,
}

impl TaskMetrics {
    pub const fn new() -> Self {
        Self {
            consumed_msgs: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
            offsets_too_small: AtomicU64::new(0),
            offsets_too_large: AtomicU64::new(0),
            batches_emitted: AtomicU64::new(0),
            rows_emitted: AtomicU64::new(0),
            keys_discovered: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_consumed(&self) {
        self.consumed_msgs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_offset_too_small(&self) {
        self.offsets_too_small.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_offset_too_large(&self) {
        self.offsets_too_large.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_batch_emitted(&self, rows: u64) {
        self.batches_emitted.fetch_add(1, Ordering::Relaxed);
        self.rows_emitted.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_keys_discovered(&self, count: u64) {
        self.keys_discovered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TaskMetricsSnapshot {
        TaskMetricsSnapshot {
            consumed_msgs: self.consumed_msgs.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            offsets_too_small: self.offsets_too_small.load(Ordering::Relaxed),
            offsets_too_large: self.offsets_too_large.load(Ordering::Relaxed),
            batches_emitted: self.batches_emitted.load(Ordering::Relaxed),
            rows_emitted: self.rows_emitted.load(Ordering::Relaxed),
            keys_discovered: self.keys_discovered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of task metrics.
#[derive(Debug, Clone, Copy)]
pub struct TaskMetricsSnapshot {
    pub consumed_msgs: u64,
    pub parse_errors: u64,
    pub offsets_too_small: u64,
    pub offsets_too_large: u64,
    pub batches_emitted: u64,
    pub rows_emitted: u64,
    pub keys_discovered: u64,
}
