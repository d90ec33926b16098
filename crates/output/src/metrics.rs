//! Writer metrics
//!
//! Atomic counters for the write path. All operations use relaxed ordering;
//! values are eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one task's writer.
#[derive(Debug, Default)]
pub struct WriterMetrics {
    /// Rows durably written and committed
    flushed_rows: AtomicU64,

    /// Batches durably written and committed
    batches_written: AtomicU64,

    /// Rows in failed write attempts (counted per attempt)
    flush_errors: AtomicU64,

    /// Connection rebuilds after retryable failures
    reconnects: AtomicU64,

    /// Write attempts beyond the first, per batch
    retries: AtomicU64,

    /// Schema changes applied
    schema_changes: AtomicU64,
}

impl WriterMetrics {
    pub const fn new() -> Self {
        Self {
            flushed_rows: AtomicU64::new(0),
            batches_written: AtomicU64::new(0),
            flush_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            schema_changes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_flush(&self, rows: u64) {
        self.flushed_rows.fetch_add(rows, Ordering::Relaxed);
        self.batches_written.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_flush_error(&self, rows: u64) {
        self.flush_errors.fetch_add(rows, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_schema_change(&self) {
        self.schema_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WriterMetricsSnapshot {
        WriterMetricsSnapshot {
            flushed_rows: self.flushed_rows.load(Ordering::Relaxed),
            batches_written: self.batches_written.load(Ordering::Relaxed),
            flush_errors: self.flush_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            schema_changes: self.schema_changes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of writer metrics.
#[derive(Debug, Clone, Copy)]
pub struct WriterMetricsSnapshot {
    pub flushed_rows: u64,
    pub batches_written: u64,
    pub flush_errors: u64,
    pub reconnects: u64,
    pub retries: u64,
    pub schema_changes: u64,
}
