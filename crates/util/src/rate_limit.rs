//! Rate-limited log gating
//!
//! Prevents log spam under sustained error conditions: each limiter lets one
//! event through per interval and counts what it suppressed in between. Each
//! task owns independent limiters for its noisy event classes (parse errors,
//! offsets left of the window, offsets right of the window).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between allowed events (one log per 10 seconds).
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Token-bucket style limiter with a single token refilled per interval.
///
/// Thread-safe; `allow` is called from hot paths and only takes the mutex
/// long enough to compare timestamps.
pub struct RateLimiter {
    min_interval: Duration,
    last: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
    total: AtomicU64,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(None),
            suppressed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record an event; returns `true` when the caller should log it.
    pub fn allow(&self) -> bool {
        self.total.fetch_add(1, Ordering::Relaxed);

        let mut last = self.last.lock();
        let now = Instant::now();
        let pass = match *last {
            None => true,
            Some(at) => now.duration_since(at) >= self.min_interval,
        };
        if pass {
            *last = Some(now);
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
        }
        pass
    }

    /// Events suppressed since the last allowed one; resets the count.
    ///
    /// Callers typically include this in the log line they emit after a
    /// successful `allow`.
    pub fn take_suppressed(&self) -> u64 {
        self.suppressed.swap(0, Ordering::Relaxed)
    }

    /// Total events ever recorded, allowed or not.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
