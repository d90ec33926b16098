//! Shared utilities for the silt pipeline
//!
//! Small building blocks used across crates: bounded async worker pools,
//! rate-limited log gating, and power-of-two sizing helpers.

mod num;
mod pool;
mod rate_limit;

pub use num::{is_power_of_two, round_up_pow2, shift_for};
pub use pool::{PoolClosed, WorkerPool};
pub use rate_limit::{RateLimiter, DEFAULT_LOG_INTERVAL};
