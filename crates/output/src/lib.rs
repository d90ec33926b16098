//! ClickHouse output for the silt pipeline
//!
//! Owns the destination side: schema introspection at init, the prepared
//! insert built from the column list, the write loop with reconnect-and-retry
//! on connection-class failures, offset commitment after acknowledged
//! inserts, and additive DDL for runtime-discovered keys.

mod block;
mod error;
mod metrics;
mod schema;
mod writer;

pub use error::{Result, WriteError};
pub use metrics::{WriterMetrics, WriterMetricsSnapshot};
pub use writer::ClickHouseWriter;
