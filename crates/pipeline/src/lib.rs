//! The silt message-ordering and batching engine
//!
//! Sits between the partitioned-log input and the database writer:
//!
//! ```text
//! [Inputer] ──push──> [TaskService] ──parse pool──> [Ring per partition]
//!                                                        │ dense chunks
//!                                         ┌──────────────┴───────┐
//!                                    [Sharder]              (direct)
//!                                         └──────┬───────────────┘
//!                                             [Batch] ──channel(32)──> [RowSink]
//!                                                                          │
//!                                                    offsets committed ◄───┘
//! ```
//!
//! # Key design
//!
//! - **Rings restore order**: parallel parsing erases delivery order; each
//!   partition's ring reassembles rows into offset-contiguous chunks.
//! - **Offsets commit late**: a batch carries every `(partition, offset)` it
//!   supersedes and the writer commits them only after a durable insert.
//! - **Schema quiescence**: the first unknown key drains all buffers, pauses
//!   ingestion, applies DDL, then re-initialises the task.

mod error;
mod metrics;
mod ring;
mod sharder;
mod task;

pub use error::{PipelineError, Result};
pub use metrics::{TaskMetrics, TaskMetricsSnapshot};
pub use ring::{Admission, PutOutcome, Ring};
pub use sharder::{ShardFlush, Sharder};
pub use task::{Lifecycle, TaskService};

/// Writer channel depth: batches buffered between emission and the writer.
pub const BATCH_CHANNEL_DEPTH: usize = 32;

#[cfg(test)]
mod sharder_test;
#[cfg(test)]
mod task_test;
