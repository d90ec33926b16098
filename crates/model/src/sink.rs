//! The destination writer seam
//!
//! The pipeline drives the writer through this trait: initialise (loading or
//! reloading the destination schema), accept batches, apply additive schema
//! changes, stop. Concrete implementations live in the output crate; tests
//! substitute mocks.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::column::{ColumnWithType, TypeTag};

/// Errors surfaced by a row sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Connection or query failure while loading the destination schema.
    #[error("schema init failed: {0}")]
    SchemaInit(String),

    /// DDL execution failure; the task treats this as fatal.
    #[error("schema change failed: {0}")]
    SchemaChange(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// A destination for row batches.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Connect and (re)load the destination schema. Idempotent; called again
    /// after every schema change.
    async fn init(&self) -> Result<(), SinkError>;

    /// The current column schema, as loaded by the last `init`.
    fn dims(&self) -> Arc<Vec<ColumnWithType>>;

    /// Number of independent connections writes are striped across. The
    /// shard router sizes itself from this.
    fn connection_count(&self) -> usize;

    /// Adopt the task's cancellation token for the current run. In-flight
    /// writes observe it between attempts.
    fn attach_cancel(&self, cancel: CancellationToken) {
        let _ = cancel;
    }

    /// Hand a batch to the write loop. Fire-and-forget: retries, commits and
    /// fatal reporting happen inside the sink.
    async fn send(&self, batch: Batch);

    /// Apply additive DDL for runtime-discovered keys.
    async fn change_schema(&self, new_keys: &[(String, TypeTag)]) -> Result<(), SinkError>;

    /// Release connections.
    async fn stop(&self);
}

/// A fatal task condition reported to the host supervisor.
///
/// Library code never exits the process; it reports here and the binary
/// decides (log, stop the task, exit non-zero for the external supervisor).
#[derive(Debug, Clone)]
pub struct TaskFatal {
    pub task: String,
    pub reason: String,
}

impl TaskFatal {
    pub fn new(task: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for TaskFatal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task {}: {}", self.task, self.reason)
    }
}
