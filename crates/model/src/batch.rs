//! Batches and offset commitment
//!
//! A batch is a flushed group of rows destined for one insert, carrying the
//! input offsets it supersedes and the committer that acknowledges them. The
//! writer must not commit until the destination has acknowledged the insert.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::message::{CommitPoint, InputMessage};
use crate::value::Row;

/// A message paired with its parsed row.
///
/// The row is absent when parsing failed; the slot still travels through the
/// ring so the offset is not lost. The shard hash is precomputed at parse
/// time when a sharding key is configured.
#[derive(Debug, Clone)]
pub struct MsgRow {
    pub msg: InputMessage,
    pub row: Option<Row>,
    pub shard: Option<u64>,
}

impl MsgRow {
    pub fn new(msg: InputMessage, row: Option<Row>) -> Self {
        Self {
            msg,
            row,
            shard: None,
        }
    }

    pub fn with_shard(mut self, shard: u64) -> Self {
        self.shard = Some(shard);
        self
    }
}

/// Errors surfaced while committing offsets.
#[derive(Debug, Error)]
pub enum CommitError {
    /// The task is shutting down; commit skipped on purpose.
    #[error("commit cancelled")]
    Cancelled,

    /// The consumer connection is gone (shutdown in progress).
    #[error("consumer closed")]
    Closed,

    /// Anything else; the write loop treats this as fatal.
    #[error("commit failed: {0}")]
    Failed(String),
}

/// Offset acknowledgement seam, implemented over the task's input driver.
#[async_trait]
pub trait Committer: Send + Sync {
    async fn commit(&self, point: CommitPoint) -> Result<(), CommitError>;
}

/// An ordered group of rows plus the commit points it supersedes.
#[derive(Clone)]
pub struct Batch {
    /// Monotonic per-task index; stripes writes across connections.
    pub batch_idx: u64,
    /// Rows in emission order.
    pub rows: Vec<Row>,
    /// Every `(partition, offset)` this batch covers, including offsets whose
    /// rows were dropped by parse failures.
    pub commits: Vec<CommitPoint>,
    committer: Arc<dyn Committer>,
}

impl Batch {
    pub fn new(
        batch_idx: u64,
        rows: Vec<Row>,
        commits: Vec<CommitPoint>,
        committer: Arc<dyn Committer>,
    ) -> Self {
        Self {
            batch_idx,
            rows,
            commits,
            committer,
        }
    }

    /// Number of input messages this batch supersedes.
    pub fn real_size(&self) -> usize {
        self.commits.len()
    }

    /// Acknowledge every covered commit point, in order.
    pub async fn commit(&self) -> Result<(), CommitError> {
        for point in &self.commits {
            self.committer.commit(*point).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("batch_idx", &self.batch_idx)
            .field("rows", &self.rows.len())
            .field("commits", &self.commits.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingCommitter {
        seen: Mutex<Vec<CommitPoint>>,
    }

    #[async_trait]
    impl Committer for RecordingCommitter {
        async fn commit(&self, point: CommitPoint) -> Result<(), CommitError> {
            self.seen.lock().unwrap().push(point);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_commit_covers_every_point_in_order() {
        let committer = Arc::new(RecordingCommitter {
            seen: Mutex::new(Vec::new()),
        });
        let points = vec![
            CommitPoint {
                partition: 0,
                offset: 0,
            },
            CommitPoint {
                partition: 0,
                offset: 1,
            },
            CommitPoint {
                partition: 1,
                offset: 7,
            },
        ];
        let batch = Batch::new(0, Vec::new(), points.clone(), committer.clone());
        batch.commit().await.unwrap();
        assert_eq!(*committer.seen.lock().unwrap(), points);
    }

    #[tokio::test]
    async fn test_real_size_counts_offsets_not_rows() {
        let committer = Arc::new(RecordingCommitter {
            seen: Mutex::new(Vec::new()),
        });
        // Two offsets covered, one row survived parsing.
        let batch = Batch::new(
            3,
            vec![vec![]],
            vec![
                CommitPoint {
                    partition: 0,
                    offset: 10,
                },
                CommitPoint {
                    partition: 0,
                    offset: 11,
                },
            ],
            committer,
        );
        assert_eq!(batch.real_size(), 2);
        assert_eq!(batch.rows.len(), 1);
    }
}
