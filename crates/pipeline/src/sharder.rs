//! Shard router
//!
//! Optionally re-buckets rows across partitions by a sharding key before
//! they reach the writer: rows whose key hashes to the same shard land in
//! the same accumulator, sized to the writer's connection count. A shard
//! flushes when it crosses the batch size; the global flush timer empties
//! everything else.
//!
//! Commit points travel with their rows, so an input offset lands in exactly
//! one emitted batch. Rows without a shard hash (parse failures have no key
//! to extract) fall into shard 0 so their offsets still commit.

use parking_lot::Mutex;

use silt_model::{CommitPoint, MsgRow, Row};

/// Rows and commit points flushed from one shard.
#[derive(Debug)]
pub struct ShardFlush {
    pub shard: usize,
    pub rows: Vec<Row>,
    pub commits: Vec<CommitPoint>,
}

#[derive(Default)]
struct ShardAcc {
    rows: Vec<Row>,
    commits: Vec<CommitPoint>,
}

impl ShardAcc {
    fn drain(&mut self, shard: usize) -> ShardFlush {
        ShardFlush {
            shard,
            rows: std::mem::take(&mut self.rows),
            commits: std::mem::take(&mut self.commits),
        }
    }

    fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.commits.is_empty()
    }
}

/// Key-based row re-bucketing across partitions.
pub struct Sharder {
    batch_size: usize,
    shards: Mutex<Vec<ShardAcc>>,
}

impl Sharder {
    pub fn new(shard_count: usize, batch_size: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            batch_size,
            shards: Mutex::new((0..shard_count).map(|_| ShardAcc::default()).collect()),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.lock().len()
    }

    /// Accumulate a ring chunk; returns every shard that crossed the batch
    /// size and flushed.
    pub fn put(&self, chunk: Vec<MsgRow>) -> Vec<ShardFlush> {
        let mut shards = self.shards.lock();
        let n = shards.len() as u64;

        for msg_row in chunk {
            let idx = msg_row.shard.map(|h| (h % n) as usize).unwrap_or(0);
            let acc = &mut shards[idx];
            acc.commits.push(msg_row.msg.commit_point());
            if let Some(row) = msg_row.row {
                acc.rows.push(row);
            }
        }

        shards
            .iter_mut()
            .enumerate()
            .filter(|(_, acc)| acc.rows.len() >= self.batch_size)
            .map(|(idx, acc)| acc.drain(idx))
            .collect()
    }

    /// Empty every shard accumulator unconditionally.
    pub fn force_flush(&self) -> Vec<ShardFlush> {
        let mut shards = self.shards.lock();
        shards
            .iter_mut()
            .enumerate()
            .filter(|(_, acc)| !acc.is_empty())
            .map(|(idx, acc)| acc.drain(idx))
            .collect()
    }
}
