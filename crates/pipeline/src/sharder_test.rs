//! Shard router tests

use std::collections::HashSet;

use silt_model::{CommitPoint, InputMessage, MsgRow, Value};

use crate::sharder::Sharder;

fn msg_row(partition: i32, offset: i64, shard: u64) -> MsgRow {
    MsgRow::new(
        InputMessage {
            topic: "events".into(),
            partition,
            offset,
            value: Vec::new(),
            timestamp: None,
        },
        Some(vec![Value::Int(offset)]),
    )
    .with_shard(shard)
}

#[test]
fn test_rows_bucketed_by_shard_hash() {
    let sharder = Sharder::new(2, 100);
    // Hashes 0 and 2 land in shard 0; hash 1 in shard 1.
    sharder.put(vec![
        msg_row(0, 0, 0),
        msg_row(0, 1, 1),
        msg_row(0, 2, 2),
    ]);

    let flushes = sharder.force_flush();
    assert_eq!(flushes.len(), 2);
    let shard0 = flushes.iter().find(|f| f.shard == 0).unwrap();
    let shard1 = flushes.iter().find(|f| f.shard == 1).unwrap();
    assert_eq!(shard0.rows.len(), 2);
    assert_eq!(shard1.rows.len(), 1);
}

#[test]
fn test_shard_flushes_at_batch_size() {
    let sharder = Sharder::new(2, 2);
    // Two rows for shard 0, one for shard 1.
    let flushes = sharder.put(vec![
        msg_row(0, 0, 0),
        msg_row(0, 1, 2),
        msg_row(0, 2, 1),
    ]);
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].shard, 0);
    assert_eq!(flushes[0].rows.len(), 2);

    // Shard 1 still buffers its row until forced.
    let rest = sharder.force_flush();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].shard, 1);
}

#[test]
fn test_commits_accumulate_across_partitions() {
    let sharder = Sharder::new(1, 100);
    sharder.put(vec![msg_row(0, 5, 0), msg_row(1, 9, 0)]);
    sharder.put(vec![msg_row(2, 1, 0)]);

    let flushes = sharder.force_flush();
    assert_eq!(flushes.len(), 1);
    let commits: HashSet<CommitPoint> = flushes[0].commits.iter().copied().collect();
    assert_eq!(commits.len(), 3);
    assert!(commits.contains(&CommitPoint {
        partition: 1,
        offset: 9
    }));
}

#[test]
fn test_no_offset_split_across_batches() {
    let sharder = Sharder::new(4, 2);
    let mut seen = Vec::new();

    let mut collect = |flushes: Vec<crate::sharder::ShardFlush>| {
        for flush in flushes {
            seen.extend(flush.commits);
        }
    };

    for offset in 0..20 {
        collect(sharder.put(vec![msg_row(0, offset, offset as u64)]));
    }
    collect(sharder.force_flush());

    let unique: HashSet<CommitPoint> = seen.iter().copied().collect();
    assert_eq!(unique.len(), seen.len(), "an offset appeared in two batches");
    assert_eq!(seen.len(), 20);
}

#[test]
fn test_rowless_slot_commits_through_shard_zero() {
    let sharder = Sharder::new(3, 100);
    let mut failed = msg_row(0, 7, 5);
    failed.row = None;
    failed.shard = None;
    sharder.put(vec![failed]);

    let flushes = sharder.force_flush();
    assert_eq!(flushes.len(), 1);
    assert_eq!(flushes[0].shard, 0);
    assert!(flushes[0].rows.is_empty());
    assert_eq!(
        flushes[0].commits,
        vec![CommitPoint {
            partition: 0,
            offset: 7
        }]
    );
}

#[test]
fn test_force_flush_empties_everything() {
    let sharder = Sharder::new(2, 100);
    sharder.put(vec![msg_row(0, 0, 0), msg_row(0, 1, 1)]);
    assert_eq!(sharder.force_flush().len(), 2);
    assert!(sharder.force_flush().is_empty());
}
