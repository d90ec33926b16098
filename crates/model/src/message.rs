//! Input messages and commit points

use chrono::{DateTime, Utc};

/// A unit delivered by the input log. Immutable after delivery.
#[derive(Debug, Clone)]
pub struct InputMessage {
    /// Topic the message was consumed from.
    pub topic: String,
    /// Partition index within the topic.
    pub partition: i32,
    /// Monotonically increasing offset within the partition.
    pub offset: i64,
    /// Raw payload bytes.
    pub value: Vec<u8>,
    /// Broker-assigned timestamp, when available.
    pub timestamp: Option<DateTime<Utc>>,
}

impl InputMessage {
    /// The commit point this message occupies.
    pub fn commit_point(&self) -> CommitPoint {
        CommitPoint {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// A `(partition, offset)` pair acknowledged after a durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitPoint {
    pub partition: i32,
    pub offset: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_point_from_message() {
        let msg = InputMessage {
            topic: "events".into(),
            partition: 3,
            offset: 42,
            value: b"{}".to_vec(),
            timestamp: None,
        };
        assert_eq!(
            msg.commit_point(),
            CommitPoint {
                partition: 3,
                offset: 42
            }
        );
    }
}
