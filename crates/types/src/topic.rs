//! Topic and partition identifiers.
//!
//! Topic names in application code are always *logical* names; the SDK
//! resolves them to cluster-specific physical names before they reach the
//! transport, and unresolves them on the way back. These types carry whichever
//! form the current boundary uses — they do not distinguish the two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidTopicNameSnafu, Result};

/// Maximum allowed topic name length.
const MAX_TOPIC_NAME_LEN: usize = 249;

/// Validates a logical topic name against the platform naming rules.
///
/// Rules:
/// - non-empty, at most 249 characters
/// - only ASCII alphanumerics, `.`, `_`, and `-`
/// - not `.` or `..`
///
/// # Errors
///
/// Returns [`TypeError::InvalidTopicName`](crate::TypeError::InvalidTopicName)
/// naming the violated rule.
pub fn validate_topic_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return InvalidTopicNameSnafu { name, reason: "name is empty" }.fail();
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return InvalidTopicNameSnafu {
            name,
            reason: format!("name exceeds {MAX_TOPIC_NAME_LEN} characters"),
        }
        .fail();
    }
    if name == "." || name == ".." {
        return InvalidTopicNameSnafu { name, reason: "name is '.' or '..'" }.fail();
    }
    if let Some(bad) =
        name.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return InvalidTopicNameSnafu {
            name,
            reason: format!("illegal character '{bad}'"),
        }
        .fail();
    }
    Ok(())
}

/// A topic/partition pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    /// Topic name.
    pub topic: String,
    /// Zero-based partition index.
    pub partition: i32,
}

impl TopicPartition {
    /// Creates a new topic/partition pair.
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self { topic: topic.into(), partition }
    }

    /// Attaches an offset, producing a [`TopicPartitionOffset`].
    #[must_use]
    pub fn at(self, offset: Offset) -> TopicPartitionOffset {
        TopicPartitionOffset { topic: self.topic, partition: self.partition, offset }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// A position within a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset {
    /// Earliest available offset.
    Beginning,
    /// Latest offset (next record to be written).
    End,
    /// No position known.
    Invalid,
    /// A concrete offset.
    Position(i64),
}

impl Offset {
    /// Returns the concrete offset, if any.
    #[must_use]
    pub fn position(self) -> Option<i64> {
        match self {
            Offset::Position(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Offset::Beginning => write!(f, "beginning"),
            Offset::End => write!(f, "end"),
            Offset::Invalid => write!(f, "invalid"),
            Offset::Position(p) => write!(f, "{p}"),
        }
    }
}

/// A topic/partition pair with an associated offset.
///
/// Used for commits, seeks, and position reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicPartitionOffset {
    /// Topic name.
    pub topic: String,
    /// Zero-based partition index.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: Offset,
}

impl TopicPartitionOffset {
    /// Creates a new topic/partition/offset triple.
    pub fn new(topic: impl Into<String>, partition: i32, offset: Offset) -> Self {
        Self { topic: topic.into(), partition, offset }
    }

    /// Drops the offset, returning the bare [`TopicPartition`].
    #[must_use]
    pub fn partition(&self) -> TopicPartition {
        TopicPartition { topic: self.topic.clone(), partition: self.partition }
    }
}

impl fmt::Display for TopicPartitionOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topic_names() {
        for name in ["orders", "orders.v2", "click_stream-raw", "a", "A.B-c_9"] {
            assert!(validate_topic_name(name).is_ok(), "expected '{name}' to be valid");
        }
    }

    #[test]
    fn test_empty_name_rejected() {
        assert!(validate_topic_name("").is_err());
    }

    #[test]
    fn test_dot_names_rejected() {
        assert!(validate_topic_name(".").is_err());
        assert!(validate_topic_name("..").is_err());
    }

    #[test]
    fn test_illegal_characters_rejected() {
        assert!(validate_topic_name("orders events").is_err());
        assert!(validate_topic_name("orders/events").is_err());
        assert!(validate_topic_name("pedidos-\u{00e9}").is_err());
    }

    #[test]
    fn test_overlong_name_rejected() {
        let name = "a".repeat(250);
        assert!(validate_topic_name(&name).is_err());
        let name = "a".repeat(249);
        assert!(validate_topic_name(&name).is_ok());
    }

    #[test]
    fn test_topic_partition_display() {
        let tp = TopicPartition::new("orders", 3);
        assert_eq!(tp.to_string(), "orders[3]");
        assert_eq!(tp.at(Offset::Position(42)).to_string(), "orders[3]@42");
    }

    #[test]
    fn test_offset_position_accessor() {
        assert_eq!(Offset::Position(7).position(), Some(7));
        assert_eq!(Offset::Beginning.position(), None);
        assert_eq!(Offset::Invalid.position(), None);
    }

    #[test]
    fn test_partition_from_offset_triple() {
        let tpo = TopicPartitionOffset::new("orders", 1, Offset::Position(10));
        assert_eq!(tpo.partition(), TopicPartition::new("orders", 1));
    }
}
