//! Core types for the Streamline client SDK.
//!
//! This crate provides the foundational value types shared by the SDK surface
//! and its test doubles:
//! - Topic and partition identifiers (`TopicPartition`, `TopicPartitionOffset`)
//! - Consumer/producer record structures with headers and timestamps
//! - Topic-name validation
//! - Error types using snafu

pub mod error;
pub mod record;
pub mod topic;

// Re-export commonly used types at crate root
pub use error::{Result, TypeError};
pub use record::{ConsumerRecord, Header, ProducerRecord, RecordMetadata, RecordTimestamp};
pub use topic::{Offset, TopicPartition, TopicPartitionOffset, validate_topic_name};
