//! Record structures exchanged with the transport.
//!
//! Producer records are built by the application and handed to the SDK;
//! consumer records come back from `poll`. Both carry opaque byte payloads —
//! (de)serialization is the job of registry-backed codecs configured on the
//! client, not of these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single record header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header key.
    pub key: String,
    /// Header value; `None` encodes a null value, distinct from empty.
    pub value: Option<Vec<u8>>,
}

impl Header {
    /// Creates a header with a value.
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into(), value: Some(value.into()) }
    }

    /// Creates a header with a null value.
    pub fn null(key: impl Into<String>) -> Self {
        Self { key: key.into(), value: None }
    }
}

/// Provenance of a consumer record's timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordTimestamp {
    /// The broker did not provide a timestamp.
    NotAvailable,
    /// Timestamp set by the producer at send time.
    CreateTime(DateTime<Utc>),
    /// Timestamp set by the broker at append time.
    LogAppendTime(DateTime<Utc>),
}

impl RecordTimestamp {
    /// Returns the wall-clock time regardless of provenance.
    #[must_use]
    pub fn time(self) -> Option<DateTime<Utc>> {
        match self {
            RecordTimestamp::NotAvailable => None,
            RecordTimestamp::CreateTime(t) | RecordTimestamp::LogAppendTime(t) => Some(t),
        }
    }
}

/// A record to be produced.
///
/// Built with the chained setter style:
///
/// ```
/// use streamline_types::ProducerRecord;
///
/// let record = ProducerRecord::to("orders")
///     .key(b"order-123".to_vec())
///     .value(br#"{"total": 40}"#.to_vec())
///     .header("source", "checkout");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProducerRecord {
    /// Destination topic (logical name).
    pub topic: String,
    /// Explicit partition, or `None` for partitioner assignment.
    pub partition: Option<i32>,
    /// Record key.
    pub key: Option<Vec<u8>>,
    /// Record value; `None` produces a tombstone.
    pub value: Option<Vec<u8>>,
    /// Record headers, in order.
    pub headers: Vec<Header>,
    /// Explicit create-time, or `None` for send-time stamping.
    pub timestamp: Option<DateTime<Utc>>,
}

impl ProducerRecord {
    /// Starts a record destined for `topic`.
    pub fn to(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            partition: None,
            key: None,
            value: None,
            headers: Vec::new(),
            timestamp: None,
        }
    }

    /// Sets an explicit partition.
    #[must_use]
    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Sets the record key.
    #[must_use]
    pub fn key(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets the record value.
    #[must_use]
    pub fn value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push(Header::new(key, value));
        self
    }

    /// Sets an explicit create-time timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A record received from `poll`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerRecord {
    /// Source topic (logical name after unresolution).
    pub topic: String,
    /// Partition the record was read from.
    pub partition: i32,
    /// Offset of the record within the partition.
    pub offset: i64,
    /// Record key.
    pub key: Option<Vec<u8>>,
    /// Record value; `None` is a tombstone.
    pub value: Option<Vec<u8>>,
    /// Record headers, in order.
    pub headers: Vec<Header>,
    /// Record timestamp.
    pub timestamp: RecordTimestamp,
}

impl ConsumerRecord {
    /// Returns the first header with the given key.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.key == key)
    }
}

/// Broker acknowledgement for a produced record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Topic the record was written to (logical name after unresolution).
    pub topic: String,
    /// Partition the record landed in.
    pub partition: i32,
    /// Assigned offset.
    pub offset: i64,
    /// Broker-reported timestamp, when available.
    pub timestamp: Option<DateTime<Utc>>,
}
