//! The boundary to the underlying client library.
//!
//! The SDK never speaks a wire protocol itself. Everything below the switch
//! machinery is a host-provided implementation of these traits: a factory
//! that turns a filtered property map into a live client, and the call
//! surface that client exposes. The [`mock`](crate::mock) module ships
//! controllable implementations for testing.

use std::time::Duration;

use async_trait::async_trait;
use streamline_types::{
    ConsumerRecord, ProducerRecord, RecordMetadata, TopicPartition, TopicPartitionOffset,
};

use crate::error::Result;
use crate::properties::ClientProperties;

/// Operations every underlying client supports regardless of role.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Releases the client's network resources.
    ///
    /// Called on the displaced client after a switch and on the current
    /// client when the handle closes. Must be safe to call while other
    /// in-flight calls against the same instance are completing.
    async fn close(&self);
}

/// Call surface of an underlying consumer.
///
/// All topic names crossing this boundary are physical (resolved) names;
/// the SDK surface above does the resolving and unresolving.
#[async_trait]
pub trait ConsumerTransport: Transport {
    /// Replaces the subscription set.
    async fn subscribe(&self, topics: &[String]) -> Result<()>;

    /// Clears the subscription set.
    async fn unsubscribe(&self) -> Result<()>;

    /// Fetches the next record, waiting up to `timeout`.
    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumerRecord>>;

    /// Commits the given offsets, returning the committed positions.
    async fn commit(
        &self,
        offsets: &[TopicPartitionOffset],
    ) -> Result<Vec<TopicPartitionOffset>>;

    /// Returns the currently assigned partitions.
    async fn assignment(&self) -> Result<Vec<TopicPartition>>;

    /// Returns the consume position for each given partition.
    async fn position(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffset>>;

    /// Pauses fetching from the given partitions.
    async fn pause(&self, partitions: &[TopicPartition]) -> Result<()>;

    /// Resumes fetching from the given partitions.
    async fn resume(&self, partitions: &[TopicPartition]) -> Result<()>;

    /// Moves the consume position of a partition.
    async fn seek(&self, offset: &TopicPartitionOffset) -> Result<()>;
}

/// Call surface of an underlying producer.
#[async_trait]
pub trait ProducerTransport: Transport {
    /// Sends one record, returning the broker acknowledgement.
    async fn send(&self, record: ProducerRecord) -> Result<RecordMetadata>;

    /// Waits until buffered records are delivered, up to `timeout`.
    async fn flush(&self, timeout: Duration) -> Result<()>;
}

/// Constructs underlying clients from filtered properties.
///
/// Construction may block on network and TLS handshakes; the switch
/// machinery runs it under the switch lock but never under the handle's
/// pointer lock, so construction latency stalls only the switch itself.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// The client type this factory produces.
    type Client: Transport;

    /// Builds a new client from a filtered property map.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Construction`](crate::ClientError::Construction)
    /// when the client cannot be built; the switch is aborted and the
    /// previous client remains authoritative.
    async fn build(&self, properties: &ClientProperties) -> Result<Self::Client>;
}
