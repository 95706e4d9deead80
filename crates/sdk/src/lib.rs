//! Rust SDK for the Streamline multi-cluster streaming platform.
//!
//! Streamline moves applications between clusters without redeploys: a
//! discovery feed announces where the brokers, schema registry, and naming
//! patterns currently live, and this SDK keeps a stable consumer/producer
//! handle pointed at them. When the feed announces new coordinates, the SDK
//! builds a fresh underlying client and hot-swaps it in while the
//! application's calls keep flowing.
//!
//! # Features
//!
//! - **Stable handles**: one [`Consumer`]/[`Producer`] for the process
//!   lifetime, whatever cluster is behind it
//! - **Atomic switching**: a failed discovery update is invisible to
//!   traffic; the previous client keeps serving
//! - **Logical naming**: topic and group names resolve through
//!   discovery-provided patterns at the transport boundary
//! - **Codec continuity**: registry-backed (de)serializers re-point at the
//!   new registry in place, preserving object identity
//! - **Testability**: every external collaborator is a trait, with
//!   controllable implementations in [`mock`]
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use streamline_sdk::{ClientConfig, Consumer};
//!
//! #[tokio::main]
//! async fn main() -> streamline_sdk::Result<()> {
//!     let config = ClientConfig::builder()
//!         .application_id("billing")
//!         .build()?;
//!
//!     // `factory` builds the underlying client; `fetcher` talks to the
//!     // discovery service. Both are host-provided trait implementations.
//!     let consumer = Consumer::connect(config, factory, fetcher).await?;
//!
//!     consumer.subscribe(&["orders"]).await?;
//!     while let Some(record) = consumer.poll(Duration::from_millis(200)).await? {
//!         println!("offset {}: {:?}", record.offset, record.value);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              Consumer / Producer (public API)               │
//! │   .subscribe() │ .poll() │ .send() │ name (un)resolution    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   SwitchCoordinator                         │
//! │   Switch lock │ Property merge │ ConfigFilter │ Codecs      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   ClientHandle                              │
//! │   Pointer lock │ swap() │ readiness gate                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │              Underlying client (host-provided)              │
//! │   ConsumerTransport │ ProducerTransport │ TransportFactory  │
//! └─────────────────────────────────────────────────────────────┘
//!           ▲
//!           │ DiscoveryPoller / DiscoveryRegistry
//!           │ (DiscoveryFetcher, host-provided)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod config;
mod consumer;
mod discovery;
mod error;
mod handle;
pub mod mock;
mod patterns;
mod producer;
mod properties;
mod retry;
mod streaming;
mod switch;
mod transport;

// Public API exports
pub use codec::{CodecOptions, CodecSlot, RegistryCodec, SerializerBinding};
pub use config::{
    ClientConfig, ClientConfigBuilder, DiscoveryConfig, RetryPolicy, RetryPolicyBuilder,
    TlsConfig,
};
pub use consumer::{Consumer, ConsumerBuilder};
pub use discovery::{
    DiscoveryFetcher, DiscoveryListener, DiscoveryPoller, DiscoveryRegistry, DiscoveryResult,
    DiscoveryResultBuilder, fields,
};
pub use error::{ClientError, Result};
pub use handle::ClientHandle;
pub use patterns::{
    resolve_group, resolve_offsets, resolve_partition, resolve_partitions, resolve_pattern,
    resolve_topic, resolve_topics, unresolve_offsets, unresolve_partitions, unresolve_topic,
};
pub use producer::{Producer, ProducerBuilder};
pub use properties::{
    CONSUMER_ALLOWED_KEYS, ClientProperties, PRODUCER_ALLOWED_KEYS, PropertyValue,
    filter_consumer_properties, filter_producer_properties, keys,
};
pub use retry::with_retry;
pub use streaming::{DEFAULT_POLL_TIMEOUT, RecordStream};
pub use switch::{
    AfterSwapHook, BeforeSwapHook, PropertyFilter, SwitchContext, SwitchCoordinator,
};
pub use transport::{ConsumerTransport, ProducerTransport, Transport, TransportFactory};

// Re-export commonly used types from streamline-types
pub use streamline_types::{
    ConsumerRecord, Header, Offset, ProducerRecord, RecordMetadata, RecordTimestamp,
    TopicPartition, TopicPartitionOffset,
};
