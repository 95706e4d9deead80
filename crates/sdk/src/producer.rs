//! The producer surface: a stable producer that follows the platform.
//!
//! Mirrors [`Consumer`](crate::Consumer) without the consumer-only steps:
//! no group-id resolution, no subscriptions to carry over, no distribution
//! settle time. A switch builds the replacement from the producer allow-list
//! and swaps it in; sends racing the swap complete on the client they
//! started with.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use streamline_types::{ProducerRecord, RecordMetadata, validate_topic_name};

use crate::codec::{CodecSlot, RegistryCodec, SerializerBinding};
use crate::config::ClientConfig;
use crate::consumer::{Attachment, attach};
use crate::discovery::{DiscoveryFetcher, DiscoveryListener, DiscoveryRegistry, DiscoveryResult};
use crate::error::{ConfigSnafu, NotReadySnafu, Result};
use crate::handle::ClientHandle;
use crate::patterns::{resolve_topic, unresolve_topic};
use crate::properties::{ClientProperties, filter_producer_properties};
use crate::switch::SwitchCoordinator;
use crate::transport::{ProducerTransport, Transport, TransportFactory};

/// A discovery-driven producer.
///
/// Create one with [`Producer::builder`] or [`Producer::connect`]. The value
/// is cheap to share behind an `Arc`; all methods take `&self`.
pub struct Producer<F: TransportFactory>
where
    F::Client: ProducerTransport,
{
    coordinator: Arc<SwitchCoordinator<F>>,
    handle: Arc<ClientHandle<F::Client>>,
    result: Arc<RwLock<Option<DiscoveryResult>>>,
    attachment: Attachment,
    application_id: String,
}

impl<F: TransportFactory> Producer<F>
where
    F::Client: ProducerTransport,
{
    /// Starts building a producer.
    #[must_use]
    pub fn builder(
        config: ClientConfig,
        factory: F,
        fetcher: Arc<dyn DiscoveryFetcher>,
    ) -> ProducerBuilder<F> {
        ProducerBuilder { config, factory, fetcher, bindings: Vec::new(), registry: None }
    }

    /// Connects with no codec bindings and a private discovery poller.
    ///
    /// # Errors
    ///
    /// See [`ProducerBuilder::connect`].
    pub async fn connect(
        config: ClientConfig,
        factory: F,
        fetcher: Arc<dyn DiscoveryFetcher>,
    ) -> Result<Self> {
        Self::builder(config, factory, fetcher).connect().await
    }

    fn discovery_snapshot(&self) -> Result<DiscoveryResult> {
        match self.result.read().clone() {
            Some(result) => Ok(result),
            None => NotReadySnafu.fail(),
        }
    }

    /// The application id this producer was configured with.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Whether an underlying client is installed.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.handle.is_ready()
    }

    /// The most recently applied discovery result.
    #[must_use]
    pub fn discovery_result(&self) -> Option<DiscoveryResult> {
        self.result.read().clone()
    }

    /// Snapshot of the coordinator's stored properties.
    pub async fn properties(&self) -> ClientProperties {
        self.coordinator.properties().await
    }

    /// Sends one record, returning the broker acknowledgement with the
    /// logical topic name restored.
    ///
    /// # Errors
    ///
    /// Fails on invalid topic names, unresolvable patterns, or transport
    /// errors — the latter passed through unchanged.
    pub async fn send(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        validate_topic_name(&record.topic)
            .map_err(|e| ConfigSnafu { message: e.to_string() }.build())?;

        let result = self.discovery_snapshot()?;
        let outbound = ProducerRecord { topic: resolve_topic(&result, &record.topic)?, ..record };
        let metadata =
            self.handle.call(|client| async move { client.send(outbound).await }).await?;
        Ok(RecordMetadata { topic: unresolve_topic(&result, &metadata.topic), ..metadata })
    }

    /// Waits until buffered records are delivered, up to `timeout`.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unchanged.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        self.handle.call(|client| async move { client.flush(timeout).await }).await
    }

    /// Detaches from discovery and closes the underlying client.
    pub async fn close(&self) {
        self.attachment.detach(&self.application_id);
        if let Some(client) = self.handle.close() {
            client.close().await;
        }
    }
}

impl<F: TransportFactory> std::fmt::Debug for Producer<F>
where
    F::Client: ProducerTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Producer")
            .field("application_id", &self.application_id)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Producer`].
pub struct ProducerBuilder<F: TransportFactory> {
    config: ClientConfig,
    factory: F,
    fetcher: Arc<dyn DiscoveryFetcher>,
    bindings: Vec<SerializerBinding>,
    registry: Option<DiscoveryRegistry>,
}

impl<F: TransportFactory> ProducerBuilder<F>
where
    F::Client: ProducerTransport,
{
    /// Binds a registry-backed key serializer.
    #[must_use]
    pub fn key_serializer(mut self, codec: Arc<dyn RegistryCodec>) -> Self {
        self.bindings.push(SerializerBinding::new(CodecSlot::KeySerializer, codec));
        self
    }

    /// Binds a registry-backed value serializer.
    #[must_use]
    pub fn value_serializer(mut self, codec: Arc<dyn RegistryCodec>) -> Self {
        self.bindings.push(SerializerBinding::new(CodecSlot::ValueSerializer, codec));
        self
    }

    /// Shares a discovery feed with other clients of the same application.
    #[must_use]
    pub fn registry(mut self, registry: &DiscoveryRegistry) -> Self {
        self.registry = Some(registry.clone());
        self
    }

    /// Connects: wires the switch coordinator into the discovery feed and
    /// waits for the first client installation.
    ///
    /// # Errors
    ///
    /// `Timeout` if no discovery result installs a client within the
    /// configured initialization timeout.
    pub async fn connect(self) -> Result<Producer<F>> {
        let application_id = self.config.application_id().to_owned();
        let handle = Arc::new(ClientHandle::new());

        // No group source: group-id resolution is a consumer-only step.
        let coordinator = Arc::new(
            SwitchCoordinator::new(self.factory, Arc::clone(&handle), filter_producer_properties)
                .with_initial_properties(self.config.initial_properties())
                .with_bindings(self.bindings),
        );
        let result = coordinator.shared_result();
        let listener: Arc<dyn DiscoveryListener> = coordinator.clone();

        let attachment = attach(
            &self.config,
            self.fetcher,
            &application_id,
            self.registry,
            listener,
        )
        .await;

        handle.wait_until_ready(self.config.initialization_timeout()).await?;

        Ok(Producer { coordinator, handle, result, attachment, application_id })
    }
}
