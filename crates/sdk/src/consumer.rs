//! The consumer surface: a stable consumer that follows the platform.
//!
//! [`Consumer`] wraps a [`ClientHandle`] plus a [`SwitchCoordinator`] wired
//! into the discovery feed. The application subscribes, polls, and commits
//! with logical topic names; underneath, the current underlying consumer may
//! be replaced between any two calls without the application noticing:
//!
//! - arguments are resolved to physical names, results unresolved back
//! - subscriptions are re-established on every freshly installed client
//! - before an at-most-once consumer swaps clusters, the switch waits for
//!   cross-cluster offset distribution to settle (the old client keeps
//!   serving during the wait)

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use streamline_types::{
    ConsumerRecord, TopicPartition, TopicPartitionOffset, validate_topic_name,
};
use tracing::debug;

use crate::codec::{CodecSlot, RegistryCodec, SerializerBinding};
use crate::config::ClientConfig;
use crate::discovery::{
    DiscoveryFetcher, DiscoveryListener, DiscoveryPoller, DiscoveryRegistry, DiscoveryResult,
    fields,
};
use crate::error::{ConfigSnafu, NotReadySnafu, Result};
use crate::handle::ClientHandle;
use crate::patterns::{
    resolve_offsets, resolve_partition, resolve_partitions, resolve_topics, unresolve_offsets,
    unresolve_partitions, unresolve_topic,
};
use crate::properties::{ClientProperties, filter_consumer_properties, keys};
use crate::streaming::{DEFAULT_POLL_TIMEOUT, RecordStream};
use crate::switch::{AfterSwapHook, BeforeSwapHook, SwitchContext, SwitchCoordinator};
use crate::transport::{ConsumerTransport, Transport, TransportFactory};

/// How a client is attached to its discovery feed.
pub(crate) struct Attachment {
    pub(crate) poller: DiscoveryPoller,
    registry: Option<DiscoveryRegistry>,
    listener: Arc<dyn DiscoveryListener>,
}

impl Attachment {
    pub(crate) fn detach(&self, application_id: &str) {
        match &self.registry {
            Some(registry) => registry.deregister(application_id, &self.listener),
            None => self.poller.stop(),
        }
    }
}

/// A discovery-driven consumer.
///
/// Create one with [`Consumer::builder`] or [`Consumer::connect`]. The value
/// is cheap to share behind an `Arc`; all methods take `&self`.
pub struct Consumer<F: TransportFactory>
where
    F::Client: ConsumerTransport,
{
    coordinator: Arc<SwitchCoordinator<F>>,
    handle: Arc<ClientHandle<F::Client>>,
    result: Arc<RwLock<Option<DiscoveryResult>>>,
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
    attachment: Attachment,
    application_id: String,
}

impl<F: TransportFactory> Consumer<F>
where
    F::Client: ConsumerTransport,
{
    /// Starts building a consumer.
    #[must_use]
    pub fn builder(
        config: ClientConfig,
        factory: F,
        fetcher: Arc<dyn DiscoveryFetcher>,
    ) -> ConsumerBuilder<F> {
        ConsumerBuilder { config, factory, fetcher, bindings: Vec::new(), registry: None }
    }

    /// Connects with no codec bindings and a private discovery poller.
    ///
    /// # Errors
    ///
    /// See [`ConsumerBuilder::connect`].
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

    /// The application id this consumer was configured with.
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

    /// Subscribes to logical topics, keeping earlier subscriptions.
    ///
    /// The accumulated set is re-established automatically on every cluster
    /// switch, resolved against the then-current discovery result.
    ///
    /// # Errors
    ///
    /// Fails on invalid topic names, unresolvable patterns, or transport
    /// errors from the underlying client.
    pub async fn subscribe(&self, topics: &[&str]) -> Result<()> {
        for topic in topics {
            validate_topic_name(topic)
                .map_err(|e| ConfigSnafu { message: e.to_string() }.build())?;
        }

        let union: Vec<String> = {
            let mut subscriptions = self.subscriptions.lock();
            for topic in topics {
                subscriptions.insert((*topic).to_owned());
            }
            subscriptions.iter().cloned().collect()
        };

        let result = self.discovery_snapshot()?;
        let resolved = resolve_topics(&result, &union)?;
        self.handle.call(|client| async move { client.subscribe(&resolved).await }).await
    }

    /// Drops all subscriptions.
    ///
    /// # Errors
    ///
    /// Propagates transport errors from the underlying client.
    pub async fn unsubscribe(&self) -> Result<()> {
        self.subscriptions.lock().clear();
        self.handle.call(|client| async move { client.unsubscribe().await }).await
    }

    /// Fetches the next record, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// Propagates transport errors unchanged; a switch concurrent with the
    /// call does not interrupt it.
    pub async fn poll(&self, timeout: Duration) -> Result<Option<ConsumerRecord>> {
        let record =
            self.handle.call(|client| async move { client.poll(timeout).await }).await?;
        let result = self.discovery_snapshot()?;
        Ok(record.map(|r| ConsumerRecord { topic: unresolve_topic(&result, &r.topic), ..r }))
    }

    /// Endless record stream polling at the default timeout.
    #[must_use]
    pub fn records(&self) -> RecordStream<F::Client> {
        self.records_with_timeout(DEFAULT_POLL_TIMEOUT)
    }

    /// Endless record stream with an explicit per-poll timeout.
    #[must_use]
    pub fn records_with_timeout(&self, poll_timeout: Duration) -> RecordStream<F::Client> {
        RecordStream::new(Arc::clone(&self.handle), Arc::clone(&self.result), poll_timeout)
    }

    /// Commits offsets, returning the committed positions.
    ///
    /// # Errors
    ///
    /// Fails on unresolvable topics or transport errors.
    pub async fn commit(
        &self,
        offsets: &[TopicPartitionOffset],
    ) -> Result<Vec<TopicPartitionOffset>> {
        let result = self.discovery_snapshot()?;
        let resolved = resolve_offsets(&result, offsets)?;
        let committed = self
            .handle
            .call(|client| async move { client.commit(&resolved).await })
            .await?;
        Ok(unresolve_offsets(&result, committed))
    }

    /// Returns the assigned partitions, with logical topic names.
    ///
    /// # Errors
    ///
    /// Propagates transport errors.
    pub async fn assignment(&self) -> Result<Vec<TopicPartition>> {
        let assignment =
            self.handle.call(|client| async move { client.assignment().await }).await?;
        let result = self.discovery_snapshot()?;
        Ok(unresolve_partitions(&result, assignment))
    }

    /// Returns consume positions for the given partitions.
    ///
    /// # Errors
    ///
    /// Fails on unresolvable topics or transport errors.
    pub async fn position(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffset>> {
        let result = self.discovery_snapshot()?;
        let resolved = resolve_partitions(&result, partitions)?;
        let positions = self
            .handle
            .call(|client| async move { client.position(&resolved).await })
            .await?;
        Ok(unresolve_offsets(&result, positions))
    }

    /// Pauses fetching from the given partitions.
    ///
    /// # Errors
    ///
    /// Fails on unresolvable topics or transport errors.
    pub async fn pause(&self, partitions: &[TopicPartition]) -> Result<()> {
        let result = self.discovery_snapshot()?;
        let resolved = resolve_partitions(&result, partitions)?;
        self.handle.call(|client| async move { client.pause(&resolved).await }).await
    }

    /// Resumes fetching from the given partitions.
    ///
    /// # Errors
    ///
    /// Fails on unresolvable topics or transport errors.
    pub async fn resume(&self, partitions: &[TopicPartition]) -> Result<()> {
        let result = self.discovery_snapshot()?;
        let resolved = resolve_partitions(&result, partitions)?;
        self.handle.call(|client| async move { client.resume(&resolved).await }).await
    }

    /// Moves the consume position of one partition.
    ///
    /// # Errors
    ///
    /// Fails on unresolvable topics or transport errors.
    pub async fn seek(&self, offset: &TopicPartitionOffset) -> Result<()> {
        let result = self.discovery_snapshot()?;
        let resolved = TopicPartitionOffset {
            topic: resolve_partition(&result, &offset.partition())?.topic,
            partition: offset.partition,
            offset: offset.offset,
        };
        self.handle.call(|client| async move { client.seek(&resolved).await }).await
    }

    /// Detaches from discovery and closes the underlying client.
    pub async fn close(&self) {
        self.attachment.detach(&self.application_id);
        if let Some(client) = self.handle.close() {
            client.close().await;
        }
    }
}

impl<F: TransportFactory> std::fmt::Debug for Consumer<F>
where
    F::Client: ConsumerTransport,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("application_id", &self.application_id)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Consumer`].
pub struct ConsumerBuilder<F: TransportFactory> {
    config: ClientConfig,
    factory: F,
    fetcher: Arc<dyn DiscoveryFetcher>,
    bindings: Vec<SerializerBinding>,
    registry: Option<DiscoveryRegistry>,
}

impl<F: TransportFactory> ConsumerBuilder<F>
where
    F::Client: ConsumerTransport,
{
    /// Binds a registry-backed key deserializer.
    #[must_use]
    pub fn key_deserializer(mut self, codec: Arc<dyn RegistryCodec>) -> Self {
        self.bindings.push(SerializerBinding::new(CodecSlot::KeyDeserializer, codec));
        self
    }

    /// Binds a registry-backed value deserializer.
    #[must_use]
    pub fn value_deserializer(mut self, codec: Arc<dyn RegistryCodec>) -> Self {
        self.bindings.push(SerializerBinding::new(CodecSlot::ValueDeserializer, codec));
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
    /// configured initialization timeout; the underlying cause (fetch or
    /// switch failure) is logged by the poller.
    pub async fn connect(self) -> Result<Consumer<F>> {
        let application_id = self.config.application_id().to_owned();
        let handle = Arc::new(ClientHandle::new());
        let subscriptions = Arc::new(Mutex::new(BTreeSet::new()));

        let coordinator = Arc::new(
            SwitchCoordinator::new(self.factory, Arc::clone(&handle), filter_consumer_properties)
                .with_initial_properties(self.config.initial_properties())
                .with_group_source(&application_id)
                .with_bindings(self.bindings)
                .on_before_swap(settle_hook::<F::Client>())
                .on_after_swap(resubscribe_hook::<F::Client>(Arc::clone(&subscriptions))),
        );
        let result = coordinator.shared_result();
        let listener: Arc<dyn DiscoveryListener> = coordinator.clone();

        let attachment = attach(
            &self.config,
            self.fetcher,
            &application_id,
            self.registry,
            Arc::clone(&listener),
        )
        .await;

        handle.wait_until_ready(self.config.initialization_timeout()).await?;

        Ok(Consumer { coordinator, handle, result, subscriptions, attachment, application_id })
    }
}

/// Wires a listener into a private poller or a shared registry.
pub(crate) async fn attach(
    config: &ClientConfig,
    fetcher: Arc<dyn DiscoveryFetcher>,
    application_id: &str,
    registry: Option<DiscoveryRegistry>,
    listener: Arc<dyn DiscoveryListener>,
) -> Attachment {
    let poller = match &registry {
        Some(registry) => registry.register(
            fetcher,
            application_id,
            config.discovery().clone(),
            config.retry_policy().clone(),
            Arc::clone(&listener),
        ),
        None => {
            let poller = DiscoveryPoller::new(
                fetcher,
                application_id,
                config.discovery().clone(),
                config.retry_policy().clone(),
            );
            poller.add_listener(Arc::clone(&listener));
            poller.start();
            poller.trigger_refresh();
            poller
        }
    };

    // A shared poller may already hold a delivered result; replay it so a
    // late registrant converges without waiting for the next change. A
    // concurrent tick can at worst deliver the same result twice, which
    // switches to an identical configuration.
    if let Some(result) = poller.last_delivered() {
        if let Err(e) = listener.on_discovery_properties_changed(result).await {
            tracing::warn!(error = %e, "replaying cached discovery result failed");
        }
    }

    // Without a background task, deliver the first result on this task.
    if !config.discovery().is_enabled() {
        if let Err(e) = poller.refresh_once().await {
            tracing::warn!(error = %e, "initial discovery refresh failed");
        }
    }

    Attachment { poller, registry, listener }
}

/// Pre-swap settle: give cross-cluster offset distribution time to catch up
/// before an at-most-once consumer starts reading from the new cluster. The
/// displaced client keeps serving for the whole wait.
fn settle_hook<C: ConsumerTransport>() -> BeforeSwapHook<C> {
    Box::new(|ctx: SwitchContext<C>| {
        Box::pin(async move {
            let Some(previous) = ctx.previous else { return };
            let assigned = matches!(previous.assignment().await, Ok(a) if !a.is_empty());
            if !assigned {
                return;
            }
            let delay = switch_delay(&ctx.properties, &ctx.result);
            if !delay.is_zero() {
                debug!(
                    delay_ms = delay.as_millis() as u64,
                    "waiting for offset distribution before swap"
                );
                tokio::time::sleep(delay).await;
            }
        })
    })
}

/// Post-swap: re-establish the accumulated subscriptions on the new client,
/// resolved against the new cluster's naming.
fn resubscribe_hook<C: ConsumerTransport>(
    subscriptions: Arc<Mutex<BTreeSet<String>>>,
) -> AfterSwapHook<C> {
    Box::new(move |client: Arc<C>, result: DiscoveryResult| {
        let subscriptions = Arc::clone(&subscriptions);
        Box::pin(async move {
            let topics: Vec<String> = subscriptions.lock().iter().cloned().collect();
            if topics.is_empty() {
                return Ok(());
            }
            let resolved = resolve_topics(&result, &topics)?;
            debug!(topics = topics.len(), "re-subscribing on replacement client");
            client.subscribe(&resolved).await
        })
    })
}

/// Delay before committing a cluster swap.
///
/// At-least-once consumers re-read from committed offsets and switch
/// immediately. At-most-once consumers wait out the distribution budget
/// (per-hop timeout times distance, less the result's age), floored at the
/// result's TTL.
fn switch_delay(properties: &ClientProperties, result: &DiscoveryResult) -> Duration {
    if is_at_least_once(properties) {
        return Duration::ZERO;
    }
    let budget = result.millis_field(fields::DISTRIBUTOR_TIMEOUT_MS)
        * result.millis_field(fields::DISTRIBUTOR_DISTANCE);
    let elapsed = u64::try_from(result.age().as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(
        budget.saturating_sub(elapsed).max(result.millis_field(fields::TTL_MS)),
    )
}

fn is_at_least_once(properties: &ClientProperties) -> bool {
    matches!(
        properties.get_str(keys::AUTO_OFFSET_RESET),
        Some("earliest" | "smallest" | "begin" | "start")
    )
}
