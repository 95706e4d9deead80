//! Controllable in-memory collaborators for testing switching behavior.
//!
//! This module provides mock implementations of every external collaborator
//! the SDK depends on, so discovery-driven switching can be exercised without
//! a cluster:
//!
//! - **Scripted discovery**: queue results, inject fetch failures
//! - **Construction control**: fail the next N builds, add per-build latency
//! - **Call tracking**: inspect subscriptions, commits, sent records
//! - **Codec tracking**: observe reconfiguration without a real registry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use streamline_sdk::mock::{MockConsumerFactory, MockDiscoveryFetcher};
//! use streamline_sdk::{ClientConfig, Consumer, DiscoveryResult, fields};
//!
//! # async fn example() -> streamline_sdk::Result<()> {
//! let fetcher = Arc::new(MockDiscoveryFetcher::new());
//! fetcher.push_result(
//!     DiscoveryResult::builder()
//!         .field(fields::BOOTSTRAP_SERVERS, "a:9092")
//!         .values(fields::SCHEMA_REGISTRY_URL, ["http://reg1"])
//!         .build(),
//! );
//!
//! let config = ClientConfig::builder().application_id("app").build()?;
//! let consumer = Consumer::builder(config, MockConsumerFactory::new(), fetcher).connect().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use streamline_types::{
    ConsumerRecord, Offset, ProducerRecord, RecordMetadata, TopicPartition, TopicPartitionOffset,
};

use crate::codec::{CodecOptions, RegistryCodec};
use crate::discovery::{DiscoveryFetcher, DiscoveryResult};
use crate::error::{CallSnafu, ConstructionSnafu, DiscoverySnafu, Result};
use crate::properties::ClientProperties;
use crate::transport::{ConsumerTransport, ProducerTransport, Transport, TransportFactory};

// ============================================================================
// Discovery
// ============================================================================

/// A discovery fetcher backed by a script of results.
///
/// Queued results are returned in order; the last one keeps repeating, which
/// models a steady feed. An empty script fails the fetch.
#[derive(Debug, Default)]
pub struct MockDiscoveryFetcher {
    script: Mutex<VecDeque<DiscoveryResult>>,
    steady: RwLock<Option<DiscoveryResult>>,
    failures: AtomicUsize,
    fetch_count: AtomicUsize,
}

impl MockDiscoveryFetcher {
    /// Creates a fetcher with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a result.
    pub fn push_result(&self, result: DiscoveryResult) {
        self.script.lock().push_back(result);
    }

    /// Makes the next `n` fetches fail.
    pub fn inject_failures(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of fetch calls observed.
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryFetcher for MockDiscoveryFetcher {
    async fn fetch(&self, _application_id: &str) -> Result<DiscoveryResult> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return DiscoverySnafu { message: "injected fetch failure" }.fail();
        }

        if let Some(result) = self.script.lock().pop_front() {
            *self.steady.write() = Some(result.clone());
            return Ok(result);
        }
        match self.steady.read().clone() {
            Some(result) => Ok(result),
            None => DiscoverySnafu { message: "no discovery result scripted" }.fail(),
        }
    }
}

// ============================================================================
// Consumer transport
// ============================================================================

#[derive(Debug)]
struct ConsumerState {
    properties: ClientProperties,
    subscriptions: RwLock<Vec<String>>,
    records: Mutex<VecDeque<ConsumerRecord>>,
    assignment: RwLock<Vec<TopicPartition>>,
    committed: RwLock<Vec<TopicPartitionOffset>>,
    positions: RwLock<Vec<TopicPartitionOffset>>,
    paused: RwLock<Vec<TopicPartition>>,
    poll_count: AtomicUsize,
    closed: AtomicBool,
    fail_calls: AtomicBool,
}

/// In-memory consumer transport with call tracking.
///
/// Cloning shares the underlying state, so tests can keep a handle to a
/// client the factory built and the coordinator swapped in.
#[derive(Debug, Clone)]
pub struct MockConsumer {
    state: Arc<ConsumerState>,
}

impl MockConsumer {
    fn build(properties: ClientProperties) -> Self {
        Self {
            state: Arc::new(ConsumerState {
                properties,
                subscriptions: RwLock::new(Vec::new()),
                records: Mutex::new(VecDeque::new()),
                assignment: RwLock::new(Vec::new()),
                committed: RwLock::new(Vec::new()),
                positions: RwLock::new(Vec::new()),
                paused: RwLock::new(Vec::new()),
                poll_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                fail_calls: AtomicBool::new(false),
            }),
        }
    }

    /// The filtered properties this client was constructed with.
    #[must_use]
    pub fn properties(&self) -> &ClientProperties {
        &self.state.properties
    }

    /// Queues a record for the next `poll`.
    pub fn push_record(&self, record: ConsumerRecord) {
        self.state.records.lock().push_back(record);
    }

    /// Seeds the partition assignment.
    pub fn set_assignment(&self, partitions: Vec<TopicPartition>) {
        *self.state.assignment.write() = partitions;
    }

    /// Current subscription set, as the transport saw it.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.subscriptions.read().clone()
    }

    /// All offsets committed so far.
    #[must_use]
    pub fn committed(&self) -> Vec<TopicPartitionOffset> {
        self.state.committed.read().clone()
    }

    /// Partitions currently paused.
    #[must_use]
    pub fn paused(&self) -> Vec<TopicPartition> {
        self.state.paused.read().clone()
    }

    /// Number of poll calls observed.
    #[must_use]
    pub fn poll_count(&self) -> usize {
        self.state.poll_count.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail with a call error.
    pub fn fail_calls(&self, fail: bool) {
        self.state.fail_calls.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.state.fail_calls.load(Ordering::SeqCst) {
            return CallSnafu { message: "injected call failure" }.fail();
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for MockConsumer {
    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConsumerTransport for MockConsumer {
    async fn subscribe(&self, topics: &[String]) -> Result<()> {
        self.check()?;
        *self.state.subscriptions.write() = topics.to_vec();
        Ok(())
    }

    async fn unsubscribe(&self) -> Result<()> {
        self.check()?;
        self.state.subscriptions.write().clear();
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Option<ConsumerRecord>> {
        self.check()?;
        self.state.poll_count.fetch_add(1, Ordering::SeqCst);
        if let Some(record) = self.state.records.lock().pop_front() {
            return Ok(Some(record));
        }
        tokio::time::sleep(timeout).await;
        Ok(self.state.records.lock().pop_front())
    }

    async fn commit(
        &self,
        offsets: &[TopicPartitionOffset],
    ) -> Result<Vec<TopicPartitionOffset>> {
        self.check()?;
        self.state.committed.write().extend_from_slice(offsets);
        Ok(offsets.to_vec())
    }

    async fn assignment(&self) -> Result<Vec<TopicPartition>> {
        self.check()?;
        Ok(self.state.assignment.read().clone())
    }

    async fn position(
        &self,
        partitions: &[TopicPartition],
    ) -> Result<Vec<TopicPartitionOffset>> {
        self.check()?;
        let positions = self.state.positions.read();
        Ok(partitions
            .iter()
            .map(|p| {
                positions
                    .iter()
                    .find(|pos| pos.topic == p.topic && pos.partition == p.partition)
                    .cloned()
                    .unwrap_or_else(|| p.clone().at(Offset::Invalid))
            })
            .collect())
    }

    async fn pause(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.check()?;
        self.state.paused.write().extend_from_slice(partitions);
        Ok(())
    }

    async fn resume(&self, partitions: &[TopicPartition]) -> Result<()> {
        self.check()?;
        self.state.paused.write().retain(|p| !partitions.contains(p));
        Ok(())
    }

    async fn seek(&self, offset: &TopicPartitionOffset) -> Result<()> {
        self.check()?;
        let mut positions = self.state.positions.write();
        positions.retain(|p| !(p.topic == offset.topic && p.partition == offset.partition));
        positions.push(offset.clone());
        Ok(())
    }
}

// ============================================================================
// Producer transport
// ============================================================================

#[derive(Debug)]
struct ProducerState {
    properties: ClientProperties,
    sent: Mutex<Vec<ProducerRecord>>,
    next_offset: AtomicI64,
    flush_count: AtomicUsize,
    closed: AtomicBool,
    fail_calls: AtomicBool,
}

/// In-memory producer transport with call tracking.
#[derive(Debug, Clone)]
pub struct MockProducer {
    state: Arc<ProducerState>,
}

impl MockProducer {
    fn build(properties: ClientProperties) -> Self {
        Self {
            state: Arc::new(ProducerState {
                properties,
                sent: Mutex::new(Vec::new()),
                next_offset: AtomicI64::new(0),
                flush_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                fail_calls: AtomicBool::new(false),
            }),
        }
    }

    /// The filtered properties this client was constructed with.
    #[must_use]
    pub fn properties(&self) -> &ClientProperties {
        &self.state.properties
    }

    /// All records sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<ProducerRecord> {
        self.state.sent.lock().clone()
    }

    /// Number of flush calls observed.
    #[must_use]
    pub fn flush_count(&self) -> usize {
        self.state.flush_count.load(Ordering::SeqCst)
    }

    /// Whether `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Makes every subsequent call fail with a call error.
    pub fn fail_calls(&self, fail: bool) {
        self.state.fail_calls.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for MockProducer {
    async fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProducerTransport for MockProducer {
    async fn send(&self, record: ProducerRecord) -> Result<RecordMetadata> {
        if self.state.fail_calls.load(Ordering::SeqCst) {
            return CallSnafu { message: "injected call failure" }.fail();
        }
        let metadata = RecordMetadata {
            topic: record.topic.clone(),
            partition: record.partition.unwrap_or(0),
            offset: self.state.next_offset.fetch_add(1, Ordering::SeqCst),
            timestamp: record.timestamp,
        };
        self.state.sent.lock().push(record);
        Ok(metadata)
    }

    async fn flush(&self, _timeout: Duration) -> Result<()> {
        if self.state.fail_calls.load(Ordering::SeqCst) {
            return CallSnafu { message: "injected call failure" }.fail();
        }
        self.state.flush_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Factories
// ============================================================================

#[derive(Debug, Default)]
struct FactoryControls {
    failures: AtomicUsize,
    delays: Mutex<VecDeque<Duration>>,
    build_count: AtomicUsize,
}

impl FactoryControls {
    async fn gate(&self) -> Result<()> {
        let delay = self.delays.lock().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.build_count.fetch_add(1, Ordering::SeqCst);
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return ConstructionSnafu { message: "injected construction failure" }.fail();
        }
        Ok(())
    }
}

#[derive(Debug)]
struct FactoryInner<T> {
    controls: FactoryControls,
    built: RwLock<Vec<T>>,
}

// Manual impl: the derive would demand `T: Default` although none is needed.
impl<T> Default for FactoryInner<T> {
    fn default() -> Self {
        Self { controls: FactoryControls::default(), built: RwLock::new(Vec::new()) }
    }
}

/// Factory producing [`MockConsumer`]s, with failure and latency injection.
///
/// Clones share state, so tests can keep one clone for introspection after
/// handing the factory to a coordinator.
#[derive(Debug, Clone, Default)]
pub struct MockConsumerFactory {
    inner: Arc<FactoryInner<MockConsumer>>,
}

impl MockConsumerFactory {
    /// Creates a factory with no scripted failures or delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` builds fail.
    pub fn inject_failures(&self, n: usize) {
        self.inner.controls.failures.store(n, Ordering::SeqCst);
    }

    /// Adds a construction latency for the next build.
    pub fn push_delay(&self, delay: Duration) {
        self.inner.controls.delays.lock().push_back(delay);
    }

    /// Number of build attempts observed (failed ones included).
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.inner.controls.build_count.load(Ordering::SeqCst)
    }

    /// All successfully built clients, oldest first.
    #[must_use]
    pub fn built(&self) -> Vec<MockConsumer> {
        self.inner.built.read().clone()
    }

    /// The most recently built client.
    #[must_use]
    pub fn last_built(&self) -> Option<MockConsumer> {
        self.inner.built.read().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for MockConsumerFactory {
    type Client = MockConsumer;

    async fn build(&self, properties: &ClientProperties) -> Result<Self::Client> {
        self.inner.controls.gate().await?;
        let client = MockConsumer::build(properties.clone());
        self.inner.built.write().push(client.clone());
        Ok(client)
    }
}

/// Factory producing [`MockProducer`]s, with failure and latency injection.
///
/// Clones share state, like [`MockConsumerFactory`].
#[derive(Debug, Clone, Default)]
pub struct MockProducerFactory {
    inner: Arc<FactoryInner<MockProducer>>,
}

impl MockProducerFactory {
    /// Creates a factory with no scripted failures or delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` builds fail.
    pub fn inject_failures(&self, n: usize) {
        self.inner.controls.failures.store(n, Ordering::SeqCst);
    }

    /// Adds a construction latency for the next build.
    pub fn push_delay(&self, delay: Duration) {
        self.inner.controls.delays.lock().push_back(delay);
    }

    /// Number of build attempts observed (failed ones included).
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.inner.controls.build_count.load(Ordering::SeqCst)
    }

    /// All successfully built clients, oldest first.
    #[must_use]
    pub fn built(&self) -> Vec<MockProducer> {
        self.inner.built.read().clone()
    }

    /// The most recently built client.
    #[must_use]
    pub fn last_built(&self) -> Option<MockProducer> {
        self.inner.built.read().last().cloned()
    }
}

#[async_trait]
impl TransportFactory for MockProducerFactory {
    type Client = MockProducer;

    async fn build(&self, properties: &ClientProperties) -> Result<Self::Client> {
        self.inner.controls.gate().await?;
        let client = MockProducer::build(properties.clone());
        self.inner.built.write().push(client.clone());
        Ok(client)
    }
}

// ============================================================================
// Registry codec
// ============================================================================

/// A registry codec that records its configuration instead of talking to a
/// registry.
#[derive(Debug, Default)]
pub struct MockRegistryCodec {
    configured: RwLock<Option<CodecOptions>>,
    configure_count: AtomicUsize,
    fail_next: AtomicBool,
}

impl MockRegistryCodec {
    /// Creates an unconfigured codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry URL the codec currently points at.
    #[must_use]
    pub fn registry_url(&self) -> Option<String> {
        self.configured.read().as_ref().map(|o| o.registry_url.clone())
    }

    /// The full options from the last reconfiguration.
    #[must_use]
    pub fn options(&self) -> Option<CodecOptions> {
        self.configured.read().clone()
    }

    /// Number of reconfigurations observed.
    #[must_use]
    pub fn configure_count(&self) -> usize {
        self.configure_count.load(Ordering::SeqCst)
    }

    /// Makes the next reconfiguration fail.
    pub fn inject_failure(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl RegistryCodec for MockRegistryCodec {
    fn configure(&self, options: &CodecOptions) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return ConstructionSnafu { message: "injected codec failure" }.fail();
        }
        self.configure_count.fetch_add(1, Ordering::SeqCst);
        *self.configured.write() = Some(options.clone());
        Ok(())
    }
}
