//! The switch coordinator: discovery results in, client swaps out.
//!
//! On each discovery result the coordinator derives new client properties,
//! constructs a replacement underlying client, and commits it to the
//! [`ClientHandle`] — atomically, and serialized against other switches.
//!
//! # Locking discipline
//!
//! Two locks, deliberately distinct:
//! - the **switch lock** (an async mutex around the stored properties)
//!   serializes whole switch attempts, including the potentially slow client
//!   construction, so result N is fully installed before result N+1 begins
//! - the **pointer lock** (inside [`ClientHandle`]) guards only the
//!   current-client reference and is held for the final store alone
//!
//! Conflating the two would park every client call behind network-bound
//! construction; see [`handle`](crate::handle) for the pointer side.
//!
//! # Atomic-or-nothing updates
//!
//! All derivation happens on a *candidate* copy of the stored properties.
//! A failure anywhere before the commit — resolution, filtering,
//! construction, codec reconfiguration — leaves stored properties, codecs'
//! registry coordinates, and the installed client exactly as they were.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::codec::{CodecOptions, SerializerBinding};
use crate::discovery::{DiscoveryListener, DiscoveryResult, fields};
use crate::error::{ResolutionSnafu, Result, ShutdownSnafu};
use crate::handle::ClientHandle;
use crate::patterns::resolve_group;
use crate::properties::{ClientProperties, keys};
use crate::transport::{Transport, TransportFactory};

/// Pure allow-list filter applied before properties reach the factory.
pub type PropertyFilter = fn(&ClientProperties) -> ClientProperties;

/// Context handed to the pre-swap hook.
pub struct SwitchContext<C> {
    /// The client about to be displaced, if any.
    pub previous: Option<Arc<C>>,
    /// The candidate properties the replacement was built from.
    pub properties: ClientProperties,
    /// The discovery result driving the switch.
    pub result: DiscoveryResult,
}

/// Hook running after construction succeeds, before the swap commits.
///
/// The previous client is still installed and serving while this runs; a
/// consumer uses it to let cross-cluster offset distribution settle.
pub type BeforeSwapHook<C> =
    Box<dyn Fn(SwitchContext<C>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Hook running on the freshly installed client, before the old one closes.
///
/// A consumer uses it to re-establish subscriptions on the new cluster.
pub type AfterSwapHook<C> =
    Box<dyn Fn(Arc<C>, DiscoveryResult) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Reacts to discovery results by building and installing replacement
/// clients.
///
/// Register the coordinator (via `Arc`) as a [`DiscoveryListener`]; it is
/// the only writer of the stored properties and the only caller of
/// [`ClientHandle::swap`].
pub struct SwitchCoordinator<F: TransportFactory> {
    factory: F,
    handle: Arc<ClientHandle<F::Client>>,
    filter: PropertyFilter,
    bindings: Vec<SerializerBinding>,
    group_source: Option<String>,
    /// The switch lock; its contents are the stored properties.
    properties: Mutex<ClientProperties>,
    current_result: Arc<RwLock<Option<DiscoveryResult>>>,
    before_swap: Option<BeforeSwapHook<F::Client>>,
    after_swap: Option<AfterSwapHook<F::Client>>,
    switches: AtomicU64,
}

impl<F: TransportFactory> SwitchCoordinator<F> {
    /// Creates a coordinator writing through `handle`.
    #[must_use]
    pub fn new(factory: F, handle: Arc<ClientHandle<F::Client>>, filter: PropertyFilter) -> Self {
        Self {
            factory,
            handle,
            filter,
            bindings: Vec::new(),
            group_source: None,
            properties: Mutex::new(ClientProperties::new()),
            current_result: Arc::new(RwLock::new(None)),
            before_swap: None,
            after_swap: None,
            switches: AtomicU64::new(0),
        }
    }

    /// Seeds the stored properties (identity, TLS, base overrides).
    #[must_use]
    pub fn with_initial_properties(self, properties: ClientProperties) -> Self {
        Self { properties: Mutex::new(properties), ..self }
    }

    /// Attaches registry-backed codec bindings to reconfigure on switches.
    #[must_use]
    pub fn with_bindings(mut self, bindings: Vec<SerializerBinding>) -> Self {
        self.bindings = bindings;
        self
    }

    /// Enables consumer group-id resolution from the given application id.
    ///
    /// Producers leave this unset; group resolution is then a no-op.
    #[must_use]
    pub fn with_group_source(mut self, application_id: impl Into<String>) -> Self {
        self.group_source = Some(application_id.into());
        self
    }

    /// Installs the pre-swap hook.
    #[must_use]
    pub fn on_before_swap(mut self, hook: BeforeSwapHook<F::Client>) -> Self {
        self.before_swap = Some(hook);
        self
    }

    /// Installs the post-swap hook.
    #[must_use]
    pub fn on_after_swap(mut self, hook: AfterSwapHook<F::Client>) -> Self {
        self.after_swap = Some(hook);
        self
    }

    /// The handle this coordinator writes through.
    #[must_use]
    pub fn handle(&self) -> &Arc<ClientHandle<F::Client>> {
        &self.handle
    }

    /// Shared view of the most recently committed discovery result.
    #[must_use]
    pub fn shared_result(&self) -> Arc<RwLock<Option<DiscoveryResult>>> {
        Arc::clone(&self.current_result)
    }

    /// The most recently committed discovery result.
    #[must_use]
    pub fn current_result(&self) -> Option<DiscoveryResult> {
        self.current_result.read().clone()
    }

    /// Snapshot of the stored properties.
    pub async fn properties(&self) -> ClientProperties {
        self.properties.lock().await.clone()
    }

    /// Number of completed switches.
    #[must_use]
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::Relaxed)
    }

    /// Runs one switch attempt for `result`.
    ///
    /// # Errors
    ///
    /// Resolution and construction failures abort the attempt and leave the
    /// previous client, properties, and codecs untouched.
    pub async fn switch(&self, result: DiscoveryResult) -> Result<()> {
        // Switch lock: one switch at a time, in delivery order. Held across
        // construction on purpose; never overlaps the pointer lock.
        let mut properties = self.properties.lock().await;

        if self.handle.is_closed() {
            return ShutdownSnafu.fail();
        }

        // Derive onto a candidate; the stored map stays untouched until commit.
        let mut candidate = properties.clone();

        if let Some(application_id) = &self.group_source {
            let group = resolve_group(&result, application_id)?;
            debug!(group = %group, "resolved consumer group id");
            candidate.set(keys::GROUP_ID, group);
        }

        let Some(servers) = result.bootstrap_servers() else {
            return ResolutionSnafu {
                pattern: fields::BOOTSTRAP_SERVERS,
                missing: fields::BOOTSTRAP_SERVERS,
            }
            .fail();
        };
        candidate.set(keys::BOOTSTRAP_SERVERS, servers.as_str());

        // Registry-backed codecs need a registry; the first candidate URL is
        // authoritative. Without bindings the registry list is irrelevant.
        let codec_options = if self.bindings.is_empty() {
            None
        } else {
            let Some(url) = result.first_schema_registry_url() else {
                return ResolutionSnafu {
                    pattern: fields::SCHEMA_REGISTRY_URL,
                    missing: fields::SCHEMA_REGISTRY_URL,
                }
                .fail();
            };
            Some(CodecOptions::from_properties(url, &candidate))
        };

        let filtered = (self.filter)(&candidate);
        debug!(bootstrap_servers = %servers, keys = filtered.len(), "constructing replacement client");
        let new_client = Arc::new(self.factory.build(&filtered).await?);

        if let Some(hook) = &self.before_swap {
            hook(SwitchContext {
                previous: self.handle.try_current(),
                properties: candidate.clone(),
                result: result.clone(),
            })
            .await;
        }

        // Construction succeeded; re-point codecs before exposing the new
        // client. Same codec objects, new registry coordinates.
        if let Some(options) = &codec_options {
            for binding in &self.bindings {
                binding.reconfigure(options)?;
            }
        }

        *properties = candidate;
        *self.current_result.write() = Some(result.clone());

        let displaced = self.handle.swap(Arc::clone(&new_client));
        if displaced.as_ref().is_some_and(|d| Arc::ptr_eq(d, &new_client)) {
            // Handle closed mid-switch; the swap bounced our client back.
            new_client.close().await;
            return ShutdownSnafu.fail();
        }

        let switch = self.switches.fetch_add(1, Ordering::Relaxed) + 1;
        info!(bootstrap_servers = %servers, switch, "installed replacement client");

        if let Some(hook) = &self.after_swap {
            hook(Arc::clone(&new_client), result).await?;
        }

        if let Some(old) = displaced {
            old.close().await;
        }
        Ok(())
    }
}

#[async_trait]
impl<F: TransportFactory> DiscoveryListener for SwitchCoordinator<F> {
    async fn on_discovery_properties_changed(&self, result: DiscoveryResult) -> Result<()> {
        if let Err(e) = self.switch(result).await {
            warn!(error = %e, "switch aborted; previous client remains active");
            return Err(e);
        }
        Ok(())
    }
}

impl<F: TransportFactory> std::fmt::Debug for SwitchCoordinator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchCoordinator")
            .field("group_source", &self.group_source)
            .field("bindings", &self.bindings.len())
            .field("switches", &self.switch_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ClientError;
    use crate::codec::CodecSlot;
    use crate::mock::{MockConsumerFactory, MockRegistryCodec};
    use crate::properties::filter_consumer_properties;

    fn result(servers: &str, registries: &[&str]) -> DiscoveryResult {
        DiscoveryResult::builder()
            .field(fields::TENANT, "acme")
            .field(fields::INSTANCE, "prod")
            .field(fields::ENVIRONMENT, "eu")
            .field(fields::GROUP_ID_PATTERN, "{tenant}-{instance}-{environment}-{group}")
            .field(fields::TOPIC_PATTERN, "{tenant}-{instance}-{environment}-{topic}")
            .values(fields::BOOTSTRAP_SERVERS, servers.split(',').collect::<Vec<_>>())
            .values(fields::SCHEMA_REGISTRY_URL, registries.to_vec())
            .build()
    }

    fn coordinator(factory: MockConsumerFactory) -> SwitchCoordinator<MockConsumerFactory> {
        SwitchCoordinator::new(factory, Arc::new(ClientHandle::new()), filter_consumer_properties)
            .with_initial_properties(
                ClientProperties::new().with(keys::APPLICATION_ID, "billing"),
            )
            .with_group_source("billing")
    }

    #[tokio::test]
    async fn test_switch_installs_client_from_filtered_properties() {
        let coordinator = coordinator(MockConsumerFactory::new());

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();

        let client = coordinator.handle().current().unwrap();
        assert_eq!(client.properties().get_str(keys::BOOTSTRAP_SERVERS), Some("a:9092"));
        assert_eq!(client.properties().get_str(keys::GROUP_ID), Some("acme-prod-eu-billing"));
        // Internal keys never reach the factory.
        assert!(!client.properties().contains_key(keys::APPLICATION_ID));
        assert_eq!(coordinator.switch_count(), 1);
    }

    #[tokio::test]
    async fn test_switch_merges_into_stored_properties() {
        let coordinator = coordinator(MockConsumerFactory::new());

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();
        coordinator.switch(result("b:9092,c:9092", &["http://reg1"])).await.unwrap();

        let properties = coordinator.properties().await;
        assert_eq!(properties.get_str(keys::BOOTSTRAP_SERVERS), Some("b:9092,c:9092"));
        // Unfiltered stored properties keep identity keys.
        assert_eq!(properties.get_str(keys::APPLICATION_ID), Some("billing"));
    }

    #[tokio::test]
    async fn test_failed_construction_keeps_previous_client() {
        let factory = MockConsumerFactory::new();
        let coordinator = coordinator(factory);

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();
        let before = coordinator.handle().current().unwrap();
        let properties_before = coordinator.properties().await;

        let factory = &coordinator.factory;
        factory.inject_failures(1);
        let err = coordinator.switch(result("b:9092", &["http://reg1"])).await.unwrap_err();

        assert!(matches!(err, ClientError::Construction { .. }));
        let after = coordinator.handle().current().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(coordinator.properties().await, properties_before);
        assert_eq!(coordinator.switch_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_group_pattern_aborts_before_construction() {
        let factory = MockConsumerFactory::new();
        let coordinator = coordinator(factory);

        let bare = DiscoveryResult::builder()
            .field(fields::BOOTSTRAP_SERVERS, "a:9092")
            .build();
        let err = coordinator.switch(bare).await.unwrap_err();

        assert!(matches!(err, ClientError::Resolution { .. }));
        assert_eq!(coordinator.factory.build_count(), 0);
        assert!(matches!(
            coordinator.handle().current().unwrap_err(),
            ClientError::NotReady
        ));
    }

    #[tokio::test]
    async fn test_missing_registry_url_with_bindings_is_resolution_error() {
        let codec = Arc::new(MockRegistryCodec::new());
        let coordinator = coordinator(MockConsumerFactory::new()).with_bindings(vec![
            SerializerBinding::new(CodecSlot::ValueDeserializer, codec.clone()),
        ]);

        let err = coordinator.switch(result("a:9092", &[])).await.unwrap_err();

        assert!(matches!(err, ClientError::Resolution { .. }));
        assert!(codec.registry_url().is_none());
        assert_eq!(coordinator.factory.build_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_registry_url_without_bindings_is_fine() {
        let coordinator = coordinator(MockConsumerFactory::new());
        coordinator.switch(result("a:9092", &[])).await.unwrap();
        assert!(coordinator.handle().is_ready());
    }

    #[tokio::test]
    async fn test_codec_reconfigured_to_first_registry_url() {
        let codec = Arc::new(MockRegistryCodec::new());
        let coordinator = coordinator(MockConsumerFactory::new()).with_bindings(vec![
            SerializerBinding::new(CodecSlot::ValueDeserializer, codec.clone()),
        ]);

        coordinator
            .switch(result("a:9092", &["http://reg1", "http://reg2"]))
            .await
            .unwrap();

        assert_eq!(codec.registry_url().as_deref(), Some("http://reg1"));
        assert_eq!(codec.configure_count(), 1);
    }

    #[tokio::test]
    async fn test_codec_identity_survives_switches() {
        let codec = Arc::new(MockRegistryCodec::new());
        let binding = SerializerBinding::new(CodecSlot::KeyDeserializer, codec.clone());
        let bound_before = Arc::clone(binding.codec());
        let coordinator = coordinator(MockConsumerFactory::new()).with_bindings(vec![binding]);

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();
        coordinator.switch(result("b:9092", &["http://reg9"])).await.unwrap();

        // Same object, new coordinates.
        assert!(Arc::ptr_eq(&bound_before, coordinator.bindings[0].codec()));
        assert_eq!(codec.registry_url().as_deref(), Some("http://reg9"));
        assert_eq!(codec.configure_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_construction_leaves_codec_untouched() {
        let codec = Arc::new(MockRegistryCodec::new());
        let coordinator = coordinator(MockConsumerFactory::new()).with_bindings(vec![
            SerializerBinding::new(CodecSlot::ValueDeserializer, codec.clone()),
        ]);

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();
        coordinator.factory.inject_failures(1);
        coordinator.switch(result("b:9092", &["http://reg2"])).await.unwrap_err();

        assert_eq!(codec.registry_url().as_deref(), Some("http://reg1"));
    }

    #[tokio::test]
    async fn test_old_client_closed_after_swap() {
        let coordinator = coordinator(MockConsumerFactory::new());

        coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap();
        let first = coordinator.factory.last_built().unwrap();
        assert!(!first.is_closed());

        coordinator.switch(result("b:9092", &["http://reg1"])).await.unwrap();
        assert!(first.is_closed());
        let second = coordinator.factory.last_built().unwrap();
        assert!(!second.is_closed());
    }

    #[tokio::test]
    async fn test_concurrent_switches_serialize_in_lock_order() {
        let factory = MockConsumerFactory::new();
        // First switch constructs slowly; the second is instant.
        factory.push_delay(Duration::from_millis(80));
        let coordinator = Arc::new(coordinator(factory));

        let r1 = result("r1:9092", &["http://reg1"]);
        let r2 = result("r2:9092", &["http://reg1"]);

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.switch(r1).await })
        };
        // Let the first switch take the lock before delivering the second.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move { coordinator.switch(r2).await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        // Despite r1's construction latency, r2 was installed last.
        let current = coordinator.handle().current().unwrap();
        assert_eq!(current.properties().get_str(keys::BOOTSTRAP_SERVERS), Some("r2:9092"));
        assert_eq!(coordinator.switch_count(), 2);
    }

    #[tokio::test]
    async fn test_switch_after_close_is_shutdown() {
        let coordinator = coordinator(MockConsumerFactory::new());
        coordinator.handle().close();

        let err = coordinator.switch(result("a:9092", &["http://reg1"])).await.unwrap_err();
        assert!(matches!(err, ClientError::Shutdown));
        assert_eq!(coordinator.factory.build_count(), 0);
    }

    #[tokio::test]
    async fn test_listener_contract_reports_failures() {
        let coordinator = Arc::new(coordinator(MockConsumerFactory::new()));
        coordinator.factory.inject_failures(1);

        let listener: Arc<dyn DiscoveryListener> = coordinator.clone();
        let err = listener
            .on_discovery_properties_changed(result("a:9092", &["http://reg1"]))
            .await
            .unwrap_err();
        assert!(err.aborts_switch());
    }
}
