//! Discovery results and the feed that delivers them.
//!
//! The discovery feed keeps clients pointed at a live endpoint set: each
//! result carries the connection parameters a client needs right now —
//! broker endpoints, schema registry candidates, naming patterns, and
//! distribution hints.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DiscoveryRegistry                        │
//! │   One poller per application id │ Listener fan-out          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    DiscoveryPoller                          │
//! │   Periodic fetch │ Change detection │ Listener dispatch     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    DiscoveryFetcher (host-provided)         │
//! │   The discovery transport; a black box to this crate        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Listeners receive a result only when it differs from the previously
//! delivered one, so a steady feed does not trigger needless client switches.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tokio::{sync::Notify, time::interval};
use tracing::{debug, info, warn};

use crate::{
    config::{DiscoveryConfig, RetryPolicy},
    error::Result,
    retry::with_retry,
};

/// Well-known discovery result fields.
pub mod fields {
    /// Broker endpoints; one or more values.
    pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
    /// Schema registry candidates; the first value is authoritative.
    pub const SCHEMA_REGISTRY_URL: &str = "schema.registry.url";
    /// Physical topic naming pattern, with a `{topic}` placeholder.
    pub const TOPIC_PATTERN: &str = "topic.pattern";
    /// Consumer group naming pattern, with a `{group}` placeholder.
    pub const GROUP_ID_PATTERN: &str = "group.id.pattern";
    /// Tenant name.
    pub const TENANT: &str = "tenant";
    /// Platform instance name.
    pub const INSTANCE: &str = "instance";
    /// Environment name.
    pub const ENVIRONMENT: &str = "environment";
    /// Per-hop offset distribution timeout, in milliseconds.
    pub const DISTRIBUTOR_TIMEOUT_MS: &str = "distributor.timeout.ms";
    /// Number of distribution hops between clusters.
    pub const DISTRIBUTOR_DISTANCE: &str = "distributor.distance";
    /// Minimum switch settle time, in milliseconds.
    pub const TTL_MS: &str = "ttl.ms";
}

/// An externally delivered record describing current connection parameters.
///
/// Results are immutable once built. Field values are lists to accommodate
/// multi-valued entries (broker endpoints, registry candidates); single-valued
/// fields are lists of one.
#[derive(Debug, Clone)]
pub struct DiscoveryResult {
    fields: BTreeMap<String, Vec<String>>,
    received_at: Instant,
}

impl DiscoveryResult {
    /// Creates a new result builder.
    #[must_use]
    pub fn builder() -> DiscoveryResultBuilder {
        DiscoveryResultBuilder::default()
    }

    /// Returns the first value for a field.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    /// Returns all values for a field.
    #[must_use]
    pub fn field_values(&self, key: &str) -> &[String] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Returns the broker endpoints as a comma-joined list.
    #[must_use]
    pub fn bootstrap_servers(&self) -> Option<String> {
        let values = self.field_values(fields::BOOTSTRAP_SERVERS);
        if values.is_empty() { None } else { Some(values.join(",")) }
    }

    /// Returns all schema registry candidates.
    #[must_use]
    pub fn schema_registry_urls(&self) -> &[String] {
        self.field_values(fields::SCHEMA_REGISTRY_URL)
    }

    /// Returns the authoritative (first) schema registry candidate.
    #[must_use]
    pub fn first_schema_registry_url(&self) -> Option<&str> {
        self.schema_registry_urls().first().map(String::as_str)
    }

    /// Returns a numeric field parsed as milliseconds, defaulting to zero.
    #[must_use]
    pub fn millis_field(&self, key: &str) -> u64 {
        self.field(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// Returns when this result was received.
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Returns how long ago this result was received.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.received_at.elapsed()
    }
}

// Equality ignores the receipt timestamp: two results carrying the same
// parameters describe the same cluster state.
impl PartialEq for DiscoveryResult {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for DiscoveryResult {}

/// Builder for [`DiscoveryResult`].
#[derive(Debug, Default)]
pub struct DiscoveryResultBuilder {
    fields: BTreeMap<String, Vec<String>>,
}

impl DiscoveryResultBuilder {
    /// Sets a single-valued field, replacing previous values.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), vec![value.into()]);
        self
    }

    /// Sets a multi-valued field, replacing previous values.
    #[must_use]
    pub fn values<I, S>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Builds the result, stamping the receipt time.
    #[must_use]
    pub fn build(self) -> DiscoveryResult {
        DiscoveryResult { fields: self.fields, received_at: Instant::now() }
    }
}

/// The discovery transport: fetches the current result for an application.
///
/// Implementations are host-provided; the SDK treats the transport as a
/// black box and never interprets its failures beyond retrying them.
#[async_trait]
pub trait DiscoveryFetcher: Send + Sync + 'static {
    /// Fetches the current discovery result for the application.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Discovery`](crate::ClientError::Discovery) when
    /// the transport cannot produce a result.
    async fn fetch(&self, application_id: &str) -> Result<DiscoveryResult>;
}

/// Callback contract for discovery-driven reconfiguration.
#[async_trait]
pub trait DiscoveryListener: Send + Sync + 'static {
    /// Invoked with each discovery result that differs from the previous one.
    ///
    /// # Errors
    ///
    /// A listener error aborts that listener's update only; the poller logs
    /// it and keeps running, and the next differing result is delivered again.
    async fn on_discovery_properties_changed(&self, result: DiscoveryResult) -> Result<()>;
}

/// Background poller delivering discovery results to listeners.
///
/// The poller can operate in two modes:
/// - **Background polling**: [`start()`](Self::start) spawns a task that
///   fetches at the configured interval
/// - **Manual refresh**: [`refresh_once()`](Self::refresh_once) fetches and
///   dispatches on the caller's task
///
/// # Thread Safety
///
/// The poller is thread-safe and can be cloned. All clones share the same
/// listener list and background task.
#[derive(Clone)]
pub struct DiscoveryPoller {
    inner: Arc<PollerInner>,
}

struct PollerInner {
    fetcher: Arc<dyn DiscoveryFetcher>,
    application_id: String,
    config: DiscoveryConfig,
    retry_policy: RetryPolicy,
    listeners: RwLock<Vec<Arc<dyn DiscoveryListener>>>,
    last_delivered: RwLock<Option<DiscoveryResult>>,
    running: AtomicBool,
    refresh_notify: Notify,
    shutdown_notify: Notify,
}

impl DiscoveryPoller {
    /// Creates a poller in the stopped state.
    #[must_use]
    pub fn new(
        fetcher: Arc<dyn DiscoveryFetcher>,
        application_id: impl Into<String>,
        config: DiscoveryConfig,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                fetcher,
                application_id: application_id.into(),
                config,
                retry_policy,
                listeners: RwLock::new(Vec::new()),
                last_delivered: RwLock::new(None),
                running: AtomicBool::new(false),
                refresh_notify: Notify::new(),
                shutdown_notify: Notify::new(),
            }),
        }
    }

    /// Returns the application id this poller serves.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.inner.application_id
    }

    /// Returns whether the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Relaxed)
    }

    /// Returns the last result delivered to listeners.
    #[must_use]
    pub fn last_delivered(&self) -> Option<DiscoveryResult> {
        self.inner.last_delivered.read().clone()
    }

    /// Registers a listener for future results.
    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        self.inner.listeners.write().push(listener);
    }

    /// Removes a listener by object identity. Returns how many remain.
    pub fn remove_listener(&self, listener: &Arc<dyn DiscoveryListener>) -> usize {
        let mut listeners = self.inner.listeners.write();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len()
    }

    /// Triggers an immediate fetch on the background task.
    pub fn trigger_refresh(&self) {
        self.inner.refresh_notify.notify_one();
    }

    /// Fetches once and dispatches to listeners if the result changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch fails after retries. Listener failures
    /// are logged, not returned; a failed listener sees the result again on
    /// the next change.
    pub async fn refresh_once(&self) -> Result<()> {
        let inner = &self.inner;
        let result = with_retry(&inner.retry_policy, || {
            let inner = Arc::clone(inner);
            async move { inner.fetcher.fetch(&inner.application_id).await }
        })
        .await?;

        let unchanged = inner.last_delivered.read().as_ref() == Some(&result);
        if unchanged {
            debug!(application_id = %inner.application_id, "discovery result unchanged, skipping dispatch");
            return Ok(());
        }

        info!(
            application_id = %inner.application_id,
            bootstrap_servers = ?result.bootstrap_servers(),
            "discovery properties changed, notifying listeners"
        );

        // Snapshot outside the dispatch so listener callbacks never run
        // under the listener lock.
        let listeners: Vec<_> = inner.listeners.read().clone();
        for listener in listeners {
            if let Err(e) = listener.on_discovery_properties_changed(result.clone()).await {
                warn!(
                    application_id = %inner.application_id,
                    error = %e,
                    "discovery listener failed; previous configuration stays active"
                );
            }
        }

        *inner.last_delivered.write() = Some(result);
        Ok(())
    }

    /// Starts the background polling task.
    ///
    /// Idempotent; a second call while running has no effect. Returns early
    /// without spawning when discovery polling is disabled in the config.
    pub fn start(&self) {
        if !self.inner.config.is_enabled() {
            debug!("discovery polling is disabled, not starting background task");
            return;
        }

        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("discovery poller already running");
            return;
        }

        let poller = self.clone();
        let poll_interval = self.inner.config.poll_interval();

        tokio::spawn(async move {
            info!(
                application_id = %poller.inner.application_id,
                interval = ?poll_interval,
                "starting discovery poller"
            );

            let mut ticker = interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = poller.refresh_once().await {
                            warn!(error = %e, "discovery poll failed");
                        }
                    }
                    _ = poller.inner.refresh_notify.notified() => {
                        debug!("immediate discovery refresh triggered");
                        if let Err(e) = poller.refresh_once().await {
                            warn!(error = %e, "triggered discovery refresh failed");
                        }
                    }
                    _ = poller.inner.shutdown_notify.notified() => {
                        info!(
                            application_id = %poller.inner.application_id,
                            "stopping discovery poller"
                        );
                        poller.inner.running.store(false, Ordering::SeqCst);
                        return;
                    }
                }
            }
        });
    }

    /// Stops the background polling task.
    pub fn stop(&self) {
        self.inner.shutdown_notify.notify_one();
    }
}

impl std::fmt::Debug for DiscoveryPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryPoller")
            .field("application_id", &self.inner.application_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Registry deduplicating one poller per application id.
///
/// Multiple clients for the same application share a single discovery feed;
/// the registry fans each result out to every registered listener and tears
/// the poller down when the last listener deregisters.
#[derive(Clone, Default)]
pub struct DiscoveryRegistry {
    pollers: Arc<DashMap<String, DiscoveryPoller>>,
}

impl DiscoveryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, creating and starting the application's poller
    /// on first registration.
    pub fn register(
        &self,
        fetcher: Arc<dyn DiscoveryFetcher>,
        application_id: &str,
        config: DiscoveryConfig,
        retry_policy: RetryPolicy,
        listener: Arc<dyn DiscoveryListener>,
    ) -> DiscoveryPoller {
        let poller = self
            .pollers
            .entry(application_id.to_owned())
            .or_insert_with(|| {
                let poller =
                    DiscoveryPoller::new(fetcher, application_id, config, retry_policy);
                poller.start();
                poller
            })
            .clone();
        poller.add_listener(listener);
        poller.trigger_refresh();
        poller
    }

    /// Deregisters a listener, stopping the poller when none remain.
    pub fn deregister(&self, application_id: &str, listener: &Arc<dyn DiscoveryListener>) {
        let remaining = match self.pollers.get(application_id) {
            Some(poller) => poller.remove_listener(listener),
            None => return,
        };
        if remaining == 0 {
            if let Some((_, poller)) = self.pollers.remove(application_id) {
                poller.stop();
            }
        }
    }

    /// Returns the poller for an application, if registered.
    #[must_use]
    pub fn poller(&self, application_id: &str) -> Option<DiscoveryPoller> {
        self.pollers.get(application_id).map(|p| p.clone())
    }
}

impl std::fmt::Debug for DiscoveryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryRegistry").field("pollers", &self.pollers.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::error::DiscoverySnafu;

    struct ScriptedFetcher {
        results: parking_lot::Mutex<Vec<DiscoveryResult>>,
        fetches: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(results: Vec<DiscoveryResult>) -> Arc<Self> {
            Arc::new(Self { results: parking_lot::Mutex::new(results), fetches: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl DiscoveryFetcher for ScriptedFetcher {
        async fn fetch(&self, _application_id: &str) -> Result<DiscoveryResult> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let mut results = self.results.lock();
            if results.is_empty() {
                return DiscoverySnafu { message: "no scripted result" }.fail();
            }
            // Keep the final result in place so steady-state polls repeat it.
            if results.len() == 1 {
                Ok(results[0].clone())
            } else {
                Ok(results.remove(0))
            }
        }
    }

    struct CountingListener {
        deliveries: AtomicUsize,
        last: RwLock<Option<DiscoveryResult>>,
    }

    impl CountingListener {
        fn new() -> Arc<Self> {
            Arc::new(Self { deliveries: AtomicUsize::new(0), last: RwLock::new(None) })
        }
    }

    #[async_trait]
    impl DiscoveryListener for CountingListener {
        async fn on_discovery_properties_changed(&self, result: DiscoveryResult) -> Result<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            *self.last.write() = Some(result);
            Ok(())
        }
    }

    fn result_with_servers(servers: &str) -> DiscoveryResult {
        DiscoveryResult::builder()
            .field(fields::BOOTSTRAP_SERVERS, servers)
            .values(fields::SCHEMA_REGISTRY_URL, ["http://reg1", "http://reg2"])
            .build()
    }

    fn test_poller(fetcher: Arc<dyn DiscoveryFetcher>) -> DiscoveryPoller {
        DiscoveryPoller::new(
            fetcher,
            "app",
            DiscoveryConfig::disabled(),
            RetryPolicy::builder().max_attempts(1).build(),
        )
    }

    #[test]
    fn test_result_equality_ignores_receipt_time() {
        let a = result_with_servers("a:9092");
        std::thread::sleep(Duration::from_millis(2));
        let b = result_with_servers("a:9092");
        assert_eq!(a, b);
        assert_ne!(a.received_at(), b.received_at());
    }

    #[test]
    fn test_first_registry_url_is_authoritative() {
        let result = result_with_servers("a:9092");
        assert_eq!(result.first_schema_registry_url(), Some("http://reg1"));
    }

    #[test]
    fn test_bootstrap_servers_comma_joined() {
        let result = DiscoveryResult::builder()
            .values(fields::BOOTSTRAP_SERVERS, ["b:9092", "c:9092"])
            .build();
        assert_eq!(result.bootstrap_servers().as_deref(), Some("b:9092,c:9092"));
    }

    #[test]
    fn test_millis_field_defaults_to_zero() {
        let result = DiscoveryResult::builder()
            .field(fields::DISTRIBUTOR_TIMEOUT_MS, "5000")
            .field(fields::DISTRIBUTOR_DISTANCE, "not-a-number")
            .build();
        assert_eq!(result.millis_field(fields::DISTRIBUTOR_TIMEOUT_MS), 5000);
        assert_eq!(result.millis_field(fields::DISTRIBUTOR_DISTANCE), 0);
        assert_eq!(result.millis_field(fields::TTL_MS), 0);
    }

    #[tokio::test]
    async fn test_refresh_dispatches_to_listener() {
        let fetcher = ScriptedFetcher::new(vec![result_with_servers("a:9092")]);
        let poller = test_poller(fetcher);
        let listener = CountingListener::new();
        poller.add_listener(listener.clone());

        poller.refresh_once().await.unwrap();

        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 1);
        let last = listener.last.read().clone().unwrap();
        assert_eq!(last.bootstrap_servers().as_deref(), Some("a:9092"));
    }

    #[tokio::test]
    async fn test_unchanged_result_not_redelivered() {
        let fetcher = ScriptedFetcher::new(vec![result_with_servers("a:9092")]);
        let poller = test_poller(fetcher);
        let listener = CountingListener::new();
        poller.add_listener(listener.clone());

        poller.refresh_once().await.unwrap();
        poller.refresh_once().await.unwrap();
        poller.refresh_once().await.unwrap();

        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_changed_result_redelivered() {
        let fetcher = ScriptedFetcher::new(vec![
            result_with_servers("a:9092"),
            result_with_servers("b:9092"),
        ]);
        let poller = test_poller(fetcher);
        let listener = CountingListener::new();
        poller.add_listener(listener.clone());

        poller.refresh_once().await.unwrap();
        poller.refresh_once().await.unwrap();
        poller.refresh_once().await.unwrap();

        assert_eq!(listener.deliveries.load(Ordering::SeqCst), 2);
        let last = listener.last.read().clone().unwrap();
        assert_eq!(last.bootstrap_servers().as_deref(), Some("b:9092"));
    }

    #[tokio::test]
    async fn test_fetch_failure_propagates() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let poller = test_poller(fetcher);

        let err = poller.refresh_once().await.unwrap_err();
        assert!(matches!(err, crate::ClientError::RetryExhausted { .. } | crate::ClientError::Discovery { .. }));
    }

    #[tokio::test]
    async fn test_registry_dedups_pollers_per_application() {
        let registry = DiscoveryRegistry::new();
        let fetcher = ScriptedFetcher::new(vec![result_with_servers("a:9092")]);
        let l1: Arc<dyn DiscoveryListener> = CountingListener::new();
        let l2: Arc<dyn DiscoveryListener> = CountingListener::new();

        let p1 = registry.register(
            fetcher.clone(),
            "app",
            DiscoveryConfig::disabled(),
            RetryPolicy::default(),
            l1.clone(),
        );
        let p2 = registry.register(
            fetcher,
            "app",
            DiscoveryConfig::disabled(),
            RetryPolicy::default(),
            l2.clone(),
        );

        assert!(Arc::ptr_eq(&p1.inner, &p2.inner));

        registry.deregister("app", &l1);
        assert!(registry.poller("app").is_some());
        registry.deregister("app", &l2);
        assert!(registry.poller("app").is_none());
    }

    #[tokio::test]
    async fn test_listener_failure_does_not_stop_dispatch() {
        struct FailingListener;

        #[async_trait]
        impl DiscoveryListener for FailingListener {
            async fn on_discovery_properties_changed(&self, _: DiscoveryResult) -> Result<()> {
                DiscoverySnafu { message: "listener exploded" }.fail()
            }
        }

        let fetcher = ScriptedFetcher::new(vec![result_with_servers("a:9092")]);
        let poller = test_poller(fetcher);
        let failing: Arc<dyn DiscoveryListener> = Arc::new(FailingListener);
        let counting = CountingListener::new();
        poller.add_listener(failing);
        poller.add_listener(counting.clone());

        poller.refresh_once().await.unwrap();

        assert_eq!(counting.deliveries.load(Ordering::SeqCst), 1);
    }
}
