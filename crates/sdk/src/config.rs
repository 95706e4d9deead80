//! Client configuration with builder pattern.
//!
//! Provides type-safe configuration for SDK clients including:
//! - Application identity and base properties
//! - Discovery polling settings
//! - Retry policies for the discovery fetch path
//! - Transport security material

use std::time::Duration;

use snafu::ensure;

use crate::error::{ConfigSnafu, Result};
use crate::properties::{ClientProperties, PropertyValue, keys};

/// Default timeout waiting for the first discovery result to install a client.
const DEFAULT_INITIALIZATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for Streamline SDK clients.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Logical application identifier; input to group-id resolution.
    pub(crate) application_id: String,

    /// Optional transport-visible client identifier.
    pub(crate) client_id: Option<String>,

    /// Timeout for the first client installation after connect.
    pub(crate) initialization_timeout: Duration,

    /// Discovery polling settings.
    pub(crate) discovery: DiscoveryConfig,

    /// Retry policy for discovery fetches.
    pub(crate) retry_policy: RetryPolicy,

    /// Transport security material.
    pub(crate) tls: Option<TlsConfig>,

    /// Base properties merged beneath discovery-derived values.
    pub(crate) properties: ClientProperties,
}

impl ClientConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Returns the application identifier.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Returns the initialization timeout.
    #[must_use]
    pub fn initialization_timeout(&self) -> Duration {
        self.initialization_timeout
    }

    /// Returns the discovery settings.
    #[must_use]
    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the TLS configuration if set.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Builds the initial property map a coordinator starts from.
    ///
    /// Layering, lowest to highest precedence: identity keys, TLS material,
    /// then user-supplied base properties. Discovery-derived values are merged
    /// on top of this map at every switch.
    #[must_use]
    pub fn initial_properties(&self) -> ClientProperties {
        let mut props = ClientProperties::new();
        props.set(keys::APPLICATION_ID, self.application_id.as_str());
        if let Some(client_id) = &self.client_id {
            props.set("client.id", client_id.as_str());
        }
        if let Some(tls) = &self.tls {
            props.set(keys::SECURITY_PROTOCOL, "SSL");
            props.set(keys::SSL_CA_LOCATION, tls.ca_location.as_str());
            props.set(keys::SSL_CERTIFICATE_LOCATION, tls.certificate_location.as_str());
            props.set(keys::SSL_KEY_LOCATION, tls.key_location.as_str());
        }
        props.merge(&self.properties);
        props
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default)]
pub struct ClientConfigBuilder {
    application_id: Option<String>,
    client_id: Option<String>,
    initialization_timeout: Option<Duration>,
    discovery: Option<DiscoveryConfig>,
    retry_policy: Option<RetryPolicy>,
    tls: Option<TlsConfig>,
    properties: ClientProperties,
}

impl ClientConfigBuilder {
    /// Sets the application identifier (required).
    ///
    /// This is the logical name the platform knows the application by; the
    /// resolved consumer group id is derived from it on every switch.
    #[must_use]
    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Sets the transport-visible client identifier.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Sets the timeout for the first client installation.
    ///
    /// Default: 30 seconds.
    #[must_use]
    pub fn initialization_timeout(mut self, timeout: Duration) -> Self {
        self.initialization_timeout = Some(timeout);
        self
    }

    /// Sets the discovery polling settings.
    #[must_use]
    pub fn discovery(mut self, discovery: DiscoveryConfig) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Sets the retry policy for discovery fetches.
    #[must_use]
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Sets the transport security material.
    #[must_use]
    pub fn tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Sets a base property merged beneath discovery-derived values.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.set(key, value);
        self
    }

    /// Builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`](crate::ClientError::Config) if the
    /// application id is missing or empty, or if a reserved discovery-derived
    /// key was supplied as a base property.
    pub fn build(self) -> Result<ClientConfig> {
        let application_id = self.application_id.unwrap_or_default();
        ensure!(!application_id.is_empty(), ConfigSnafu { message: "application_id is required" });

        for reserved in [keys::BOOTSTRAP_SERVERS, keys::GROUP_ID] {
            ensure!(
                !self.properties.contains_key(reserved),
                ConfigSnafu {
                    message: format!("property '{reserved}' is derived from discovery results"),
                }
            );
        }

        Ok(ClientConfig {
            application_id,
            client_id: self.client_id,
            initialization_timeout: self
                .initialization_timeout
                .unwrap_or(DEFAULT_INITIALIZATION_TIMEOUT),
            discovery: self.discovery.unwrap_or_default(),
            retry_policy: self.retry_policy.unwrap_or_default(),
            tls: self.tls,
            properties: self.properties,
        })
    }
}

/// Transport security material, as filesystem paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// CA certificate path.
    pub ca_location: String,
    /// Client certificate path.
    pub certificate_location: String,
    /// Client private key path.
    pub key_location: String,
}

impl TlsConfig {
    /// Creates a TLS configuration from certificate paths.
    pub fn new(
        ca_location: impl Into<String>,
        certificate_location: impl Into<String>,
        key_location: impl Into<String>,
    ) -> Self {
        Self {
            ca_location: ca_location.into(),
            certificate_location: certificate_location.into(),
            key_location: key_location.into(),
        }
    }
}

/// Default interval between discovery polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Discovery polling settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryConfig {
    enabled: bool,
    poll_interval: Duration,
}

impl DiscoveryConfig {
    /// Discovery polling on, at the default interval.
    #[must_use]
    pub fn enabled() -> Self {
        Self { enabled: true, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    /// Discovery polling off; results must be delivered by hand.
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, poll_interval: DEFAULT_POLL_INTERVAL }
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Returns whether background polling is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self::enabled()
    }
}

/// Retry policy for the discovery fetch path.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum total attempts (initial call included).
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub initial_backoff: Duration,
    /// Backoff cap.
    pub max_backoff: Duration,
    /// Backoff growth factor per attempt.
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Creates a new retry policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Sets the maximum total attempts (minimum 1).
    #[must_use]
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
        self
    }

    /// Sets the backoff before the first retry.
    #[must_use]
    pub fn initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = Some(initial_backoff);
        self
    }

    /// Sets the backoff cap.
    #[must_use]
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = Some(max_backoff);
        self
    }

    /// Sets the backoff growth factor.
    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Builds the policy, falling back to defaults for unset fields.
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(defaults.max_attempts),
            initial_backoff: self.initial_backoff.unwrap_or(defaults.initial_backoff),
            max_backoff: self.max_backoff.unwrap_or(defaults.max_backoff),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_application_id_required() {
        let err = ClientConfig::builder().build().unwrap_err();
        assert!(err.to_string().contains("application_id"));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = ClientConfig::builder().application_id("app").build().unwrap();
        assert_eq!(config.application_id(), "app");
        assert_eq!(config.initialization_timeout(), DEFAULT_INITIALIZATION_TIMEOUT);
        assert!(config.discovery().is_enabled());
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert!(config.tls().is_none());
    }

    #[test]
    fn test_reserved_properties_rejected() {
        let err = ClientConfig::builder()
            .application_id("app")
            .property(keys::BOOTSTRAP_SERVERS, "a:9092")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains(keys::BOOTSTRAP_SERVERS));

        let err = ClientConfig::builder()
            .application_id("app")
            .property(keys::GROUP_ID, "g")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains(keys::GROUP_ID));
    }

    #[test]
    fn test_initial_properties_layering() {
        let config = ClientConfig::builder()
            .application_id("app")
            .client_id("node-7")
            .tls(TlsConfig::new("/etc/ca.pem", "/etc/cert.pem", "/etc/key.pem"))
            .property("auto.offset.reset", "earliest")
            .build()
            .unwrap();

        let props = config.initial_properties();
        assert_eq!(props.get_str(keys::APPLICATION_ID), Some("app"));
        assert_eq!(props.get_str("client.id"), Some("node-7"));
        assert_eq!(props.get_str(keys::SECURITY_PROTOCOL), Some("SSL"));
        assert_eq!(props.get_str(keys::SSL_CA_LOCATION), Some("/etc/ca.pem"));
        assert_eq!(props.get_str("auto.offset.reset"), Some("earliest"));
    }

    #[test]
    fn test_base_properties_override_identity_keys() {
        let config = ClientConfig::builder()
            .application_id("app")
            .tls(TlsConfig::new("/ca", "/cert", "/key"))
            .property(keys::SECURITY_PROTOCOL, "PLAINTEXT")
            .build()
            .unwrap();

        let props = config.initial_properties();
        assert_eq!(props.get_str(keys::SECURITY_PROTOCOL), Some("PLAINTEXT"));
    }

    #[test]
    fn test_discovery_config_interval_override() {
        let discovery = DiscoveryConfig::enabled().with_poll_interval(Duration::from_secs(5));
        assert!(discovery.is_enabled());
        assert_eq!(discovery.poll_interval(), Duration::from_secs(5));

        assert!(!DiscoveryConfig::disabled().is_enabled());
    }

    #[test]
    fn test_retry_policy_builder_minimum_attempts() {
        let policy = RetryPolicy::builder().max_attempts(0).build();
        assert_eq!(policy.max_attempts, 1);
    }
}
