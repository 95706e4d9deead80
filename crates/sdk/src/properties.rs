//! Client configuration properties and the transport allow-list filter.
//!
//! [`ClientProperties`] is the long-lived key/value configuration handed to
//! the underlying client library. It holds at most one definition per key
//! (last write wins) and is mutated only inside the switch lock's critical
//! section, by merging values derived from the latest discovery result.
//!
//! The filter functions narrow a property map down to the static allow-list
//! of keys the transport recognizes, so discovery-internal keys (patterns,
//! distribution hints, registry URLs) never cross the boundary. Filtering is
//! pure, deterministic, and idempotent.

use std::collections::BTreeMap;
use std::fmt;

/// Well-known property keys.
pub mod keys {
    /// Comma-separated broker endpoints.
    pub const BOOTSTRAP_SERVERS: &str = "bootstrap.servers";
    /// Resolved consumer group identifier.
    pub const GROUP_ID: &str = "group.id";
    /// Logical application identifier; input to group-id resolution.
    pub const APPLICATION_ID: &str = "application.id";
    /// Transport security protocol.
    pub const SECURITY_PROTOCOL: &str = "security.protocol";
    /// CA certificate path.
    pub const SSL_CA_LOCATION: &str = "ssl.ca.location";
    /// Client certificate path.
    pub const SSL_CERTIFICATE_LOCATION: &str = "ssl.certificate.location";
    /// Client private key path.
    pub const SSL_KEY_LOCATION: &str = "ssl.key.location";
    /// Consumer start position when no committed offset exists.
    pub const AUTO_OFFSET_RESET: &str = "auto.offset.reset";
}

/// A single configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    /// String value.
    Str(String),
    /// Integer value.
    Int(i64),
    /// Boolean value.
    Bool(bool),
}

impl PropertyValue {
    /// Returns the string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(s) => write!(f, "{s}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Ordered client configuration mapping.
///
/// Keys are unique; setting an existing key overwrites its value. Iteration
/// order is the lexicographic key order, which keeps derived configuration
/// deterministic across switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientProperties {
    entries: BTreeMap<String, PropertyValue>,
}

impl ClientProperties {
    /// Creates an empty property map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a property, overwriting any previous value for the key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Chained variant of [`set`](Self::set) for building literals.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.entries.get(key)
    }

    /// Returns the string value for a key, if present and a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(PropertyValue::as_str)
    }

    /// Removes a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.entries.remove(key)
    }

    /// Returns whether the key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Merges `other` into `self`; `other`'s values win on conflicts.
    pub fn merge(&mut self, other: &ClientProperties) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns a copy restricted to the given allow-list.
    #[must_use]
    pub fn restricted_to(&self, allowed: &[&str]) -> ClientProperties {
        let entries = self
            .entries
            .iter()
            .filter(|(key, _)| allowed.contains(&key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        ClientProperties { entries }
    }
}

impl FromIterator<(String, PropertyValue)> for ClientProperties {
    fn from_iter<T: IntoIterator<Item = (String, PropertyValue)>>(iter: T) -> Self {
        ClientProperties { entries: iter.into_iter().collect() }
    }
}

/// Consumer configuration keys recognized by the underlying client library.
pub const CONSUMER_ALLOWED_KEYS: &[&str] = &[
    keys::BOOTSTRAP_SERVERS,
    keys::GROUP_ID,
    "client.id",
    keys::SECURITY_PROTOCOL,
    keys::SSL_CA_LOCATION,
    keys::SSL_CERTIFICATE_LOCATION,
    keys::SSL_KEY_LOCATION,
    keys::AUTO_OFFSET_RESET,
    "enable.auto.commit",
    "auto.commit.interval.ms",
    "session.timeout.ms",
    "heartbeat.interval.ms",
    "max.poll.interval.ms",
    "fetch.min.bytes",
    "fetch.max.bytes",
    "isolation.level",
];

/// Producer configuration keys recognized by the underlying client library.
pub const PRODUCER_ALLOWED_KEYS: &[&str] = &[
    keys::BOOTSTRAP_SERVERS,
    "client.id",
    keys::SECURITY_PROTOCOL,
    keys::SSL_CA_LOCATION,
    keys::SSL_CERTIFICATE_LOCATION,
    keys::SSL_KEY_LOCATION,
    "acks",
    "linger.ms",
    "batch.size",
    "compression.type",
    "enable.idempotence",
    "delivery.timeout.ms",
    "message.timeout.ms",
];

/// Narrows consumer properties to the transport allow-list.
#[must_use]
pub fn filter_consumer_properties(properties: &ClientProperties) -> ClientProperties {
    properties.restricted_to(CONSUMER_ALLOWED_KEYS)
}

/// Narrows producer properties to the transport allow-list.
#[must_use]
pub fn filter_producer_properties(properties: &ClientProperties) -> ClientProperties {
    properties.restricted_to(PRODUCER_ALLOWED_KEYS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClientProperties {
        ClientProperties::new()
            .with(keys::BOOTSTRAP_SERVERS, "a:9092")
            .with(keys::GROUP_ID, "acme-prod-app")
            .with(keys::APPLICATION_ID, "app")
            .with("topic.pattern", "{tenant}-{topic}")
            .with("schema.registry.url", "https://reg.example")
            .with("distributor.timeout.ms", 5000_i64)
            .with("enable.auto.commit", false)
    }

    #[test]
    fn test_last_write_wins() {
        let mut props = ClientProperties::new();
        props.set(keys::BOOTSTRAP_SERVERS, "a:9092");
        props.set(keys::BOOTSTRAP_SERVERS, "b:9092,c:9092");
        assert_eq!(props.get_str(keys::BOOTSTRAP_SERVERS), Some("b:9092,c:9092"));
        assert_eq!(props.len(), 1);
    }

    #[test]
    fn test_merge_overwrites_and_adds() {
        let mut base = ClientProperties::new()
            .with(keys::BOOTSTRAP_SERVERS, "a:9092")
            .with("acks", "all");
        let update = ClientProperties::new()
            .with(keys::BOOTSTRAP_SERVERS, "b:9092")
            .with("linger.ms", 5_i64);

        base.merge(&update);

        assert_eq!(base.get_str(keys::BOOTSTRAP_SERVERS), Some("b:9092"));
        assert_eq!(base.get_str("acks"), Some("all"));
        assert_eq!(base.get("linger.ms").and_then(PropertyValue::as_int), Some(5));
    }

    #[test]
    fn test_filter_drops_internal_keys() {
        let filtered = filter_consumer_properties(&sample());

        assert!(filtered.contains_key(keys::BOOTSTRAP_SERVERS));
        assert!(filtered.contains_key(keys::GROUP_ID));
        assert!(filtered.contains_key("enable.auto.commit"));
        assert!(!filtered.contains_key(keys::APPLICATION_ID));
        assert!(!filtered.contains_key("topic.pattern"));
        assert!(!filtered.contains_key("schema.registry.url"));
        assert!(!filtered.contains_key("distributor.timeout.ms"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        let once = filter_consumer_properties(&sample());
        let twice = filter_consumer_properties(&once);
        assert_eq!(once, twice);

        let once = filter_producer_properties(&sample());
        let twice = filter_producer_properties(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_filter_is_pure() {
        let props = sample();
        let before = props.clone();
        let _ = filter_consumer_properties(&props);
        assert_eq!(props, before);
    }

    #[test]
    fn test_producer_filter_excludes_group_id() {
        let filtered = filter_producer_properties(&sample());
        assert!(!filtered.contains_key(keys::GROUP_ID));
        assert!(!filtered.contains_key(keys::AUTO_OFFSET_RESET));
    }

    #[test]
    fn test_value_accessors() {
        let value = PropertyValue::from("x");
        assert_eq!(value.as_str(), Some("x"));
        assert_eq!(value.as_int(), None);

        let value = PropertyValue::from(7_i64);
        assert_eq!(value.as_int(), Some(7));
        assert_eq!(value.as_bool(), None);

        let value = PropertyValue::from(true);
        assert_eq!(value.as_bool(), Some(true));
        assert_eq!(value.to_string(), "true");
    }

    #[test]
    fn test_deterministic_iteration_order() {
        let props = sample();
        let keys: Vec<&str> = props.iter().map(|(k, _)| k).collect();
        let mut sorted = keys.clone();
        sorted.sort_unstable();
        assert_eq!(keys, sorted);
    }
}
