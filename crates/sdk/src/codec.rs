//! Registry-backed codecs and their configuration slots.
//!
//! A registry-backed codec encodes or decodes payloads against a schema
//! registry endpoint. When a discovery switch moves the platform to a new
//! registry, the codec is *reconfigured in place* — same object, new
//! coordinates — so (de)serialization calls in flight keep working against
//! the codec identity the underlying client holds.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::properties::{ClientProperties, keys};

/// Options handed to a codec on reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Schema registry endpoint.
    pub registry_url: String,
    /// CA certificate path, when the registry requires TLS.
    pub ca_location: Option<String>,
    /// Client certificate path.
    pub certificate_location: Option<String>,
    /// Client private key path.
    pub key_location: Option<String>,
}

impl CodecOptions {
    /// Builds options from a registry URL plus the TLS material already in
    /// the client properties. The TLS paths are taken unchanged — a registry
    /// move never rotates certificates.
    #[must_use]
    pub fn from_properties(registry_url: &str, properties: &ClientProperties) -> Self {
        Self {
            registry_url: registry_url.to_owned(),
            ca_location: properties.get_str(keys::SSL_CA_LOCATION).map(str::to_owned),
            certificate_location: properties
                .get_str(keys::SSL_CERTIFICATE_LOCATION)
                .map(str::to_owned),
            key_location: properties.get_str(keys::SSL_KEY_LOCATION).map(str::to_owned),
        }
    }
}

/// A codec whose registry coordinates can be re-pointed in place.
///
/// Implementations must apply `configure` without replacing internal codec
/// state that in-flight calls depend on; callers rely on object identity
/// being preserved across reconfiguration.
pub trait RegistryCodec: Send + Sync {
    /// Points the codec at new registry coordinates.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are unusable; the switch that
    /// requested the reconfiguration is then aborted.
    fn configure(&self, options: &CodecOptions) -> Result<()>;
}

/// The configuration slot a codec is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecSlot {
    /// Producer key serializer.
    KeySerializer,
    /// Producer value serializer.
    ValueSerializer,
    /// Consumer key deserializer.
    KeyDeserializer,
    /// Consumer value deserializer.
    ValueDeserializer,
}

impl CodecSlot {
    /// The configuration key the slot corresponds to.
    #[must_use]
    pub fn config_key(self) -> &'static str {
        match self {
            CodecSlot::KeySerializer => "key.serializer",
            CodecSlot::ValueSerializer => "value.serializer",
            CodecSlot::KeyDeserializer => "key.deserializer",
            CodecSlot::ValueDeserializer => "value.deserializer",
        }
    }
}

impl fmt::Display for CodecSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

/// Association between a configuration slot and a registry-backed codec.
#[derive(Clone)]
pub struct SerializerBinding {
    slot: CodecSlot,
    codec: Arc<dyn RegistryCodec>,
}

impl SerializerBinding {
    /// Binds a codec to a slot.
    #[must_use]
    pub fn new(slot: CodecSlot, codec: Arc<dyn RegistryCodec>) -> Self {
        Self { slot, codec }
    }

    /// Returns the bound slot.
    #[must_use]
    pub fn slot(&self) -> CodecSlot {
        self.slot
    }

    /// Returns the bound codec.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn RegistryCodec> {
        &self.codec
    }

    /// Reconfigures the bound codec in place.
    ///
    /// # Errors
    ///
    /// Propagates the codec's configuration error.
    pub fn reconfigure(&self, options: &CodecOptions) -> Result<()> {
        self.codec.configure(options)
    }
}

impl fmt::Debug for SerializerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerBinding").field("slot", &self.slot).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::RwLock;

    use super::*;

    #[derive(Default)]
    struct RecordingCodec {
        configured: RwLock<Option<CodecOptions>>,
    }

    impl RegistryCodec for RecordingCodec {
        fn configure(&self, options: &CodecOptions) -> Result<()> {
            *self.configured.write() = Some(options.clone());
            Ok(())
        }
    }

    #[test]
    fn test_options_from_properties_carry_tls_material() {
        let props = ClientProperties::new()
            .with(keys::SSL_CA_LOCATION, "/etc/ca.pem")
            .with(keys::SSL_CERTIFICATE_LOCATION, "/etc/cert.pem")
            .with(keys::SSL_KEY_LOCATION, "/etc/key.pem");

        let options = CodecOptions::from_properties("https://reg.example", &props);

        assert_eq!(options.registry_url, "https://reg.example");
        assert_eq!(options.ca_location.as_deref(), Some("/etc/ca.pem"));
        assert_eq!(options.certificate_location.as_deref(), Some("/etc/cert.pem"));
        assert_eq!(options.key_location.as_deref(), Some("/etc/key.pem"));
    }

    #[test]
    fn test_options_without_tls_material() {
        let options = CodecOptions::from_properties("https://reg.example", &ClientProperties::new());
        assert!(options.ca_location.is_none());
        assert!(options.certificate_location.is_none());
        assert!(options.key_location.is_none());
    }

    #[test]
    fn test_binding_preserves_codec_identity() {
        let codec = Arc::new(RecordingCodec::default());
        let binding = SerializerBinding::new(CodecSlot::ValueDeserializer, codec.clone());

        let options = CodecOptions::from_properties("https://reg.example", &ClientProperties::new());
        binding.reconfigure(&options).unwrap();

        let erased: Arc<dyn RegistryCodec> = codec;
        assert!(Arc::ptr_eq(&erased, binding.codec()));
    }

    #[test]
    fn test_slot_config_keys() {
        assert_eq!(CodecSlot::KeySerializer.config_key(), "key.serializer");
        assert_eq!(CodecSlot::ValueSerializer.config_key(), "value.serializer");
        assert_eq!(CodecSlot::KeyDeserializer.config_key(), "key.deserializer");
        assert_eq!(CodecSlot::ValueDeserializer.config_key(), "value.deserializer");
    }
}
