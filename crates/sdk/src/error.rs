//! SDK-specific error types with switch-abort semantics.
//!
//! Provides a two-tier error model:
//! - **Switch errors**: Resolution and construction failures that abort a
//!   discovery-driven client switch while the previous client keeps serving
//! - **Call errors**: Failures raised by the underlying client during a
//!   forwarded call, passed through to the caller unchanged
//!
//! Errors include retryability classification for the discovery fetch path.

use snafu::{Location, Snafu};

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// SDK error types with context-rich error messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    /// A pattern references a field absent from the discovery result.
    #[snafu(display("Resolution error: pattern '{pattern}' references missing field '{missing}'"))]
    Resolution {
        /// The pattern being resolved.
        pattern: String,
        /// The placeholder or field that could not be satisfied.
        missing: String,
    },

    /// Building the new underlying client failed.
    #[snafu(display("Construction error at {location}: {message}"))]
    Construction {
        /// Error description from the transport factory.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Failure raised by the underlying client during a forwarded call.
    #[snafu(display("Call error: {message}"))]
    Call {
        /// Error description from the underlying client.
        message: String,
    },

    /// Fetching a discovery result failed.
    #[snafu(display("Discovery error at {location}: {message}"))]
    Discovery {
        /// Error description from the discovery fetcher.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Configuration validation error.
    #[snafu(display("Configuration error: {message}"))]
    Config {
        /// Error description.
        message: String,
    },

    /// Retry attempts exhausted.
    #[snafu(display("Retry exhausted after {attempts} attempts: {last_error}"))]
    RetryExhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Last error message before giving up.
        last_error: String,
    },

    /// Operation timed out.
    #[snafu(display("Operation timed out after {duration_ms}ms"))]
    Timeout {
        /// Timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Client is shutting down.
    #[snafu(display("Client shutting down"))]
    Shutdown,

    /// No underlying client has been installed yet.
    #[snafu(display("Client not ready: waiting for the first discovery result"))]
    NotReady,
}

impl ClientError {
    /// Returns true if the error is transient and the operation should be retried.
    ///
    /// Only the discovery fetch path retries; switch attempts are never
    /// retried by the SDK — the next discovery result is the retry.
    ///
    /// Retryable errors:
    /// - `Discovery`: the fetch transport failed, likely transiently
    /// - `Timeout`: the operation ran out of time
    ///
    /// Non-retryable errors:
    /// - `Resolution` / `Construction`: the switch attempt is aborted
    /// - `Call`: call-level policy belongs to the host application
    /// - `Config`: the input is malformed
    /// - `Shutdown` / `NotReady`: state, not failure
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Discovery { .. } => true,
            Self::Timeout { .. } => true,
            Self::Resolution { .. }
            | Self::Construction { .. }
            | Self::Call { .. }
            | Self::Config { .. }
            | Self::RetryExhausted { .. }
            | Self::Shutdown
            | Self::NotReady => false,
        }
    }

    /// Returns true if the error aborts a switch attempt while leaving the
    /// previously current client authoritative.
    #[must_use]
    pub fn aborts_switch(&self) -> bool {
        matches!(
            self,
            Self::Resolution { .. } | Self::Construction { .. } | Self::Discovery { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_is_retryable() {
        let err = DiscoverySnafu { message: "endpoint unreachable" }.build();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = ClientError::Timeout { duration_ms: 1000 };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_construction_not_retryable() {
        let err = ConstructionSnafu { message: "broker unreachable" }.build();
        assert!(!err.is_retryable());
        assert!(err.aborts_switch());
    }

    #[test]
    fn test_resolution_not_retryable() {
        let err = ClientError::Resolution {
            pattern: "{tenant}-{group}".to_owned(),
            missing: "tenant".to_owned(),
        };
        assert!(!err.is_retryable());
        assert!(err.aborts_switch());
    }

    #[test]
    fn test_call_error_passes_classification() {
        let err = ClientError::Call { message: "offset out of range".to_owned() };
        assert!(!err.is_retryable());
        assert!(!err.aborts_switch());
    }

    #[test]
    fn test_shutdown_not_retryable() {
        assert!(!ClientError::Shutdown.is_retryable());
        assert!(!ClientError::NotReady.is_retryable());
    }

    #[test]
    fn test_display_includes_pattern_and_field() {
        let err = ClientError::Resolution {
            pattern: "{tenant}-{group}".to_owned(),
            missing: "tenant".to_owned(),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("{tenant}-{group}"));
        assert!(rendered.contains("tenant"));
    }
}
