//! Error types for Streamline value types.

use snafu::Snafu;

/// Result type alias for type-level validation.
pub type Result<T> = std::result::Result<T, TypeError>;

/// Validation errors for Streamline value types.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub))]
pub enum TypeError {
    /// Topic name violates the platform naming rules.
    #[snafu(display("Invalid topic name '{name}': {reason}"))]
    InvalidTopicName {
        /// The offending name.
        name: String,
        /// Which rule was violated.
        reason: String,
    },

    /// Partition index is negative.
    #[snafu(display("Invalid partition index {partition} for topic '{topic}'"))]
    InvalidPartition {
        /// Topic the partition belongs to.
        topic: String,
        /// The offending index.
        partition: i32,
    },
}
