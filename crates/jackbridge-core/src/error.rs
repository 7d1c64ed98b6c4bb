//! Error types for JackBridge core.

use thiserror::Error;

/// Core error type for JackBridge operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unresolved endpoint alias(es): {}", unresolved.join(", "))]
    AliasResolutionFailed { unresolved: Vec<String> },

    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("Invalid port name: {0:?}")]
    InvalidPortName(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable reason string for API responses.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::AliasResolutionFailed { .. } => "alias_resolution_failed",
            Self::PresetNotFound(_) => "preset_not_found",
            Self::InvalidPortName(_) => "invalid_argument",
            Self::SerializationError(_) => "serialization_failed",
        }
    }
}

/// Result type alias for JackBridge core operations.
pub type Result<T> = std::result::Result<T, Error>;
