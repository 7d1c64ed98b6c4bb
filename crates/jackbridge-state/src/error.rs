//! State store error types.

use std::path::PathBuf;

use jackbridge_jack::EngineError;
use thiserror::Error;

/// State store error type.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("No saved state at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Saved state at {} is unreadable: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist state to {}: {source}", path.display())]
    PersistenceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Router did not become reachable after {attempts} attempts")]
    RestoreTimeout { attempts: u32 },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StateError {
    /// Machine-readable reason string.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoDataDir | Self::PersistenceFailed { .. } => "state_persistence_failed",
            Self::NotFound(_) => "not_found",
            Self::Read { .. } | Self::Corrupt { .. } => "state_unreadable",
            Self::RestoreTimeout { .. } => "restore_timeout",
            Self::Engine(e) => e.reason(),
        }
    }
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
