//! JACK control error types.

use thiserror::Error;

/// Errors raised before or instead of dispatching a router command.
///
/// Expected command failures (non-zero exit, timeouts, unreachable host)
/// are not errors: they are carried by [`crate::ExecutionResult`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No delivery method reached the JACK router")]
    Unavailable,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl TransportError {
    /// Machine-readable reason string.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Unavailable => "transport_unavailable",
            Self::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Request-level errors from the reconciliation engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Core(#[from] jackbridge_core::Error),

    #[error("Another update is in progress")]
    ConcurrentUpdateRejected,

    #[error("Router query failed: {0}")]
    QueryFailed(String),
}

impl EngineError {
    /// Machine-readable reason string.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Transport(e) => e.reason(),
            Self::Core(e) => e.reason(),
            Self::ConcurrentUpdateRejected => "concurrent_update_rejected",
            Self::QueryFailed(_) => "command_failed",
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from host-level process control.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("No start program configured")]
    NotConfigured,

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Process control command failed: {0}")]
    CommandFailed(String),

    #[error("Router not running {window_ms} ms after restart")]
    RestartTimeout { window_ms: u64 },
}

impl ProcessError {
    /// Machine-readable reason string.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Spawn { .. } => "spawn_failed",
            Self::CommandFailed(_) => "command_failed",
            Self::RestartTimeout { .. } => "restart_timeout",
        }
    }
}

/// Result type for process control.
pub type ProcessResult<T> = Result<T, ProcessError>;
