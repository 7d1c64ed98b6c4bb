//! IPC error types.

use thiserror::Error;

use crate::messages::ErrorInfo;

/// IPC error type.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request timeout")]
    Timeout,

    #[error("Server error: {} ({})", .0.message, .0.reason)]
    ServerError(ErrorInfo),
}

/// Result type for IPC operations.
pub type IpcResult<T> = Result<T, IpcError>;
