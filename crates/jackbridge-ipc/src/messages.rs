//! IPC message types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request envelope sent from client to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Unique request ID for matching responses
    pub id: u64,
    /// The method to invoke
    pub method: Method,
}

/// Response envelope sent from daemon to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this is responding to
    pub id: u64,
    /// Result of the request
    pub result: Result<Value, ErrorInfo>,
}

/// Error information in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// HTTP-style status code (400, 404, 409, 500, 503, 504)
    pub code: i32,
    /// Machine-readable reason, e.g. `concurrent_update_rejected`
    pub reason: String,
    /// Human-readable error message
    pub message: String,
}

impl ErrorInfo {
    /// Create a new error.
    #[must_use]
    pub fn new(code: i32, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, reason: reason.into(), message: message.into() }
    }
}

/// Methods that can be invoked via IPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params")]
pub enum Method {
    // Queries
    /// Live graph plus tracked connections
    GetStatus,
    /// Ports exposed by the router
    ListPorts,
    /// Router reachability, transport method and gate state
    GetHealth,
    /// Configured presets
    ListPresets,

    // Graph mutations
    /// Reconcile toward a named preset
    ApplyPreset { name: String },
    /// Invert the membership of one pair
    Toggle { from: String, to: String },
    /// Connect one pair
    Connect { from: String, to: String },
    /// Disconnect one pair
    Disconnect { from: String, to: String },
    /// Disconnect every live connection
    ClearAll,

    // State
    /// Persist the current status
    SaveState,
    /// Replay the saved tracked connections
    RestoreState,

    // Transport
    /// Forget the cached delivery method
    ResetTransport,
    /// Stop and start the router process
    RestartRouter,

    // Subscriptions
    /// Subscribe to event types (empty: everything)
    Subscribe { events: Vec<String> },
    /// Unsubscribe from event types
    Unsubscribe { events: Vec<String> },

    // System
    /// Request graceful shutdown
    Shutdown,
}

impl Method {
    /// Whether the method mutates the live graph.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::ApplyPreset { .. }
                | Self::Toggle { .. }
                | Self::Connect { .. }
                | Self::Disconnect { .. }
                | Self::ClearAll
                | Self::RestoreState
        )
    }
}
