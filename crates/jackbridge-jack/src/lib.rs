//! JackBridge JACK - Router control and reconciliation.
//!
//! This crate handles all interactions with the JACK router:
//! - Building and escaping `jack_*` tool commands
//! - Delivering them through one of several transports
//! - Parsing `jack_lsp` listings into the live graph
//! - Reconciling the live graph toward presets and tracked connections
//! - Detecting and controlling the router process

pub mod command;
pub mod error;
pub mod gate;
pub mod graph;
pub mod lsp;
pub mod method;
pub mod process;
pub mod reconcile;
pub mod result;
pub mod transport;

pub use command::{CommandBuilder, RouterCommand, TargetOs};
pub use error::{EngineError, EngineResult, ProcessError, ProcessResult, TransportError, TransportResult};
pub use gate::{UpdateGate, UpdateGuard};
pub use graph::{LiveGraph, TrackedSet};
pub use method::MethodKind;
pub use process::{HostRunner, ProcessConfig, ProcessMonitor, ProcessRunner};
pub use reconcile::{ClearOutcome, ReconciliationEngine, ToggleAction, ToggleOutcome};
pub use result::{BatchError, BatchOperation, BatchResult, ExecutionResult, FailureKind};
pub use transport::{BridgeShell, RouterControl, Transport, TransportConfig};
