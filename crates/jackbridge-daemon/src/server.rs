//! Request handling for the IPC server.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use jackbridge_core::{Error as CoreError, RouterState};
use jackbridge_ipc::messages::{ErrorInfo, Method};
use jackbridge_ipc::{
    ConnectionsChangedData, ErrorData, Event, EventType, PresetAppliedData, RouterStatusData,
    StateRestoredData,
};
use jackbridge_jack::{
    EngineError, HostRunner, ProcessError, ProcessMonitor, ReconciliationEngine, Transport,
    TransportError,
};
use jackbridge_state::{RestoreOutcome, RestorePolicy, StateError, StateResult, StateStore};

/// Everything a request can touch.
pub struct Daemon {
    engine: ReconciliationEngine<Transport>,
    store: StateStore,
    process: ProcessMonitor<HostRunner>,
    restore_policy: RestorePolicy,
    auto_save: bool,
    events: broadcast::Sender<Event>,
    router_state: Mutex<RouterState>,
}

impl Daemon {
    pub fn new(
        engine: ReconciliationEngine<Transport>,
        store: StateStore,
        process: ProcessMonitor<HostRunner>,
        restore_policy: RestorePolicy,
        auto_save: bool,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            engine,
            store,
            process,
            restore_policy,
            auto_save,
            events,
            router_state: Mutex::new(RouterState::Unknown),
        }
    }

    /// Handle an IPC request and return a response value.
    pub async fn handle(&self, method: &Method) -> Result<Value, ErrorInfo> {
        let result = self.dispatch(method).await;
        if let Err(info) = &result {
            debug!(?method, code = info.code, reason = %info.reason, "Request failed");
            if method.is_mutation() {
                self.emit(
                    EventType::Error,
                    ErrorData { code: info.code, message: info.message.clone(), source: info.reason.clone() },
                );
            }
        }
        result
    }

    async fn dispatch(&self, method: &Method) -> Result<Value, ErrorInfo> {
        match method {
            Method::GetStatus => to_json(self.engine.status().await.map_err(|e| engine_error(&e))?),

            Method::ListPorts => to_json(self.engine.list_ports().await.map_err(|e| engine_error(&e))?),

            Method::GetHealth => {
                let router = self.check_health().await;
                Ok(json!({
                    "router": router,
                    "method": self.engine.router().current_method().map(|m| m.to_string()),
                    "updating": self.engine.is_updating(),
                    "process_running": self.process.is_running().await,
                    "tracked": self.engine.tracked().len(),
                }))
            }

            Method::ListPresets => to_json(self.engine.list_presets()),

            Method::ApplyPreset { name } => {
                let batch = self.engine.apply_preset(name).await.map_err(|e| engine_error(&e))?;
                self.emit(
                    EventType::PresetApplied,
                    PresetAppliedData { name: name.clone(), succeeded: batch.succeeded, failed: batch.failed },
                );
                self.after_mutation(batch.succeeded).await;
                to_json(batch)
            }

            Method::Toggle { from, to } => {
                let outcome = self.engine.toggle(from, to).await.map_err(|e| engine_error(&e))?;
                self.connections_changed("toggle", outcome.result.success).await;
                to_json(outcome)
            }

            Method::Connect { from, to } => {
                let result = self.engine.connect(from, to).await.map_err(|e| engine_error(&e))?;
                self.connections_changed("connect", result.success).await;
                to_json(result)
            }

            Method::Disconnect { from, to } => {
                let result = self.engine.disconnect(from, to).await.map_err(|e| engine_error(&e))?;
                self.connections_changed("disconnect", result.success).await;
                to_json(result)
            }

            Method::ClearAll => {
                let outcome = self.engine.clear_all().await.map_err(|e| engine_error(&e))?;
                self.emit(
                    EventType::ConnectionsChanged,
                    ConnectionsChangedData {
                        cause: "clear_all".to_string(),
                        succeeded: outcome.batch.succeeded,
                        failed: outcome.batch.failed,
                    },
                );
                self.after_mutation(outcome.cleared).await;
                to_json(outcome)
            }

            Method::SaveState => {
                let snapshot = self.store.save(&self.engine).await.map_err(|e| state_error(&e))?;
                Ok(json!({
                    "path": self.store.path(),
                    "connections": snapshot.connections.len(),
                    "tracked": snapshot.tracked.len(),
                    "timestamp": snapshot.timestamp,
                }))
            }

            Method::RestoreState => to_json(self.restore().await.map_err(|e| state_error(&e))?),

            Method::ResetTransport => {
                self.engine.router().reset();
                Ok(json!({"success": true}))
            }

            Method::RestartRouter => {
                self.process.restart().await.map_err(|e| process_error(&e))?;
                self.engine.router().reset();
                self.check_health().await;
                Ok(json!({"success": true}))
            }

            // Answered by the IPC server and the main loop respectively.
            Method::Subscribe { .. } | Method::Unsubscribe { .. } | Method::Shutdown => {
                Ok(json!({"success": true}))
            }
        }
    }

    /// Probe the router and broadcast a status event on transitions.
    pub async fn check_health(&self) -> RouterState {
        let state = if self.engine.is_router_alive().await {
            RouterState::Reachable
        } else {
            RouterState::Unreachable
        };

        let previous = std::mem::replace(&mut *self.router_state.lock(), state);
        if previous != state {
            let method = self.engine.router().current_method().map(|m| m.to_string());
            info!(?previous, ?state, ?method, "Router status changed");
            self.emit(EventType::RouterStatusChanged, RouterStatusData { state, method });
        }
        state
    }

    /// Replay the saved tracked connections.
    ///
    /// The snapshot is not rewritten afterwards, so entries that failed to
    /// reconnect stay on disk for the next attempt.
    ///
    /// # Errors
    /// Any [`StateError`] from the store.
    pub async fn restore(&self) -> StateResult<RestoreOutcome> {
        let outcome = self.store.restore(&self.engine, self.restore_policy).await?;
        self.emit(
            EventType::StateRestored,
            StateRestoredData {
                entries: outcome.entries,
                reconnected: outcome.batch.succeeded,
                failed: outcome.batch.failed,
            },
        );
        Ok(outcome)
    }

    async fn connections_changed(&self, cause: &str, success: bool) {
        self.emit(
            EventType::ConnectionsChanged,
            ConnectionsChangedData {
                cause: cause.to_string(),
                succeeded: usize::from(success),
                failed: usize::from(!success),
            },
        );
        self.after_mutation(usize::from(success)).await;
    }

    async fn after_mutation(&self, succeeded: usize) {
        if !self.auto_save || succeeded == 0 {
            return;
        }
        if let Err(e) = self.store.save(&self.engine).await {
            warn!(error = %e, "Auto-save failed");
        }
    }

    fn emit(&self, event: EventType, data: impl Serialize) {
        // No receivers just means no client is connected.
        let _ = self.events.send(Event::new(event, data));
    }
}

fn to_json(value: impl Serialize) -> Result<Value, ErrorInfo> {
    serde_json::to_value(value)
        .map_err(|e| ErrorInfo::new(500, "serialization_failed", e.to_string()))
}

/// Map an engine error to its wire form.
pub fn engine_error(error: &EngineError) -> ErrorInfo {
    let code = match error {
        EngineError::Transport(TransportError::Unavailable) => 503,
        EngineError::Transport(TransportError::InvalidArgument(_))
        | EngineError::Core(CoreError::AliasResolutionFailed { .. } | CoreError::InvalidPortName(_)) => 400,
        EngineError::Core(CoreError::PresetNotFound(_)) => 404,
        EngineError::ConcurrentUpdateRejected => 409,
        EngineError::Core(CoreError::SerializationError(_)) | EngineError::QueryFailed(_) => 500,
    };
    ErrorInfo::new(code, error.reason(), error.to_string())
}

/// Map a state store error to its wire form.
pub fn state_error(error: &StateError) -> ErrorInfo {
    let code = match error {
        StateError::Engine(e) => return engine_error(e),
        StateError::NotFound(_) => 404,
        StateError::RestoreTimeout { .. } => 504,
        StateError::NoDataDir
        | StateError::Read { .. }
        | StateError::Corrupt { .. }
        | StateError::PersistenceFailed { .. } => 500,
    };
    ErrorInfo::new(code, error.reason(), error.to_string())
}

fn process_error(error: &ProcessError) -> ErrorInfo {
    let code = match error {
        ProcessError::NotConfigured => 400,
        ProcessError::RestartTimeout { .. } => 504,
        ProcessError::Spawn { .. } | ProcessError::CommandFailed(_) => 500,
    };
    ErrorInfo::new(code, error.reason(), error.to_string())
}
