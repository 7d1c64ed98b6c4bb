//! Command delivery to the JACK router.
//!
//! A [`Transport`] owns one configuration and a cached delivery method.
//! The method is detected lazily on first use by probing each candidate
//! with `jack_wait -c`, and re-detected after an explicit [`Transport::reset`]
//! or three consecutive delivery failures.
//!
//! Cancellation is best-effort: dropping a pending call or an
//! [`Transport::execute_async`] handle does not guarantee that a command
//! already handed to the router is interrupted.

mod bridge;
mod direct;
mod pipe;
mod socket;
pub mod wire;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use bridge::{BridgeShell, bridge_invocation};
pub(crate) use direct::run_program;

use crate::command::{CommandBuilder, RouterCommand};
use crate::error::{TransportError, TransportResult};
use crate::method::{MethodKind, probe_order, select_method};
use crate::result::{BatchOpKind, BatchOperation, BatchResult, ExecutionResult};

/// Consecutive delivery failures that trigger re-detection.
pub const REDETECT_AFTER_FAILURES: u32 = 3;

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default TCP port of the colocated listener.
pub const DEFAULT_SOCKET_PORT: u16 = 6666;

/// Default local pipe path.
#[must_use]
pub fn default_pipe_path() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from(r"\\.\pipe\jack-bridge")
    } else {
        std::env::temp_dir().join("jack-bridge.sock")
    }
}

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Host running the socket listener
    pub host: String,
    /// Directory holding the JACK tools (empty: use `PATH`)
    pub tools_path: String,
    /// Method to probe first (`None`: fixed preference order)
    pub preferred: Option<MethodKind>,
    /// Upper bound for every call
    pub timeout: Duration,
    /// Listener TCP port
    pub socket_port: u16,
    /// Unix socket / named pipe path
    pub pipe_path: PathBuf,
    /// Shell used by the bridge method
    pub bridge_shell: BridgeShell,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            tools_path: String::new(),
            preferred: None,
            timeout: DEFAULT_TIMEOUT,
            socket_port: DEFAULT_SOCKET_PORT,
            pipe_path: default_pipe_path(),
            bridge_shell: BridgeShell::default(),
        }
    }
}

/// Anything that can execute router commands.
///
/// Implemented by [`Transport`]; the reconciliation engine is generic over
/// this trait so it can run against an in-memory router in tests.
pub trait RouterControl: Send + Sync {
    /// Execute one command, waiting for completion or timeout.
    ///
    /// Only unsafe input and an unreachable router are errors; everything
    /// else is encoded in the [`ExecutionResult`].
    fn execute(
        &self,
        command: &RouterCommand,
    ) -> impl Future<Output = TransportResult<ExecutionResult>> + Send;

    /// Execute operations sequentially in submission order, continuing past
    /// failures.
    fn execute_batch(
        &self,
        operations: &[BatchOperation],
    ) -> impl Future<Output = BatchResult> + Send {
        async move {
            let mut batch = BatchResult::default();
            for (index, op) in operations.iter().enumerate() {
                let command = op.command();
                match self.execute(&command).await {
                    Ok(result) => {
                        let result = match op.kind {
                            BatchOpKind::Connect => result.accept_already_connected(),
                            BatchOpKind::Disconnect => result,
                        };
                        if !result.success {
                            warn!(index, %command, error = %result.error_message(), "Batch operation failed");
                        }
                        batch.record(index, Ok(&result));
                    }
                    Err(e) => {
                        warn!(index, %command, error = %e, "Batch operation rejected");
                        batch.record(index, Err(e.to_string()));
                    }
                }
            }
            debug!(
                total = batch.total_ops,
                failed = batch.failed,
                latency_ms = u64::try_from(batch.total_latency.as_millis()).unwrap_or(u64::MAX),
                "Batch finished"
            );
            batch
        }
    }
}

/// Whether a probe result means the router answered.
#[must_use]
pub fn probe_succeeded(result: &ExecutionResult) -> bool {
    result.success && !result.stdout.contains("not running")
}

/// Delivers router commands through the best available method.
pub struct Transport {
    config: TransportConfig,
    builder: CommandBuilder,
    active: Mutex<Option<MethodKind>>,
    consecutive_failures: AtomicU32,
    detecting: tokio::sync::Mutex<()>,
}

impl Transport {
    /// Create a transport. No probing happens until the first call.
    #[must_use]
    pub fn new(config: TransportConfig) -> Self {
        let builder = CommandBuilder::new(config.tools_path.clone());
        Self {
            config,
            builder,
            active: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            detecting: tokio::sync::Mutex::new(()),
        }
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// The cached delivery method, if detection has run.
    #[must_use]
    pub fn current_method(&self) -> Option<MethodKind> {
        *self.active.lock()
    }

    /// Forget the cached method; the next call re-detects.
    pub fn reset(&self) {
        let previous = self.active.lock().take();
        self.consecutive_failures.store(0, Ordering::SeqCst);
        if let Some(method) = previous {
            info!(%method, "Transport method reset");
        }
    }

    /// Probe methods in preference order and cache the first that responds.
    ///
    /// # Errors
    /// Returns [`TransportError::Unavailable`] when no method responds.
    pub async fn detect_best_method(&self) -> TransportResult<MethodKind> {
        let _detecting = self.detecting.lock().await;

        // Another caller may have finished detection while we waited.
        let cached = *self.active.lock();
        if let Some(method) = cached {
            return Ok(method);
        }

        let mut probes = Vec::new();
        for method in probe_order(self.config.preferred) {
            let result = self.dispatch(method, &RouterCommand::Probe).await;
            let ok = probe_succeeded(&result);
            debug!(%method, ok, error = %result.error_message(), "Probed transport method");
            probes.push((method, ok));
            if ok {
                break;
            }
        }

        if let Some(method) = select_method(&probes) {
            *self.active.lock() = Some(method);
            self.consecutive_failures.store(0, Ordering::SeqCst);
            info!(%method, "Transport method selected");
            Ok(method)
        } else {
            warn!("No transport method reached the JACK router");
            Err(TransportError::Unavailable)
        }
    }

    /// Execute one command through the cached (or freshly detected) method.
    ///
    /// # Errors
    /// [`TransportError::InvalidArgument`] for unsafe input (nothing is
    /// dispatched), [`TransportError::Unavailable`] when detection fails.
    pub async fn execute(&self, command: &RouterCommand) -> TransportResult<ExecutionResult> {
        command.validate()?;

        let cached = *self.active.lock();
        let method = match cached {
            Some(method) => method,
            None => self.detect_best_method().await?,
        };

        let result = self.dispatch(method, command).await;
        self.note_outcome(method, &result);

        debug!(
            %method,
            %command,
            success = result.success,
            exit_code = result.exit_code,
            latency_ms = u64::try_from(result.latency.as_millis()).unwrap_or(u64::MAX),
            "Command executed"
        );
        Ok(result)
    }

    /// Execute on a background task and return its handle.
    ///
    /// Dropping or aborting the handle does not guarantee the router-side
    /// command is interrupted.
    pub fn execute_async(
        self: &Arc<Self>,
        command: RouterCommand,
    ) -> JoinHandle<TransportResult<ExecutionResult>> {
        let transport = Arc::clone(self);
        tokio::spawn(async move { transport.execute(&command).await })
    }

    /// Whether the router answers a liveness probe.
    pub async fn is_alive(&self) -> bool {
        matches!(self.execute(&RouterCommand::Probe).await, Ok(r) if probe_succeeded(&r))
    }

    fn note_outcome(&self, method: MethodKind, result: &ExecutionResult) {
        if result.is_transport_failure() {
            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= REDETECT_AFTER_FAILURES {
                warn!(%method, failures, "Transport failing repeatedly, will re-detect");
                self.reset();
            }
        } else {
            self.consecutive_failures.store(0, Ordering::SeqCst);
        }
    }

    async fn dispatch(&self, method: MethodKind, command: &RouterCommand) -> ExecutionResult {
        let started = Instant::now();
        let call = async {
            match method {
                MethodKind::Direct => direct::run(&self.builder, command).await,
                MethodKind::Socket => {
                    socket::run(&self.config.host, self.config.socket_port, command).await
                }
                MethodKind::Pipe => pipe::run(&self.config.pipe_path, command).await,
                MethodKind::Bridge => bridge::run(self.config.bridge_shell, &self.builder, command).await,
            }
        };

        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%method, %command, timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX), "Command timed out");
                ExecutionResult::timeout(started.elapsed())
            }
        }
    }
}

impl RouterControl for Transport {
    fn execute(
        &self,
        command: &RouterCommand,
    ) -> impl Future<Output = TransportResult<ExecutionResult>> + Send {
        Transport::execute(self, command)
    }
}
