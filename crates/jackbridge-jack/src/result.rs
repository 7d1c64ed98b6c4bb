//! Execution and batch results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a command did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool ran and exited non-zero (or its output was rejected)
    CommandFailed,
    /// No result within the per-call timeout
    Timeout,
    /// The command never reached the tool (spawn error, connection refused)
    Delivery,
}

/// Outcome of one router command. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    #[serde(rename = "latency_ms", with = "duration_ms")]
    pub latency: Duration,
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    /// Build a result from a finished tool run.
    #[must_use]
    pub fn from_exit(exit_code: i32, stdout: String, stderr: String, latency: Duration) -> Self {
        let success = exit_code == 0;
        Self {
            success,
            stdout,
            stderr,
            exit_code,
            latency,
            failure: (!success).then_some(FailureKind::CommandFailed),
        }
    }

    /// The call did not finish within its timeout.
    #[must_use]
    pub fn timeout(latency: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: "timeout".to_string(),
            exit_code: -1,
            latency,
            failure: Some(FailureKind::Timeout),
        }
    }

    /// The command could not be delivered.
    #[must_use]
    pub fn delivery_failed(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            latency,
            failure: Some(FailureKind::Delivery),
        }
    }

    /// Whether the failure lies with the delivery method rather than the
    /// command itself.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.failure, Some(FailureKind::Timeout | FailureKind::Delivery))
    }

    /// Treat a connect refused because the edge already exists as a success.
    #[must_use]
    pub fn accept_already_connected(self) -> Self {
        let exists = self.failure == Some(FailureKind::CommandFailed)
            && (self.stderr.contains("already connected") || self.stdout.contains("already connected"));
        if exists { Self { success: true, exit_code: 0, failure: None, ..self } } else { self }
    }

    /// Short human-readable error description.
    #[must_use]
    pub fn error_message(&self) -> String {
        match self.failure {
            None => String::new(),
            Some(FailureKind::Timeout) => "timeout".to_string(),
            Some(_) => {
                let stderr = self.stderr.trim();
                if stderr.is_empty() {
                    format!("exit code {}", self.exit_code)
                } else {
                    stderr.to_string()
                }
            }
        }
    }
}

/// Kind of a batch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOpKind {
    Connect,
    Disconnect,
}

/// One connect or disconnect in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOperation {
    pub kind: BatchOpKind,
    pub from: String,
    pub to: String,
}

impl BatchOperation {
    #[must_use]
    pub fn connect(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { kind: BatchOpKind::Connect, from: from.into(), to: to.into() }
    }

    #[must_use]
    pub fn disconnect(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { kind: BatchOpKind::Disconnect, from: from.into(), to: to.into() }
    }

    /// The router command for this operation.
    #[must_use]
    pub fn command(&self) -> crate::RouterCommand {
        let (from, to) = (self.from.clone(), self.to.clone());
        match self.kind {
            BatchOpKind::Connect => crate::RouterCommand::Connect { from, to },
            BatchOpKind::Disconnect => crate::RouterCommand::Disconnect { from, to },
        }
    }
}

/// Error for one failed batch operation, indexed to its submission position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchError {
    pub index: usize,
    pub message: String,
}

/// Aggregate over a batch. Failures never abort the remaining operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub total_ops: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<BatchError>,
    #[serde(rename = "total_latency_ms", with = "duration_ms")]
    pub total_latency: Duration,
}

impl BatchResult {
    /// Record the outcome of the operation at `index`.
    pub fn record(&mut self, index: usize, outcome: Result<&ExecutionResult, String>) {
        self.total_ops += 1;
        match outcome {
            Ok(result) => {
                self.total_latency += result.latency;
                if result.success {
                    self.succeeded += 1;
                } else {
                    self.failed += 1;
                    self.errors.push(BatchError { index, message: result.error_message() });
                }
            }
            Err(message) => {
                self.failed += 1;
                self.errors.push(BatchError { index, message });
            }
        }
    }

    /// Whether the operation at `index` succeeded.
    #[must_use]
    pub fn op_succeeded(&self, index: usize) -> bool {
        index < self.total_ops && !self.errors.iter().any(|e| e.index == index)
    }

    /// Whether every operation succeeded.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
