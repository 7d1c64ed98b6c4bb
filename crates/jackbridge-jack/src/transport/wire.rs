//! Line protocol spoken by socket and pipe listeners.
//!
//! Request: one POSIX-quoted command line terminated by `\n`.
//! Response: one JSON object `{"exit_code": i32, "stdout": str, "stderr": str}`
//! terminated by `\n`.

use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::warn;

use crate::command::{CommandBuilder, RouterCommand};
use crate::result::{ExecutionResult, FailureKind};

/// Upper bound for a single response line.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Response sent back by a listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResponse {
    pub exit_code: i32,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
}

/// The request line for a command (without the trailing newline).
#[must_use]
pub fn request_line(command: &RouterCommand) -> String {
    CommandBuilder::bare(command).posix_command_line()
}

/// Send one request over an established stream and read one response.
pub(crate) async fn exchange<S>(stream: S, command: &RouterCommand, started: Instant) -> ExecutionResult
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    if let Err(e) = framed.send(request_line(command)).await {
        return ExecutionResult::delivery_failed(format!("write failed: {e}"), started.elapsed());
    }

    match framed.next().await {
        Some(Ok(line)) => match serde_json::from_str::<WireResponse>(&line) {
            Ok(resp) => {
                ExecutionResult::from_exit(resp.exit_code, resp.stdout, resp.stderr, started.elapsed())
            }
            Err(e) => {
                warn!(error = %e, "Malformed listener response");
                ExecutionResult {
                    success: false,
                    stdout: line,
                    stderr: format!("invalid response: {e}"),
                    exit_code: -1,
                    latency: started.elapsed(),
                    failure: Some(FailureKind::CommandFailed),
                }
            }
        },
        Some(Err(e)) => ExecutionResult::delivery_failed(format!("read failed: {e}"), started.elapsed()),
        None => ExecutionResult::delivery_failed("connection closed by listener", started.elapsed()),
    }
}
