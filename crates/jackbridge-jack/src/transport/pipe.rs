//! Local pipe delivery: a Unix domain socket, or a named pipe on Windows.

use std::path::Path;
use std::time::Instant;

use crate::command::RouterCommand;
use crate::result::ExecutionResult;
use crate::transport::wire;

#[cfg(unix)]
pub(crate) async fn run(path: &Path, command: &RouterCommand) -> ExecutionResult {
    let started = Instant::now();
    match tokio::net::UnixStream::connect(path).await {
        Ok(stream) => wire::exchange(stream, command, started).await,
        Err(e) => ExecutionResult::delivery_failed(
            format!("open {} failed: {e}", path.display()),
            started.elapsed(),
        ),
    }
}

#[cfg(windows)]
pub(crate) async fn run(path: &Path, command: &RouterCommand) -> ExecutionResult {
    use tokio::net::windows::named_pipe::ClientOptions;

    let started = Instant::now();
    match ClientOptions::new().open(path) {
        Ok(pipe) => wire::exchange(pipe, command, started).await,
        Err(e) => ExecutionResult::delivery_failed(
            format!("open {} failed: {e}", path.display()),
            started.elapsed(),
        ),
    }
}
