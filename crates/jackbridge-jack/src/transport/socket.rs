//! TCP delivery to a listener colocated with the router.

use std::time::Instant;

use tokio::net::TcpStream;

use crate::command::RouterCommand;
use crate::result::ExecutionResult;
use crate::transport::wire;

pub(crate) async fn run(host: &str, port: u16, command: &RouterCommand) -> ExecutionResult {
    let started = Instant::now();
    match TcpStream::connect((host, port)).await {
        Ok(stream) => {
            let _ = stream.set_nodelay(true);
            wire::exchange(stream, command, started).await
        }
        Err(e) => ExecutionResult::delivery_failed(
            format!("connect to {host}:{port} failed: {e}"),
            started.elapsed(),
        ),
    }
}
