//! Direct execution of the JACK tools in this OS environment.

use std::process::Stdio;
use std::time::Instant;

use tokio::process::Command;
use tracing::debug;

use crate::command::{CommandBuilder, RouterCommand, TargetOs};
use crate::result::ExecutionResult;

/// Run a router command by spawning the tool directly.
///
/// Arguments are passed as separate argv elements, no shell is involved.
pub(crate) async fn run(builder: &CommandBuilder, command: &RouterCommand) -> ExecutionResult {
    let invocation = builder.invocation(command, TargetOs::host());
    run_program(&invocation.program, &invocation.args).await
}

/// Spawn a program and collect its output.
///
/// The child is killed if the returned future is dropped (timeout), but
/// that kill is best-effort.
pub(crate) async fn run_program(program: &str, args: &[String]) -> ExecutionResult {
    let started = Instant::now();
    debug!(program, ?args, "Spawning process");

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await;

    match output {
        Ok(out) => ExecutionResult::from_exit(
            out.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&out.stdout).into_owned(),
            String::from_utf8_lossy(&out.stderr).into_owned(),
            started.elapsed(),
        ),
        Err(e) => ExecutionResult::delivery_failed(
            format!("failed to spawn {program}: {e}"),
            started.elapsed(),
        ),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let args = vec!["-n".to_string(), "it's $HOME; `x`".to_string()];
        let result = run_program("echo", &args).await;

        assert!(result.success);
        assert_eq!(result.stdout, "it's $HOME; `x`");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_command_failure() {
        let result = run_program("false", &[]).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
        assert!(!result.is_transport_failure());
    }

    #[tokio::test]
    async fn test_missing_program_is_delivery_failure() {
        let result = run_program("/nonexistent/jack_lsp", &[]).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert!(result.is_transport_failure());
    }
}
