//! Relaying commands through another environment's shell.
//!
//! `wsl` reaches a Linux JACK from a Windows host; `powershell` reaches a
//! Windows JACK from WSL or a container with interop enabled.

use serde::{Deserialize, Serialize};

use crate::command::{CommandBuilder, RouterCommand, TargetOs, ToolInvocation};
use crate::result::ExecutionResult;
use crate::transport::direct::run_program;

/// Shell used to cross the environment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeShell {
    /// `wsl.exe -e sh -c '<posix command line>'`
    Wsl,
    /// `powershell.exe -Command "& 'tool.exe' 'arg' ..."`
    #[default]
    PowerShell,
}

/// Build the outer invocation that runs `command` on the far side.
#[must_use]
pub fn bridge_invocation(
    shell: BridgeShell,
    builder: &CommandBuilder,
    command: &RouterCommand,
) -> ToolInvocation {
    match shell {
        BridgeShell::Wsl => {
            let inner = builder.invocation(command, TargetOs::Unix).posix_command_line();
            ToolInvocation {
                program: "wsl.exe".to_string(),
                args: vec!["-e".into(), "sh".into(), "-c".into(), inner],
            }
        }
        BridgeShell::PowerShell => {
            let inner = builder.invocation(command, TargetOs::Windows).powershell_command_line();
            ToolInvocation {
                program: "powershell.exe".to_string(),
                args: vec!["-NoProfile".into(), "-NonInteractive".into(), "-Command".into(), inner],
            }
        }
    }
}

pub(crate) async fn run(
    shell: BridgeShell,
    builder: &CommandBuilder,
    command: &RouterCommand,
) -> ExecutionResult {
    let invocation = bridge_invocation(shell, builder, command);
    run_program(&invocation.program, &invocation.args).await
}
