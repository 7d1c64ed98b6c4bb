//! JACK tool command building and shell escaping.
//!
//! Every router operation maps onto one of the JACK example clients
//! (`jack_lsp`, `jack_connect`, `jack_disconnect`, `jack_wait`). How the
//! resulting command line is quoted depends on the delivery method, so
//! each method picks the matching `*_command_line` rendering.

use std::fmt;

use jackbridge_core::port::validate_port_name;
use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// A control command understood by the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum RouterCommand {
    /// List live connections (`jack_lsp -c`)
    ListConnections,
    /// List ports with their properties (`jack_lsp -p`)
    ListPorts,
    /// Connect two ports
    Connect { from: String, to: String },
    /// Disconnect two ports
    Disconnect { from: String, to: String },
    /// Liveness probe (`jack_wait -c`)
    Probe,
}

impl RouterCommand {
    /// Name of the JACK tool implementing this command.
    #[must_use]
    pub fn tool(&self) -> &'static str {
        match self {
            Self::ListConnections | Self::ListPorts => "jack_lsp",
            Self::Connect { .. } => "jack_connect",
            Self::Disconnect { .. } => "jack_disconnect",
            Self::Probe => "jack_wait",
        }
    }

    /// Tool arguments, unescaped.
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::ListConnections => vec!["-c".to_string()],
            Self::ListPorts => vec!["-p".to_string()],
            Self::Connect { from, to } | Self::Disconnect { from, to } => {
                vec![from.clone(), to.clone()]
            }
            Self::Probe => vec!["-c".to_string()],
        }
    }

    /// Whether this command mutates the graph.
    #[must_use]
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Disconnect { .. })
    }

    /// Reject malformed or unsafe port names before dispatch.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidArgument`] when a port name is empty,
    /// lacks a `client:` prefix or contains control characters.
    pub fn validate(&self) -> TransportResult<()> {
        match self {
            Self::Connect { from, to } | Self::Disconnect { from, to } => {
                for port in [from, to] {
                    validate_port_name(port)
                        .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;
                }
                if from == to {
                    return Err(TransportError::InvalidArgument(format!(
                        "cannot connect {from} to itself"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for RouterCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool())?;
        for arg in self.args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Operating system family the tool runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Unix,
    Windows,
}

impl TargetOs {
    /// The OS this process runs on.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) { Self::Windows } else { Self::Unix }
    }
}

/// A resolved tool invocation: program path plus raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolInvocation {
    /// Render for a POSIX shell (`sh -c`, socket and pipe listeners).
    #[must_use]
    pub fn posix_command_line(&self) -> String {
        std::iter::once(posix_quote(&self.program))
            .chain(self.args.iter().map(|a| posix_quote(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Render as a PowerShell call-operator expression that propagates the
    /// tool's exit code.
    #[must_use]
    pub fn powershell_command_line(&self) -> String {
        let mut line = format!("& {}", powershell_quote(&self.program));
        for arg in &self.args {
            line.push(' ');
            line.push_str(&powershell_quote(arg));
        }
        line.push_str("; exit $LASTEXITCODE");
        line
    }
}

/// Builds tool invocations rooted at the JACK tools directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    tools_path: String,
}

impl CommandBuilder {
    /// Create a builder. An empty `tools_path` resolves tools via `PATH`.
    #[must_use]
    pub fn new(tools_path: impl Into<String>) -> Self {
        Self { tools_path: tools_path.into() }
    }

    /// Full program path for a tool on the given OS.
    #[must_use]
    pub fn program(&self, tool: &str, target: TargetOs) -> String {
        let exe = match target {
            TargetOs::Windows => format!("{tool}.exe"),
            TargetOs::Unix => tool.to_string(),
        };
        let base = self.tools_path.trim_end_matches(['/', '\\']);
        if base.is_empty() { exe } else { format!("{base}/{exe}") }
    }

    /// Resolve a command into a program path and arguments.
    #[must_use]
    pub fn invocation(&self, command: &RouterCommand, target: TargetOs) -> ToolInvocation {
        ToolInvocation { program: self.program(command.tool(), target), args: command.args() }
    }

    /// Invocation with the bare tool name, for listeners that resolve
    /// tools themselves.
    #[must_use]
    pub fn bare(command: &RouterCommand) -> ToolInvocation {
        ToolInvocation { program: command.tool().to_string(), args: command.args() }
    }
}

/// Quote an argument for a POSIX shell.
///
/// Plain words pass through; anything else is wrapped in single quotes with
/// embedded quotes written as `'\''`.
#[must_use]
pub fn posix_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if plain {
        return arg.to_string();
    }
    format!("'{}'", arg.replace('\'', r"'\''"))
}

/// Quote an argument as a PowerShell single-quoted string.
///
/// PowerShell also treats the typographic single quotes as delimiters, so
/// those are doubled too.
#[must_use]
pub fn powershell_quote(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len() + 2);
    out.push('\'');
    for c in arg.chars() {
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}') {
            out.push(c);
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Split a POSIX-quoted command line back into words.
///
/// Understands the subset produced by [`posix_quote`]: bare words, single
/// quotes and backslash escapes outside quotes. Returns `None` on an
/// unterminated quote.
#[must_use]
pub fn posix_split(line: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next()? {
                        '\'' => break,
                        q => current.push(q),
                    }
                }
            }
            '\\' => {
                in_word = true;
                current.push(chars.next()?);
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}
