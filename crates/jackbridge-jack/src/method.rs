//! Delivery methods and their selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How commands reach the JACK router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MethodKind {
    /// Run the JACK tools in this OS environment
    Direct,
    /// Send command lines to a TCP listener next to the router
    Socket,
    /// Send command lines over a local pipe
    Pipe,
    /// Relay through another environment's shell (WSL, PowerShell)
    Bridge,
}

impl MethodKind {
    /// Fixed probe preference order.
    pub const PREFERENCE: [Self; 4] = [Self::Direct, Self::Socket, Self::Pipe, Self::Bridge];
}

impl fmt::Display for MethodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Direct => "direct",
            Self::Socket => "socket",
            Self::Pipe => "pipe",
            Self::Bridge => "bridge",
        })
    }
}

impl FromStr for MethodKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "socket" | "tcp" => Ok(Self::Socket),
            "pipe" => Ok(Self::Pipe),
            "bridge" | "wsl" => Ok(Self::Bridge),
            other => Err(format!("unknown transport method: {other}")),
        }
    }
}

/// Order in which methods are probed. A preferred method is tried first,
/// then the rest in the fixed preference order.
#[must_use]
pub fn probe_order(preferred: Option<MethodKind>) -> Vec<MethodKind> {
    let mut order = Vec::with_capacity(MethodKind::PREFERENCE.len());
    if let Some(p) = preferred {
        order.push(p);
    }
    order.extend(MethodKind::PREFERENCE.iter().copied().filter(|m| Some(*m) != preferred));
    order
}

/// Pick the first responsive method from probe results given in probe order.
#[must_use]
pub fn select_method(probes: &[(MethodKind, bool)]) -> Option<MethodKind> {
    probes.iter().find(|(_, ok)| *ok).map(|(m, _)| *m)
}
