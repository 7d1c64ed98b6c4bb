//! JACK port naming and direction.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Direction of a JACK port.
///
/// JACK names ports from the point of view of the client: a hardware
/// `capture` port produces audio, so it is an output in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortDirection {
    /// Receives audio (playback, sinks)
    Input,
    /// Produces audio (capture, sources)
    Output,
}

impl PortDirection {
    /// Parse the direction from a `jack_lsp -p` properties line,
    /// e.g. `properties: output,physical,terminal,`.
    #[must_use]
    pub fn from_properties(line: &str) -> Option<Self> {
        let props = line.trim().strip_prefix("properties:")?;
        props.split(',').map(str::trim).find_map(|p| match p {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            _ => None,
        })
    }

    /// Guess the direction from the port naming convention.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let short = name.rsplit(':').next().unwrap_or(name).to_ascii_lowercase();

        if short.contains("capture") || short.contains("monitor") {
            return Some(Self::Output);
        }
        if short.contains("playback") {
            return Some(Self::Input);
        }
        if short.contains("out") {
            return Some(Self::Output);
        }
        if short.starts_with("in") || short.contains("_in") {
            return Some(Self::Input);
        }
        None
    }
}

/// A port enumerated from the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Full port name (`client:port`)
    pub name: String,
    /// Port direction, if known
    pub direction: Option<PortDirection>,
}

impl Port {
    /// Create a port, inferring its direction from the name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let direction = PortDirection::from_name(&name);
        Self { name, direction }
    }

    /// Client part of the port name (`system` for `system:capture_1`).
    #[must_use]
    pub fn client(&self) -> &str {
        self.name.split_once(':').map_or(self.name.as_str(), |(client, _)| client)
    }

    /// Effective direction: reported by the router, else guessed from the name.
    #[must_use]
    pub fn effective_direction(&self) -> Option<PortDirection> {
        self.direction.or_else(|| PortDirection::from_name(&self.name))
    }
}

fn port_name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[^:\p{Cc}]+:[^\p{Cc}]+$").expect("port name pattern is valid")
    })
}

/// Check whether a string looks like a physical JACK port name.
#[must_use]
pub fn is_port_name(name: &str) -> bool {
    port_name_regex().is_match(name)
}

/// Validate a physical port name before it reaches a command line.
///
/// # Errors
/// Returns [`Error::InvalidPortName`] for empty names, names without a
/// `client:` prefix or names containing control characters.
pub fn validate_port_name(name: &str) -> Result<()> {
    if is_port_name(name) { Ok(()) } else { Err(Error::InvalidPortName(name.to_string())) }
}
