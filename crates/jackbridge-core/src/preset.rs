//! Named connection presets.

use serde::{Deserialize, Serialize};

use crate::device::{DesiredConnectionSet, DeviceMap};
use crate::error::Result;

/// A named, declarative set of endpoint-to-endpoint connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Preset name
    pub name: String,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// `(from, to)` endpoint pairs, aliases or physical port names
    #[serde(default)]
    pub connections: Vec<(String, String)>,
}

impl Preset {
    /// Create an empty preset.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), description: None, connections: Vec::new() }
    }

    /// Add a connection (builder style).
    #[must_use]
    pub fn with(mut self, from: &str, to: &str) -> Self {
        self.connections.push((from.to_string(), to.to_string()));
        self
    }

    /// Resolve this preset's endpoints against a device map.
    ///
    /// # Errors
    /// Fails with `AliasResolutionFailed` if any endpoint is unknown.
    pub fn resolve(&self, devices: &DeviceMap) -> Result<DesiredConnectionSet> {
        devices.resolve_pairs(self.connections.iter().map(|(f, t)| (f.as_str(), t.as_str())))
    }
}

/// Summary of a preset for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetSummary {
    pub name: String,
    pub description: Option<String>,
    pub connection_count: usize,
}

impl From<&Preset> for PresetSummary {
    fn from(preset: &Preset) -> Self {
        Self {
            name: preset.name.clone(),
            description: preset.description.clone(),
            connection_count: preset.connections.len(),
        }
    }
}
