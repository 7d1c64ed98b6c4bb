//! Connections between JACK ports.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directed edge between two ports in the router's live graph.
///
/// Equality is by exact `(from, to)` match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    /// Source (output) port
    pub from: String,
    /// Destination (input) port
    pub to: String,
}

impl Connection {
    /// Create a connection.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self { from: from.into(), to: to.into() }
    }

    /// The same edge seen from the other end.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self { from: self.to.clone(), to: self.from.clone() }
    }

    /// Whether both ends name the same port.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Who asked for a tracked connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstablishedBy {
    /// Created while applying the named preset
    Preset(String),
    /// Created by an explicit connect or toggle request
    Manual,
}

impl fmt::Display for EstablishedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preset(name) => write!(f, "preset:{name}"),
            Self::Manual => f.write_str("manual"),
        }
    }
}

/// A connection this system believes it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedConnection {
    /// The tracked edge
    #[serde(flatten)]
    pub connection: Connection,
    /// When the edge was established
    pub established_at: DateTime<Utc>,
    /// What established it
    pub established_by: EstablishedBy,
}

impl TrackedConnection {
    /// Track a connection established now.
    #[must_use]
    pub fn now(connection: Connection, established_by: EstablishedBy) -> Self {
        Self { connection, established_at: Utc::now(), established_by }
    }
}
