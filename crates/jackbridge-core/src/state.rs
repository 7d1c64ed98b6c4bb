//! Graph status and persisted snapshot types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::connection::{Connection, TrackedConnection};

/// Reachability of the router as seen by the health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterState {
    /// Not probed yet
    #[default]
    Unknown,
    /// The control surface answered the last probe
    Reachable,
    /// The last probe failed
    Unreachable,
}

/// Live graph plus the subset this system tracks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatus {
    /// Connections currently present in the router
    pub live: Vec<Connection>,
    /// Connections established by this system
    pub tracked: Vec<TrackedConnection>,
}

/// The persisted state document.
///
/// Serialized as `{connections: [{from, to}], tracked: [...], timestamp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Live graph at save time
    pub connections: Vec<Connection>,
    /// Tracked connections at save time
    pub tracked: Vec<TrackedConnection>,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
}

impl StateSnapshot {
    /// Capture a snapshot of the given status, stamped now.
    #[must_use]
    pub fn capture(status: GraphStatus) -> Self {
        Self { connections: status.live, tracked: status.tracked, timestamp: Utc::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::EstablishedBy;

    #[test]
    fn test_snapshot_document_shape() {
        let conn = Connection::new("system:capture_1", "system:playback_1");
        let snapshot = StateSnapshot::capture(GraphStatus {
            live: vec![conn.clone()],
            tracked: vec![TrackedConnection::now(conn, EstablishedBy::Manual)],
        });

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["connections"][0]["from"], "system:capture_1");
        assert_eq!(value["tracked"][0]["established_by"], "manual");
        assert!(value["timestamp"].is_string());

        let back: StateSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snapshot);
    }
}
