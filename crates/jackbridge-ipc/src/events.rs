//! IPC event types (server to client).

use jackbridge_core::RouterState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event sent from daemon to subscribed clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type
    pub event: EventType,
    /// Event data
    pub data: Value,
}

impl Event {
    /// Build an event from serializable data.
    #[must_use]
    pub fn new(event: EventType, data: impl Serialize) -> Self {
        Self { event, data: serde_json::to_value(data).unwrap_or_default() }
    }
}

/// Types of events that can be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Router became reachable or unreachable
    RouterStatusChanged,
    /// The live graph was mutated through the daemon
    ConnectionsChanged,
    /// A preset was applied
    PresetApplied,
    /// Saved state was replayed
    StateRestored,
    /// Error occurred
    Error,
}

impl std::str::FromStr for EventType {
    type Err = serde_json::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(Value::String(s.to_string()))
    }
}

/// Router status change data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStatusData {
    pub state: RouterState,
    /// Active delivery method, if detected
    pub method: Option<String>,
}

/// Connections changed data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionsChangedData {
    /// Request that caused the change (`toggle`, `clear_all`, ...)
    pub cause: String,
    pub succeeded: usize,
    pub failed: usize,
}

/// Preset applied data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetAppliedData {
    pub name: String,
    pub succeeded: usize,
    pub failed: usize,
}

/// State restored data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRestoredData {
    pub entries: usize,
    pub reconnected: usize,
    pub failed: usize,
}

/// Error event data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub code: i32,
    pub message: String,
    pub source: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names() {
        assert_eq!("router_status_changed".parse::<EventType>().unwrap(), EventType::RouterStatusChanged);
        assert!("levels_updated".parse::<EventType>().is_err());

        let event = Event::new(
            EventType::PresetApplied,
            PresetAppliedData { name: "stereo".into(), succeeded: 3, failed: 0 },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "preset_applied");
        assert_eq!(json["data"]["succeeded"], 3);
    }
}
