//! State snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A component's state mapping
pub type StateMap = Map<String, Value>;

/// Which side produced a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateSource {
    /// Host-side update (`set_state`, `update_state`, rollback)
    #[default]
    Server,
    /// Update sent back by the rendered fragment
    Client,
    /// Output of a merge or custom resolver
    Resolved,
}

impl StateSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateSource::Server => "server",
            StateSource::Client => "client",
            StateSource::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for StateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One component's state at one version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Starts at 1, strictly increasing per component
    pub version: u64,
    pub state: StateMap,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub source: StateSource,
}

impl StateSnapshot {
    pub fn new(version: u64, state: StateMap, source: StateSource) -> Self {
        Self {
            version,
            state,
            timestamp: Utc::now(),
            source,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }
}

/// Build a [`StateMap`] from a JSON object literal; non-objects yield an empty map
pub fn state_from_json(value: Value) -> StateMap {
    match value {
        Value::Object(map) => map,
        _ => StateMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_snapshot_wire_shape() {
        let snap = StateSnapshot::new(3, state_from_json(json!({"count": 5})), StateSource::Server);
        let value = serde_json::to_value(&snap).unwrap();

        assert_eq!(value["version"], 3);
        assert_eq!(value["state"]["count"], 5);
        assert_eq!(value["source"], "server");
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let snap: StateSnapshot = serde_json::from_value(json!({
            "version": 2,
            "state": {"a": 1},
            "timestamp": "2024-05-01T12:00:00Z",
            "source": "client",
            "checksum": "ignored"
        }))
        .unwrap();
        assert_eq!(snap.version, 2);
        assert_eq!(snap.source, StateSource::Client);
    }
}
