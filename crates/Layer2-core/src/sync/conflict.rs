//! Conflict detection and resolution
//!
//! A remote update conflicts with the current snapshot when it was built on
//! an older version than the current one and the current snapshot came from
//! a different side. Everything else is a plain apply.

use super::snapshot::{StateMap, StateSnapshot, StateSource};
use chrono::{DateTime, Utc};
use fragkit_foundation::{ConflictStrategy, Error, Result};
use std::sync::Arc;

/// Caller-supplied resolver: `(local, remote) -> resolved`
pub type ConflictResolver = Arc<dyn Fn(&StateMap, &StateMap) -> StateMap + Send + Sync>;

// ============================================================================
// RemoteUpdate
// ============================================================================

/// A state update arriving from the other side of the bridge
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUpdate {
    pub state: StateMap,
    /// Version the sender last saw
    pub base_version: u64,
    pub timestamp: DateTime<Utc>,
    pub source: StateSource,
}

impl RemoteUpdate {
    pub fn from_client(state: StateMap, base_version: u64) -> Self {
        Self {
            state,
            base_version,
            timestamp: Utc::now(),
            source: StateSource::Client,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source(mut self, source: StateSource) -> Self {
        self.source = source;
        self
    }

    /// Whether applying this update against `current` needs resolution
    pub fn conflicts_with(&self, current: &StateSnapshot) -> bool {
        self.base_version < current.version && self.source != current.source
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Result of [`StateStore::sync_from_client`](super::StateStore::sync_from_client)
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// No conflict; the update became the new version
    Applied(StateSnapshot),
    /// Conflict resolved into a new version
    Resolved {
        snapshot: StateSnapshot,
        strategy: ConflictStrategy,
    },
    /// Conflict resolved in favour of the current state; nothing changed
    Rejected { current: StateSnapshot },
}

impl SyncOutcome {
    /// True when the store now holds a new version
    pub fn accepted(&self) -> bool {
        !matches!(self, SyncOutcome::Rejected { .. })
    }

    /// The snapshot that is current after the sync
    pub fn snapshot(&self) -> &StateSnapshot {
        match self {
            SyncOutcome::Applied(snapshot) => snapshot,
            SyncOutcome::Resolved { snapshot, .. } => snapshot,
            SyncOutcome::Rejected { current } => current,
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Decision taken by a strategy
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Remote state replaces current as-is
    TakeRemote,
    /// Current state stays; remote is discarded
    KeepLocal,
    /// A new state combining both sides
    Combined(StateMap),
}

/// Pick a winner between `current` and `remote` under `strategy`
pub fn resolve(
    component: &str,
    strategy: ConflictStrategy,
    current: &StateSnapshot,
    remote: &RemoteUpdate,
    resolver: Option<&ConflictResolver>,
) -> Result<Resolution> {
    let resolution = match strategy {
        ConflictStrategy::ClientWins => Resolution::TakeRemote,
        ConflictStrategy::ServerWins => Resolution::KeepLocal,
        ConflictStrategy::LatestWins => {
            if remote.timestamp >= current.timestamp {
                Resolution::TakeRemote
            } else {
                Resolution::KeepLocal
            }
        }
        ConflictStrategy::Merge => {
            Resolution::Combined(merge_local_wins(&current.state, &remote.state))
        }
        ConflictStrategy::Custom => {
            let resolver = resolver.ok_or_else(|| Error::NoResolverConfigured {
                component: component.to_string(),
            })?;
            Resolution::Combined(resolver(&current.state, &remote.state))
        }
    };
    Ok(resolution)
}

/// Key union; on shared keys the local value wins
pub fn merge_local_wins(local: &StateMap, remote: &StateMap) -> StateMap {
    let mut merged = remote.clone();
    for (key, value) in local {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state_from_json;
    use chrono::Duration;
    use serde_json::json;

    fn server_snapshot(state: serde_json::Value, version: u64) -> StateSnapshot {
        StateSnapshot::new(version, state_from_json(state), StateSource::Server)
    }

    #[test]
    fn test_conflict_detection() {
        let current = server_snapshot(json!({"count": 5}), 3);

        let stale = RemoteUpdate::from_client(state_from_json(json!({"count": 7})), 2);
        assert!(stale.conflicts_with(&current));

        let fresh = RemoteUpdate::from_client(state_from_json(json!({"count": 7})), 3);
        assert!(!fresh.conflicts_with(&current));

        let same_side = stale.clone().with_source(StateSource::Server);
        assert!(!same_side.conflicts_with(&current));
    }

    #[test]
    fn test_merge_is_local_wins() {
        let local = state_from_json(json!({"count": 5, "name": "a"}));
        let remote = state_from_json(json!({"count": 7, "color": "red"}));
        assert_eq!(
            merge_local_wins(&local, &remote),
            state_from_json(json!({"count": 5, "name": "a", "color": "red"}))
        );
    }

    #[test]
    fn test_latest_wins_tie_goes_remote() {
        let current = server_snapshot(json!({"v": 1}), 2);
        let tie = RemoteUpdate::from_client(state_from_json(json!({"v": 2})), 1)
            .with_timestamp(current.timestamp);
        let older = tie.clone().with_timestamp(current.timestamp - Duration::seconds(5));

        assert_eq!(
            resolve("c", ConflictStrategy::LatestWins, &current, &tie, None).unwrap(),
            Resolution::TakeRemote
        );
        assert_eq!(
            resolve("c", ConflictStrategy::LatestWins, &current, &older, None).unwrap(),
            Resolution::KeepLocal
        );
    }

    #[test]
    fn test_custom_requires_resolver() {
        let current = server_snapshot(json!({}), 2);
        let remote = RemoteUpdate::from_client(StateMap::new(), 1);
        let err = resolve("form", ConflictStrategy::Custom, &current, &remote, None).unwrap_err();
        assert!(matches!(err, Error::NoResolverConfigured { component } if component == "form"));

        let resolver: ConflictResolver = Arc::new(|_, _| state_from_json(json!({"picked": true})));
        let resolution =
            resolve("form", ConflictStrategy::Custom, &current, &remote, Some(&resolver)).unwrap();
        assert_eq!(
            resolution,
            Resolution::Combined(state_from_json(json!({"picked": true})))
        );
    }
}
