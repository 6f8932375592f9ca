//! StateStore - versioned per-component state
//!
//! Each component moves from no state to a chain of snapshots: the current
//! one plus a bounded history of prior versions (oldest dropped first).
//! Versions only grow; rollback records the restored state as a new version.
//!
//! ## Locking
//!
//! One `RwLock` guards all snapshot chains. Subscribers are called after the
//! lock is released, with the snapshot captured inside it, so a subscriber
//! may read from or write to the same store.

use super::conflict::{resolve, ConflictResolver, RemoteUpdate, Resolution, SyncOutcome};
use super::diff::StateDiff;
use super::snapshot::{StateMap, StateSnapshot, StateSource};
use fragkit_foundation::{ConflictStrategy, Error, JsonStore, Result, StateConfig};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Subscriber callback, called with the new snapshot after each mutation
pub type Subscriber = Arc<dyn Fn(&StateSnapshot) -> anyhow::Result<()> + Send + Sync>;

// ============================================================================
// Public types
// ============================================================================

/// Handle returned by [`StateStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "subscription-{}", self.0)
    }
}

/// A subscriber that returned an error
#[derive(Debug, Clone)]
pub struct SubscriberFailure {
    pub component: String,
    pub subscription: SubscriptionId,
    pub version: u64,
    pub message: String,
}

/// Rollback destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
    /// An exact version still in history
    Version(u64),
    /// N versions before the current one (must be at least 1)
    StepsBack(usize),
}

/// Serialized form of one component's state
///
/// The current snapshot's fields sit at the top level; prior snapshots go in
/// `history`, oldest first. Unknown fields are ignored on import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateExport {
    #[serde(flatten)]
    pub current: StateSnapshot,
    #[serde(default)]
    pub history: Vec<StateSnapshot>,
}

// ============================================================================
// StateStore
// ============================================================================

#[derive(Debug, Clone)]
struct ComponentState {
    current: StateSnapshot,
    /// Prior snapshots, oldest first; never contains `current`
    history: VecDeque<StateSnapshot>,
}

impl ComponentState {
    fn find(&self, version: u64) -> Option<&StateSnapshot> {
        if self.current.version == version {
            return Some(&self.current);
        }
        self.history.iter().find(|s| s.version == version)
    }
}

/// Versioned state store with history, rollback and conflict resolution
pub struct StateStore {
    components: RwLock<HashMap<String, ComponentState>>,
    subscribers: RwLock<HashMap<String, Vec<(SubscriptionId, Subscriber)>>>,
    resolver: RwLock<Option<ConflictResolver>>,
    failures: Mutex<Vec<SubscriberFailure>>,
    next_subscription: AtomicU64,
    max_history: usize,
    strategy: ConflictStrategy,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("components", &self.components.read().len())
            .field("max_history", &self.max_history)
            .field("strategy", &self.strategy)
            .finish()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::build(StateConfig::default())
    }
}

impl StateStore {
    /// Fails with [`Error::Config`] when `max_history` is 0
    pub fn new(config: StateConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: StateConfig) -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashMap::new()),
            resolver: RwLock::new(None),
            failures: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            max_history: config.max_history,
            strategy: config.conflict_strategy,
        }
    }

    pub fn with_strategy(strategy: ConflictStrategy) -> Self {
        Self::build(StateConfig {
            conflict_strategy: strategy,
            ..StateConfig::default()
        })
    }

    /// Attach a resolver at construction (used by [`ConflictStrategy::Custom`])
    pub fn with_resolver<F>(self, resolver: F) -> Self
    where
        F: Fn(&StateMap, &StateMap) -> StateMap + Send + Sync + 'static,
    {
        self.set_conflict_resolver(resolver);
        self
    }

    pub fn set_conflict_resolver<F>(&self, resolver: F)
    where
        F: Fn(&StateMap, &StateMap) -> StateMap + Send + Sync + 'static,
    {
        let resolver: ConflictResolver = Arc::new(resolver);
        *self.resolver.write() = Some(resolver);
    }

    pub fn strategy(&self) -> ConflictStrategy {
        self.strategy
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Replace a component's state outright
    pub fn set_state(&self, component: &str, state: StateMap) -> StateSnapshot {
        self.commit(component, StateSource::Server, |_| state)
    }

    /// Shallow-merge `partial` onto the current state (`merge = true`, partial
    /// keys win) or replace it. A component without state starts from empty.
    pub fn update_state(&self, component: &str, partial: StateMap, merge: bool) -> StateSnapshot {
        self.commit(component, StateSource::Server, move |current| {
            if !merge {
                return partial;
            }
            let mut next = current.cloned().unwrap_or_default();
            for (key, value) in partial {
                next.insert(key, value);
            }
            next
        })
    }

    /// Apply an update from the client, resolving conflicts per the
    /// configured strategy
    pub fn sync_from_client(&self, component: &str, update: RemoteUpdate) -> Result<SyncOutcome> {
        let resolver = self.resolver.read().clone();

        let outcome = {
            let mut components = self.components.write();
            let conflict = components
                .get(component)
                .filter(|entry| update.conflicts_with(&entry.current));

            let Some(entry) = conflict else {
                let snapshot = Self::push(
                    &mut components,
                    component,
                    update.state,
                    update.source,
                    self.max_history,
                );
                debug!(component = %component, version = snapshot.version, "Client update applied");
                drop(components);
                self.notify(component, &snapshot);
                return Ok(SyncOutcome::Applied(snapshot));
            };

            let resolution = resolve(
                component,
                self.strategy,
                &entry.current,
                &update,
                resolver.as_ref(),
            )?;
            info!(
                component = %component,
                strategy = %self.strategy,
                current_version = entry.current.version,
                base_version = update.base_version,
                "State conflict resolved"
            );

            match resolution {
                Resolution::KeepLocal => SyncOutcome::Rejected {
                    current: entry.current.clone(),
                },
                Resolution::TakeRemote => SyncOutcome::Resolved {
                    snapshot: Self::push(
                        &mut components,
                        component,
                        update.state,
                        update.source,
                        self.max_history,
                    ),
                    strategy: self.strategy,
                },
                Resolution::Combined(state) => SyncOutcome::Resolved {
                    snapshot: Self::push(
                        &mut components,
                        component,
                        state,
                        StateSource::Resolved,
                        self.max_history,
                    ),
                    strategy: self.strategy,
                },
            }
        };

        if let SyncOutcome::Resolved { snapshot, .. } = &outcome {
            self.notify(component, snapshot);
        }
        Ok(outcome)
    }

    /// Restore a prior snapshot as a new version
    pub fn rollback(&self, component: &str, target: RollbackTarget) -> Result<StateSnapshot> {
        let snapshot = {
            let mut components = self.components.write();
            let entry = components
                .get(component)
                .ok_or_else(|| Error::ComponentNotFound(component.to_string()))?;

            let restored = match target {
                RollbackTarget::Version(version) => entry.find(version).cloned().ok_or_else(|| {
                    Error::VersionNotFound {
                        component: component.to_string(),
                        version,
                    }
                })?,
                RollbackTarget::StepsBack(0) => {
                    return Err(Error::InvalidInput(
                        "rollback needs at least one step back".to_string(),
                    ))
                }
                RollbackTarget::StepsBack(steps) => {
                    let len = entry.history.len();
                    if steps > len {
                        return Err(Error::VersionNotFound {
                            component: component.to_string(),
                            version: entry.current.version.saturating_sub(steps as u64),
                        });
                    }
                    entry.history[len - steps].clone()
                }
            };

            let snapshot = Self::push(
                &mut components,
                component,
                restored.state,
                StateSource::Server,
                self.max_history,
            );
            info!(
                component = %component,
                restored_from = restored.version,
                version = snapshot.version,
                "State rolled back"
            );
            snapshot
        };

        self.notify(component, &snapshot);
        Ok(snapshot)
    }

    /// Return one component (or all) to the no-state condition
    pub fn clear(&self, component: Option<&str>) -> usize {
        let mut components = self.components.write();
        match component {
            Some(name) => usize::from(components.remove(name).is_some()),
            None => {
                let count = components.len();
                components.clear();
                count
            }
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn get_state(&self, component: &str) -> Option<StateMap> {
        self.components
            .read()
            .get(component)
            .map(|entry| entry.current.state.clone())
    }

    pub fn snapshot(&self, component: &str) -> Option<StateSnapshot> {
        self.components
            .read()
            .get(component)
            .map(|entry| entry.current.clone())
    }

    pub fn version(&self, component: &str) -> Option<u64> {
        self.components
            .read()
            .get(component)
            .map(|entry| entry.current.version)
    }

    /// Last `limit` snapshots, oldest first, current last
    pub fn history(&self, component: &str, limit: Option<usize>) -> Vec<StateSnapshot> {
        let components = self.components.read();
        let Some(entry) = components.get(component) else {
            return Vec::new();
        };
        let mut all: Vec<StateSnapshot> = entry.history.iter().cloned().collect();
        all.push(entry.current.clone());
        if let Some(limit) = limit {
            let skip = all.len().saturating_sub(limit);
            all.drain(..skip);
        }
        all
    }

    /// Accumulated change from `version` to the current snapshot
    pub fn diff_since(&self, component: &str, version: u64) -> Result<StateDiff> {
        let components = self.components.read();
        let entry = components
            .get(component)
            .ok_or_else(|| Error::ComponentNotFound(component.to_string()))?;
        let base = entry.find(version).ok_or_else(|| Error::VersionNotFound {
            component: component.to_string(),
            version,
        })?;
        Ok(StateDiff::between(&base.state, &entry.current.state))
    }

    pub fn components(&self) -> Vec<String> {
        let mut names: Vec<String> = self.components.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn contains(&self, component: &str) -> bool {
        self.components.read().contains_key(component)
    }

    // ========================================================================
    // Subscribers
    // ========================================================================

    pub fn subscribe<F>(&self, component: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&StateSnapshot) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst));
        let callback: Subscriber = Arc::new(callback);
        self.subscribers
            .write()
            .entry(component.to_string())
            .or_default()
            .push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let mut removed = false;
        subscribers.retain(|_, subs| {
            let before = subs.len();
            subs.retain(|(sub_id, _)| *sub_id != id);
            removed |= subs.len() != before;
            !subs.is_empty()
        });
        removed
    }

    /// Failures recorded since the last call
    pub fn take_subscriber_failures(&self) -> Vec<SubscriberFailure> {
        std::mem::take(&mut *self.failures.lock())
    }

    // ========================================================================
    // Export / Import
    // ========================================================================

    pub fn export_state(&self, component: &str) -> Result<StateExport> {
        let components = self.components.read();
        let entry = components
            .get(component)
            .ok_or_else(|| Error::ComponentNotFound(component.to_string()))?;
        Ok(StateExport {
            current: entry.current.clone(),
            history: entry.history.iter().cloned().collect(),
        })
    }

    pub fn export_state_json(&self, component: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_state(component)?)?)
    }

    /// Replace a component's state with an export
    ///
    /// The current snapshot (version included) is restored exactly. History
    /// is restored best-effort: only snapshots older than the current version
    /// are kept, in version order, trimmed to `max_history`.
    pub fn import_state(&self, component: &str, export: StateExport) -> StateSnapshot {
        let StateExport { current, history } = export;

        let mut history: Vec<StateSnapshot> = history
            .into_iter()
            .filter(|s| s.version < current.version)
            .collect();
        history.sort_by_key(|s| s.version);
        history.dedup_by_key(|s| s.version);
        let skip = history.len().saturating_sub(self.max_history);

        let entry = ComponentState {
            current: current.clone(),
            history: history.into_iter().skip(skip).collect(),
        };
        self.components.write().insert(component.to_string(), entry);
        debug!(component = %component, version = current.version, "State imported");

        self.notify(component, &current);
        current
    }

    pub fn import_state_json(&self, component: &str, json: &str) -> Result<StateSnapshot> {
        let export: StateExport = serde_json::from_str(json)?;
        Ok(self.import_state(component, export))
    }

    /// Persist a component's export as `<component>-<digest>.state.json`
    pub fn save_state(&self, store: &JsonStore, component: &str) -> Result<()> {
        store.save(&state_file_name(component), &self.export_state(component)?)
    }

    /// Load a component previously written by [`save_state`](Self::save_state)
    pub fn load_state(&self, store: &JsonStore, component: &str) -> Result<Option<StateSnapshot>> {
        Ok(store
            .load_optional::<StateExport>(&state_file_name(component))?
            .map(|export| self.import_state(component, export)))
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Compute the next state from the current one and record it
    fn commit<F>(&self, component: &str, source: StateSource, next: F) -> StateSnapshot
    where
        F: FnOnce(Option<&StateMap>) -> StateMap,
    {
        let snapshot = {
            let mut components = self.components.write();
            let state = next(components.get(component).map(|e| &e.current.state));
            Self::push(&mut components, component, state, source, self.max_history)
        };
        debug!(
            component = %component,
            version = snapshot.version,
            source = %source,
            "State updated"
        );
        self.notify(component, &snapshot);
        snapshot
    }

    /// Make `state` the new current snapshot, moving the old one to history
    fn push(
        components: &mut HashMap<String, ComponentState>,
        component: &str,
        state: StateMap,
        source: StateSource,
        max_history: usize,
    ) -> StateSnapshot {
        match components.get_mut(component) {
            Some(entry) => {
                let snapshot = StateSnapshot::new(entry.current.version + 1, state, source);
                let prior = std::mem::replace(&mut entry.current, snapshot.clone());
                entry.history.push_back(prior);
                while entry.history.len() > max_history {
                    entry.history.pop_front();
                }
                snapshot
            }
            None => {
                let snapshot = StateSnapshot::new(1, state, source);
                components.insert(
                    component.to_string(),
                    ComponentState {
                        current: snapshot.clone(),
                        history: VecDeque::new(),
                    },
                );
                snapshot
            }
        }
    }

    /// Call subscribers in subscription order; failures are logged and kept
    fn notify(&self, component: &str, snapshot: &StateSnapshot) {
        let subscribers: Vec<(SubscriptionId, Subscriber)> = self
            .subscribers
            .read()
            .get(component)
            .cloned()
            .unwrap_or_default();

        for (id, callback) in subscribers {
            if let Err(e) = callback(snapshot) {
                warn!(
                    component = %component,
                    subscription = %id,
                    version = snapshot.version,
                    "Subscriber failed: {:#}",
                    e
                );
                self.failures.lock().push(SubscriberFailure {
                    component: component.to_string(),
                    subscription: id,
                    version: snapshot.version,
                    message: format!("{:#}", e),
                });
            }
        }
    }
}

/// `<sanitized>-<digest>.state.json`; the digest of the raw name keeps
/// names that sanitize alike (`my/widget`, `my_widget`) in separate files
fn state_file_name(component: &str) -> String {
    let safe: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = Sha256::digest(component.as_bytes());
    let suffix: String = digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}.state.json", safe, suffix)
}
