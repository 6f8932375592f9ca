//! State diffs
//!
//! A diff is derived from two mappings and never stored. Applying the diff
//! of `(old, new)` to `old` yields exactly `new`.

use super::snapshot::StateMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Old/new pair for a key present on both sides with different values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

/// Keys added, modified and removed between two state mappings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub added: StateMap,
    pub modified: BTreeMap<String, ValueChange>,
    /// Removed keys with the value they had in the old mapping
    pub removed: StateMap,
}

impl StateDiff {
    pub fn between(old: &StateMap, new: &StateMap) -> Self {
        let mut diff = StateDiff::default();

        for (key, new_value) in new {
            match old.get(key) {
                None => {
                    diff.added.insert(key.clone(), new_value.clone());
                }
                Some(old_value) if old_value != new_value => {
                    diff.modified.insert(
                        key.clone(),
                        ValueChange {
                            old: old_value.clone(),
                            new: new_value.clone(),
                        },
                    );
                }
                Some(_) => {}
            }
        }

        for (key, old_value) in old {
            if !new.contains_key(key) {
                diff.removed.insert(key.clone(), old_value.clone());
            }
        }

        diff
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty())
    }

    /// Number of keys touched
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_changes()
    }

    /// Apply to `base`, returning the patched mapping
    pub fn apply(&self, base: &StateMap) -> StateMap {
        let mut result = base.clone();
        for key in self.removed.keys() {
            result.remove(key);
        }
        for (key, change) in &self.modified {
            result.insert(key.clone(), change.new.clone());
        }
        for (key, value) in &self.added {
            result.insert(key.clone(), value.clone());
        }
        result
    }

    /// Diff that undoes this one
    pub fn inverse(&self) -> Self {
        StateDiff {
            added: self.removed.clone(),
            modified: self
                .modified
                .iter()
                .map(|(k, c)| {
                    (
                        k.clone(),
                        ValueChange {
                            old: c.new.clone(),
                            new: c.old.clone(),
                        },
                    )
                })
                .collect(),
            removed: self.added.clone(),
        }
    }
}

pub fn diff(old: &StateMap, new: &StateMap) -> StateDiff {
    StateDiff::between(old, new)
}

pub fn apply_diff(base: &StateMap, diff: &StateDiff) -> StateMap {
    diff.apply(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::state_from_json;
    use serde_json::json;

    #[test]
    fn test_diff_classification() {
        let old = state_from_json(json!({"a": 1, "b": 2, "c": 3}));
        let new = state_from_json(json!({"a": 1, "b": 20, "d": 4}));
        let d = diff(&old, &new);

        assert_eq!(d.added, state_from_json(json!({"d": 4})));
        assert_eq!(
            d.modified.get("b"),
            Some(&ValueChange {
                old: json!(2),
                new: json!(20)
            })
        );
        assert_eq!(d.removed, state_from_json(json!({"c": 3})));
        assert_eq!(d.len(), 3);
    }

    #[test]
    fn test_apply_roundtrip() {
        let old = state_from_json(json!({"items": [1, 2], "title": "x", "gone": null}));
        let new = state_from_json(json!({"items": [1, 2, 3], "title": "x", "extra": {"k": true}}));
        let d = diff(&old, &new);

        assert_eq!(apply_diff(&old, &d), new);
        assert_eq!(apply_diff(&new, &d.inverse()), old);
    }

    #[test]
    fn test_identical_has_no_changes() {
        let s = state_from_json(json!({"a": 1}));
        let d = diff(&s, &s);
        assert!(!d.has_changes());
        assert!(d.is_empty());
    }

    #[test]
    fn test_null_value_is_present() {
        let old = state_from_json(json!({}));
        let new = state_from_json(json!({"k": null}));
        let d = diff(&old, &new);
        assert!(d.added.contains_key("k"));
        assert_eq!(apply_diff(&old, &d), new);
    }
}
