//! Eviction Store
//!
//! Thread-safe render artifact store keyed by [`Fingerprint`], bounded by a
//! byte budget with LRU eviction, and indexed by component name so one
//! component can be invalidated without touching the others.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use super::address::Fingerprint;
use super::config::CacheConfig;
use super::util::{Insertion, Lookup, LruCache, LruCacheConfig};
use crate::Result;

/// A cached render artifact
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Rendered text, shared so hits don't copy it
    pub text: Arc<str>,
    /// Owning component
    pub component: String,
    pub size_bytes: usize,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of [`EvictionStore::put`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PutOutcome {
    /// Stored; `evicted` entries were dropped to stay within budget
    Stored { evicted: usize },
    /// The artifact alone exceeds the budget and was not stored
    Rejected {
        size_bytes: usize,
        budget_bytes: usize,
    },
}

impl PutOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PutOutcome::Stored { .. })
    }
}

/// Store statistics
#[derive(Debug, Clone)]
pub struct EvictionStoreStats {
    pub entry_count: usize,
    pub total_bytes: usize,
    pub budget_bytes: usize,
    /// total_bytes / budget_bytes (0.0 - 1.0)
    pub usage_fraction: f64,
    pub components_cached: BTreeSet<String>,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub rejections: u64,
    pub expirations: u64,
    pub oldest_entry_age: Option<Duration>,
    pub newest_entry_age: Option<Duration>,
}

impl EvictionStoreStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    rejections: u64,
    expirations: u64,
}

#[derive(Debug)]
struct Inner {
    lru: LruCache<Fingerprint, CacheEntry>,
    /// component -> fingerprints currently stored for it
    by_component: HashMap<String, HashSet<Fingerprint>>,
    counters: Counters,
}

impl Inner {
    /// Drop `key` from its component's index set, removing empty sets
    fn unindex(&mut self, component: &str, key: &Fingerprint) {
        if let Some(keys) = self.by_component.get_mut(component) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_component.remove(component);
            }
        }
    }
}

/// Bounded LRU store with a component-name index
///
/// Every operation runs under one coarse mutex; nothing inside the critical
/// section performs I/O.
///
/// ```rust,ignore
/// let store = EvictionStore::new(CacheConfig::default())?;
/// store.put(fp.clone(), html, "button", None);
/// assert!(store.get(&fp).is_some());
/// store.invalidate_component("button");
/// ```
#[derive(Debug)]
pub struct EvictionStore {
    inner: Mutex<Inner>,
    budget_bytes: usize,
    default_ttl: Option<Duration>,
}

impl Default for EvictionStore {
    fn default() -> Self {
        Self::build(CacheConfig::default())
    }
}

impl EvictionStore {
    /// Fails with [`Error::Config`](crate::Error::Config) when the config does not validate
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        let lru_config = LruCacheConfig {
            max_bytes: config.budget_bytes,
            max_entries: config.max_entries,
        };
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::with_config(lru_config),
                by_component: HashMap::new(),
                counters: Counters::default(),
            }),
            budget_bytes: config.budget_bytes,
            default_ttl: config.default_ttl(),
        }
    }

    /// Store bounded by `budget_bytes` only
    pub fn with_budget(budget_bytes: usize) -> Result<Self> {
        Self::new(CacheConfig {
            budget_bytes,
            ..CacheConfig::default()
        })
    }

    /// Fetch an artifact, marking it most recently used
    ///
    /// Expired entries behave as absent and are purged here.
    pub fn get(&self, key: &Fingerprint) -> Option<Arc<str>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let expired = match inner.lru.get(key) {
            Lookup::Hit(entry) => {
                let text = Arc::clone(&entry.text);
                inner.counters.hits += 1;
                trace!(fingerprint = %key, "Render cache hit");
                return Some(text);
            }
            Lookup::Miss => None,
            Lookup::Expired(k, entry) => Some((k, entry)),
        };

        if let Some((k, entry)) = expired {
            inner.unindex(&entry.component, &k);
            inner.counters.expirations += 1;
            debug!(fingerprint = %k, component = %entry.component, "Cache entry expired");
        }
        inner.counters.misses += 1;
        None
    }

    /// Whether an entry is stored, without touching recency or expiry
    pub fn contains(&self, key: &Fingerprint) -> bool {
        let inner = self.inner.lock();
        inner.lru.contains(key)
    }

    /// Insert or replace an artifact
    ///
    /// `ttl` overrides the store's default TTL. If the artifact alone is larger
    /// than the budget it is rejected and the store is left unchanged.
    pub fn put(
        &self,
        key: Fingerprint,
        text: impl Into<Arc<str>>,
        component: &str,
        ttl: Option<Duration>,
    ) -> PutOutcome {
        let text: Arc<str> = text.into();
        let size_bytes = text.len();
        self.put_sized(key, text, component, size_bytes, ttl)
    }

    /// [`put`](Self::put) with an explicit size in bytes
    pub fn put_sized(
        &self,
        key: Fingerprint,
        text: Arc<str>,
        component: &str,
        size_bytes: usize,
        ttl: Option<Duration>,
    ) -> PutOutcome {
        let ttl = ttl.or(self.default_ttl);
        let now = Utc::now();
        let entry = CacheEntry {
            text,
            component: component.to_string(),
            size_bytes,
            created_at: now,
            expires_at: ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok().map(|d| now + d)),
        };

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        match inner.lru.insert(key.clone(), entry, size_bytes, ttl) {
            Insertion::Rejected { size_bytes, .. } => {
                inner.counters.rejections += 1;
                warn!(
                    component = %component,
                    size_bytes,
                    budget_bytes = self.budget_bytes,
                    "Render artifact exceeds cache budget, not stored"
                );
                PutOutcome::Rejected {
                    size_bytes,
                    budget_bytes: self.budget_bytes,
                }
            }
            Insertion::Stored { replaced, evicted } => {
                if let Some(old) = replaced {
                    if old.component != component {
                        inner.unindex(&old.component, &key);
                    }
                }
                for (k, victim) in &evicted {
                    inner.unindex(&victim.component, k);
                    debug!(
                        fingerprint = %k,
                        component = %victim.component,
                        size_bytes = victim.size_bytes,
                        "Evicted least recently used entry"
                    );
                }
                inner.counters.evictions += evicted.len() as u64;
                inner
                    .by_component
                    .entry(component.to_string())
                    .or_default()
                    .insert(key);
                PutOutcome::Stored {
                    evicted: evicted.len(),
                }
            }
        }
    }

    /// Remove a single entry by fingerprint
    pub fn invalidate_key(&self, key: &Fingerprint) -> bool {
        let mut inner = self.inner.lock();
        match inner.lru.remove(key) {
            Some(entry) => {
                inner.unindex(&entry.component, key);
                true
            }
            None => false,
        }
    }

    /// Remove every entry belonging to `component`; returns how many
    pub fn invalidate_component(&self, component: &str) -> usize {
        let mut inner = self.inner.lock();
        let Some(keys) = inner.by_component.remove(component) else {
            return 0;
        };
        let mut removed = 0;
        for key in &keys {
            if inner.lru.remove(key).is_some() {
                removed += 1;
            }
        }
        debug!(component = %component, removed, "Invalidated component cache");
        removed
    }

    /// Clear the store and its index
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        let removed = inner.lru.len();
        inner.lru.clear();
        inner.by_component.clear();
        debug!(removed, "Invalidated entire render cache");
    }

    /// Eagerly drop expired entries; returns how many
    pub fn purge_expired(&self) -> usize {
        let mut inner = self.inner.lock();
        let expired = inner.lru.drain_expired();
        for (k, entry) in &expired {
            inner.unindex(&entry.component, k);
        }
        inner.counters.expirations += expired.len() as u64;
        expired.len()
    }

    /// Fingerprints currently stored for a component
    pub fn component_keys(&self, component: &str) -> Vec<Fingerprint> {
        let inner = self.inner.lock();
        inner
            .by_component
            .get(component)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lru.is_empty()
    }

    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes
    }

    pub fn stats(&self) -> EvictionStoreStats {
        let inner = self.inner.lock();
        let total_bytes = inner.lru.current_bytes();
        let now = Instant::now();
        let ages = inner
            .lru
            .age_bounds()
            .map(|(oldest, newest)| (now - oldest, now - newest));

        EvictionStoreStats {
            entry_count: inner.lru.len(),
            total_bytes,
            budget_bytes: self.budget_bytes,
            usage_fraction: total_bytes as f64 / self.budget_bytes as f64,
            components_cached: inner.by_component.keys().cloned().collect(),
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            evictions: inner.counters.evictions,
            rejections: inner.counters.rejections,
            expirations: inner.counters.expirations,
            oldest_entry_age: ages.map(|(oldest, _)| oldest),
            newest_entry_age: ages.map(|(_, newest)| newest),
        }
    }

    /// Verify the component index mirrors the store exactly
    #[cfg(test)]
    fn index_consistent(&self) -> bool {
        let inner = self.inner.lock();
        let indexed: usize = inner.by_component.values().map(HashSet::len).sum();
        indexed == inner.lru.len()
            && inner
                .by_component
                .values()
                .all(|keys| !keys.is_empty() && keys.iter().all(|k| inner.lru.contains(k)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn fp(s: &str) -> Fingerprint {
        Fingerprint::from_hex(s)
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(EvictionStore::with_budget(0), Err(Error::Config(_))));
        let zero_entries = CacheConfig {
            max_entries: Some(0),
            ..CacheConfig::default()
        };
        assert!(EvictionStore::new(zero_entries).is_err());
        assert_eq!(EvictionStore::default().budget_bytes(), 50 * 1024 * 1024);
    }

    #[test]
    fn test_put_get() {
        let store = EvictionStore::with_budget(1024).unwrap();
        assert!(store.put(fp("k1"), "<b>hi</b>", "button", None).is_stored());
        assert_eq!(store.get(&fp("k1")).as_deref(), Some("<b>hi</b>"));
        assert!(store.get(&fp("missing")).is_none());

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_bytes, 9);
    }

    #[test]
    fn test_budget_eviction_keeps_index() {
        let store = EvictionStore::with_budget(20).unwrap();
        store.put(fp("a1"), "x".repeat(10), "a", None);
        store.put(fp("b1"), "x".repeat(10), "b", None);
        let outcome = store.put(fp("a2"), "x".repeat(10), "a", None);

        assert_eq!(outcome, PutOutcome::Stored { evicted: 1 });
        assert!(store.get(&fp("a1")).is_none());
        assert!(store.stats().total_bytes <= 20);
        assert_eq!(store.component_keys("a"), vec![fp("a2")]);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_oversized_rejected() {
        let store = EvictionStore::with_budget(8).unwrap();
        store.put(fp("small"), "tiny", "c", None);
        let outcome = store.put(fp("big"), "far too large", "c", None);

        assert_eq!(
            outcome,
            PutOutcome::Rejected {
                size_bytes: 13,
                budget_bytes: 8
            }
        );
        assert!(store.get(&fp("small")).is_some());
        assert_eq!(store.stats().rejections, 1);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_scoped_invalidation() {
        let store = EvictionStore::with_budget(1024).unwrap();
        store.put(fp("a1"), "a-one", "a", None);
        store.put(fp("a2"), "a-two", "a", None);
        store.put(fp("b1"), "b-one", "b", None);

        assert_eq!(store.invalidate_component("a"), 2);
        assert!(store.get(&fp("a1")).is_none());
        assert!(store.get(&fp("a2")).is_none());
        assert_eq!(store.get(&fp("b1")).as_deref(), Some("b-one"));
        assert_eq!(
            store.stats().components_cached,
            BTreeSet::from(["b".to_string()])
        );
        assert_eq!(store.invalidate_component("a"), 0);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_invalidate_key_and_all() {
        let store = EvictionStore::with_budget(1024).unwrap();
        store.put(fp("a1"), "one", "a", None);
        store.put(fp("a2"), "two", "a", None);

        assert!(store.invalidate_key(&fp("a1")));
        assert!(!store.invalidate_key(&fp("a1")));
        assert_eq!(store.component_keys("a"), vec![fp("a2")]);

        store.invalidate_all();
        assert!(store.is_empty());
        assert!(store.stats().components_cached.is_empty());
    }

    #[test]
    fn test_ttl_expiry_unindexes() {
        let store = EvictionStore::with_budget(1024).unwrap();
        store.put(fp("t"), "temp", "a", Some(Duration::from_millis(0)));
        store.put(fp("p"), "perm", "b", None);
        std::thread::sleep(Duration::from_millis(2));

        assert!(store.get(&fp("t")).is_none());
        assert!(store.component_keys("a").is_empty());
        assert_eq!(store.stats().expirations, 1);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_purge_expired() {
        let store = EvictionStore::with_budget(1024).unwrap();
        store.put(fp("t1"), "temp", "a", Some(Duration::from_millis(0)));
        store.put(fp("t2"), "temp", "a", Some(Duration::from_millis(0)));
        store.put(fp("p"), "perm", "a", None);
        std::thread::sleep(Duration::from_millis(2));

        assert_eq!(store.purge_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_replace_moves_component() {
        let store = EvictionStore::with_budget(1024).unwrap();
        store.put(fp("k"), "v1", "a", None);
        store.put(fp("k"), "v2", "b", None);

        assert!(store.component_keys("a").is_empty());
        assert_eq!(store.component_keys("b"), vec![fp("k")]);
        assert_eq!(store.len(), 1);
        assert!(store.index_consistent());
    }

    #[test]
    fn test_usage_fraction() {
        let store = EvictionStore::with_budget(100).unwrap();
        store.put(fp("a"), "x".repeat(25), "a", None);
        store.put(fp("b"), "x".repeat(25), "b", None);
        assert!((store.stats().usage_fraction - 0.5).abs() < 0.01);
    }
}
