//! Byte-budgeted LRU cache
//!
//! Not thread-safe on its own; [`EvictionStore`](crate::cache::EvictionStore)
//! wraps it in a lock. Recency is tracked with a monotonically increasing
//! access tick and an ordered tick index, so lookups touch one hash entry
//! and eviction always pops the smallest tick.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Configuration for the LRU core
#[derive(Debug, Clone)]
pub struct LruCacheConfig {
    /// Maximum total size of live entries in bytes
    pub max_bytes: usize,
    /// Maximum number of entries (`None` = bounded by bytes only)
    pub max_entries: Option<usize>,
}

impl LruCacheConfig {
    pub fn with_budget(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            max_entries: None,
        }
    }

    pub fn with_limits(max_bytes: usize, max_entries: usize) -> Self {
        Self {
            max_bytes,
            max_entries: Some(max_entries),
        }
    }
}

#[derive(Debug)]
struct LruEntry<V> {
    value: V,
    tick: u64,
    created_at: Instant,
    expires_at: Option<Instant>,
    size_bytes: usize,
}

impl<V> LruEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Result of a lookup
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, K, V> {
    Hit(&'a V),
    Miss,
    /// The entry had expired and has been removed
    Expired(K, V),
}

impl<'a, K, V> Lookup<'a, K, V> {
    pub fn hit(self) -> Option<&'a V> {
        match self {
            Lookup::Hit(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of an insert
#[derive(Debug)]
pub enum Insertion<K, V> {
    /// Stored. `replaced` is the previous value under the same key;
    /// `evicted` lists entries dropped to make room, oldest first.
    Stored {
        replaced: Option<V>,
        evicted: Vec<(K, V)>,
    },
    /// The entry alone exceeds the byte budget and was not stored
    Rejected { value: V, size_bytes: usize },
}

/// LRU cache bounded by total bytes, with optional per-entry TTL
#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: HashMap<K, LruEntry<V>>,
    /// tick -> key, ascending = least recently used first
    recency: BTreeMap<u64, K>,
    config: LruCacheConfig,
    tick: u64,
    current_bytes: usize,
}

impl<K: Eq + Hash + Clone, V> LruCache<K, V> {
    pub fn new(max_bytes: usize) -> Self {
        Self::with_config(LruCacheConfig::with_budget(max_bytes))
    }

    pub fn with_config(config: LruCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            recency: BTreeMap::new(),
            config,
            tick: 0,
            current_bytes: 0,
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up an entry and mark it most recently used
    ///
    /// An expired entry is removed on access and handed back so the caller
    /// can keep side indexes consistent.
    pub fn get(&mut self, key: &K) -> Lookup<'_, K, V> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            if let Some(value) = self.remove(key) {
                return Lookup::Expired(key.clone(), value);
            }
        }

        match self.entries.get_mut(key) {
            Some(entry) => {
                self.tick += 1;
                self.recency.remove(&entry.tick);
                entry.tick = self.tick;
                self.recency.insert(self.tick, key.clone());
                Lookup::Hit(&entry.value)
            }
            None => Lookup::Miss,
        }
    }

    /// Check presence without touching recency or expiry
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry, evicting least recently used entries
    /// (never the one being inserted) until the budget holds again
    pub fn insert(
        &mut self,
        key: K,
        value: V,
        size_bytes: usize,
        ttl: Option<Duration>,
    ) -> Insertion<K, V> {
        if size_bytes > self.config.max_bytes {
            return Insertion::Rejected { value, size_bytes };
        }

        let now = Instant::now();
        let replaced = self.remove(&key);
        let tick = self.next_tick();
        self.current_bytes += size_bytes;
        self.recency.insert(tick, key.clone());
        self.entries.insert(
            key.clone(),
            LruEntry {
                value,
                tick,
                created_at: now,
                expires_at: ttl.map(|ttl| now + ttl),
                size_bytes,
            },
        );

        let mut evicted = Vec::new();
        while self.over_limit() {
            match self.pop_lru_except(&key) {
                Some(pair) => evicted.push(pair),
                None => break,
            }
        }

        Insertion::Stored { replaced, evicted }
    }

    fn over_limit(&self) -> bool {
        self.current_bytes > self.config.max_bytes
            || self
                .config
                .max_entries
                .is_some_and(|max| self.entries.len() > max)
    }

    fn pop_lru_except(&mut self, keep: &K) -> Option<(K, V)> {
        let victim = self
            .recency
            .values()
            .find(|k| *k != keep)
            .cloned()?;
        self.remove(&victim).map(|value| (victim, value))
    }

    /// Remove a specific key
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| {
            self.recency.remove(&entry.tick);
            self.current_bytes = self.current_bytes.saturating_sub(entry.size_bytes);
            entry.value
        })
    }

    /// Remove every expired entry, returning them
    pub fn drain_expired(&mut self) -> Vec<(K, V)> {
        let now = Instant::now();
        let expired: Vec<K> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|k| self.remove(&k).map(|v| (k, v)))
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.current_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_bytes(&self) -> usize {
        self.config.max_bytes
    }

    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Creation instants of the oldest and newest entries
    pub fn age_bounds(&self) -> Option<(Instant, Instant)> {
        let mut created = self.entries.values().map(|e| e.created_at);
        let first = created.next()?;
        Some(created.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }

    /// Keys ordered from least to most recently used
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.recency.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored_evictions<K, V>(ins: Insertion<K, V>) -> Vec<K> {
        match ins {
            Insertion::Stored { evicted, .. } => evicted.into_iter().map(|(k, _)| k).collect(),
            Insertion::Rejected { .. } => panic!("unexpected rejection"),
        }
    }

    #[test]
    fn test_lru_eviction_order() {
        let mut cache = LruCache::new(30);
        cache.insert("a", 1, 10, None);
        cache.insert("b", 2, 10, None);
        cache.insert("c", 3, 10, None);

        // Touch "a" so "b" becomes least recently used
        assert_eq!(cache.get(&"a"), Lookup::Hit(&1));

        let evicted = stored_evictions(cache.insert("d", 4, 10, None));
        assert_eq!(evicted, vec!["b"]);
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.current_bytes(), 30);
    }

    #[test]
    fn test_replace_updates_size() {
        let mut cache = LruCache::new(100);
        cache.insert("a", "x", 10, None);
        match cache.insert("a", "y", 25, None) {
            Insertion::Stored { replaced, evicted } => {
                assert_eq!(replaced, Some("x"));
                assert!(evicted.is_empty());
            }
            Insertion::Rejected { .. } => panic!("unexpected rejection"),
        }
        assert_eq!(cache.current_bytes(), 25);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_oversized_rejected() {
        let mut cache = LruCache::new(50);
        cache.insert("small", 1, 10, None);
        assert!(matches!(
            cache.insert("large", 2, 51, None),
            Insertion::Rejected { size_bytes: 51, .. }
        ));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_bytes(), 10);
    }

    #[test]
    fn test_large_insert_evicts_several() {
        let mut cache = LruCache::new(100);
        cache.insert(1, (), 40, None);
        cache.insert(2, (), 40, None);
        cache.insert(3, (), 20, None);
        let evicted = stored_evictions(cache.insert(4, (), 90, None));
        assert_eq!(evicted, vec![1, 2, 3]);
        assert_eq!(cache.current_bytes(), 90);
    }

    #[test]
    fn test_entry_limit() {
        let mut cache = LruCache::with_config(LruCacheConfig::with_limits(1000, 2));
        cache.insert("a", 1, 1, None);
        cache.insert("b", 2, 1, None);
        let evicted = stored_evictions(cache.insert("c", 3, 1, None));
        assert_eq!(evicted, vec!["a"]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_expired_entry_is_absent() {
        let mut cache = LruCache::new(100);
        cache.insert("a", 1, 10, Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.get(&"a"), Lookup::Expired("a", 1));
        assert!(cache.is_empty());
        assert_eq!(cache.current_bytes(), 0);
    }

    #[test]
    fn test_drain_expired() {
        let mut cache = LruCache::new(100);
        cache.insert("old", 1, 10, Some(Duration::from_millis(0)));
        cache.insert("fresh", 2, 10, Some(Duration::from_secs(60)));
        cache.insert("forever", 3, 10, None);
        std::thread::sleep(Duration::from_millis(2));

        let drained = cache.drain_expired();
        assert_eq!(drained, vec![("old", 1)]);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_bytes(), 20);
    }

    #[test]
    fn test_recency_order() {
        let mut cache = LruCache::new(100);
        cache.insert("a", (), 1, None);
        cache.insert("b", (), 1, None);
        let _ = cache.get(&"a");
        let order: Vec<_> = cache.keys_by_recency().copied().collect();
        assert_eq!(order, vec!["b", "a"]);
    }
}
