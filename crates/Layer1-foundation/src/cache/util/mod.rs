//! Cache utilities
//!
//! - `LruCache`: byte-budgeted LRU core with per-entry TTL

mod lru;

pub use lru::{Insertion, Lookup, LruCache, LruCacheConfig};
