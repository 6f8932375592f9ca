//! # fragkit Render Cache Primitives
//!
//! Content-addressed, byte-bounded storage for rendered component fragments.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  (component, params, files)                                   │
//! │            │                                                  │
//! │            ▼                                                  │
//! │  ┌──────────────────┐   fingerprint   ┌────────────────────┐ │
//! │  │ address          │ ──────────────▶ │ EvictionStore      │ │
//! │  │ normalize → SHA  │                 │  LRU (byte budget) │ │
//! │  │ file digests     │                 │  component index   │ │
//! │  └──────────────────┘                 └────────────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fragkit_foundation::cache::{fingerprint, CacheConfig, EvictionStore, Params};
//!
//! let store = EvictionStore::new(CacheConfig::default())?;
//! let key = fingerprint("button", &params, &[template_path])?;
//!
//! if store.get(&key).is_none() {
//!     store.put(key, rendered_html, "button", None);
//! }
//!
//! // A template changed on disk
//! store.invalidate_component("button");
//! ```
//!
//! ## Modules
//!
//! - [`address`] - Canonical parameter normalization and fingerprints
//! - [`config`] - Cache configuration
//! - [`store`] - Thread-safe bounded store with component index
//! - [`util`] - LRU core

pub mod address;
pub mod config;
pub mod store;
pub mod util;

pub use address::{
    canonical_json, combine, fingerprint, fingerprint_file, fingerprint_params, normalize,
    ContentDigest, Fingerprint, ParamValue, Params,
};
pub use config::CacheConfig;
pub use store::{CacheEntry, EvictionStore, EvictionStoreStats, PutOutcome};
pub use util::{LruCache, LruCacheConfig};
