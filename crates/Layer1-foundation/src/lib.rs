//! # fragkit-foundation
//!
//! Foundation layer for fragkit:
//! - Cache: content addressing and the byte-bounded eviction store
//! - Event: bounded, replayable event log
//! - Config: KitConfig (cache, state, events, bridge)
//! - Storage: JsonStore for config files and state snapshots
//! - Telemetry: tracing subscriber setup
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  fragkit-core (RenderCache, StateStore, Bridge)         │
//! │                     │                                   │
//! │          ┌──────────┴──────────┐                        │
//! │          ▼                     ▼                        │
//! │   cache::EvictionStore   event::EventLog                │
//! │   cache::address                                        │
//! │          │                                              │
//! │          ▼                                              │
//! │   config::KitConfig ── storage::JsonStore               │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod event;
pub mod storage;
pub mod telemetry;

// ============================================================================
// Error
// ============================================================================
pub use error::{BoxError, Error, Result};

// ============================================================================
// Cache
// ============================================================================
pub use cache::{
    fingerprint, fingerprint_file, fingerprint_params, CacheConfig, ContentDigest, EvictionStore,
    EvictionStoreStats, Fingerprint, ParamValue, Params, PutOutcome,
};

// ============================================================================
// Config
// ============================================================================
pub use config::{BridgeConfig, ConflictStrategy, EventLogConfig, KitConfig, StateConfig};

// ============================================================================
// Event / Storage
// ============================================================================
pub use event::{Event, EventDirection, EventId, EventLog, EventQuery, Payload};
pub use storage::JsonStore;
