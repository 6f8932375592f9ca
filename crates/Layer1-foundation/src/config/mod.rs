//! Config - configuration for caches, state, events and the bridge
//!
//! - `kit.rs` - KitConfig and its sections
//! - cache settings live with the cache (`crate::cache::CacheConfig`)

mod kit;

pub use crate::cache::CacheConfig;
pub use kit::{
    validate_origin, BridgeConfig, ConflictStrategy, EventLogConfig, KitConfig, StateConfig,
    KIT_CONFIG_FILE,
};
