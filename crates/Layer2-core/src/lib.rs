//! fragkit-core: render caching and state synchronization
//!
//! Layer2 - built on `fragkit-foundation`
//!
//! # Modules
//!
//! - `render`: RenderCache around an external template engine
//! - `sync`: StateStore (versions, history, rollback, conflicts)
//! - `bridge`: inbound/outbound messaging with rendered fragments
//! - `watch`: DependencyWatcher for hot reload
//!
//! # Example
//!
//! ```ignore
//! use fragkit_core::{Bridge, RenderCache, RenderRequest};
//! use fragkit_foundation::KitConfig;
//!
//! let config = KitConfig::load("fragkit.toml")?;
//! let cache = RenderCache::new(config.cache.clone())?;
//! let bridge = Bridge::from_config(&config)?;
//!
//! let request = RenderRequest::new("counter")
//!     .with_param("start", 0)
//!     .with_file("components/counter.html");
//! let html = cache.render(&request, |name, params| engine.render(name, params))?;
//! let page = bridge.inject_bridge(&html.text, "counter");
//!
//! bridge.register_callback("counter", "increment", |payload| {
//!     // ...
//!     Ok(())
//! });
//! ```

pub mod bridge;
pub mod render;
pub mod sync;
pub mod watch;

// Re-exports: Render
pub use render::{RenderCache, RenderRequest, Rendered};

// Re-exports: Sync
pub use sync::{
    apply_diff, diff, RemoteUpdate, RollbackTarget, StateDiff, StateExport, StateMap,
    StateSnapshot, StateSource, StateStore, SubscriptionId, SyncOutcome,
};

// Re-exports: Bridge
pub use bridge::{Bridge, InboundMessage, OriginPolicy, TargetOrigin, TransportInstruction};

// Re-exports: Watch
pub use watch::{ChangeKind, DependencyWatcher, FileChange, WatcherHandle};
