//! State synchronization between the host and rendered fragments
//!
//! - `snapshot` - versioned state records
//! - `diff` - added / modified / removed keys between two states
//! - `conflict` - detection and the five resolution strategies
//! - `store` - StateStore (history, rollback, subscribers, export/import)

pub mod conflict;
pub mod diff;
pub mod snapshot;
pub mod store;

pub use conflict::{
    merge_local_wins, resolve, ConflictResolver, RemoteUpdate, Resolution, SyncOutcome,
};
pub use diff::{apply_diff, diff, StateDiff, ValueChange};
pub use fragkit_foundation::ConflictStrategy;
pub use snapshot::{state_from_json, StateMap, StateSnapshot, StateSource};
pub use store::{
    RollbackTarget, StateExport, StateStore, SubscriberFailure, Subscriber, SubscriptionId,
};
