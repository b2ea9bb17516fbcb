//! Snapshot model: keys, layers, snapshots, TTLs and change detection
//!
//! Everything in this module is synchronous and free of I/O. The refresh
//! machinery in [`crate::sync`] drives it.

pub mod changes;
pub mod key;
pub mod layer;
pub mod snapshot;
pub mod ttl;

pub use changes::{compare, ChangeSet};
pub use key::ResourceKey;
pub use layer::{Layer, LayerSet};
pub use snapshot::{
    BasicState, DetailedState, InvalidationCounts, LayerTimestamps, RepoSnapshot, SnapshotStore,
    StatusState,
};
pub use ttl::{Ttl, TtlPatch, TtlPolicy};
