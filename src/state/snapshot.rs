//! Repository snapshots and the snapshot store
//!
//! A `RepoSnapshot` is the cached view of one working tree. Readers receive
//! an `Arc<RepoSnapshot>`; the store never mutates a published snapshot in
//! place. Updates clone the current value, modify the clone and swap it in
//! under the write lock, so a reader never observes a half-written layer.
//!
//! # Thread Safety
//!
//! - `parking_lot::RwLock` around the map: concurrent reads, exclusive swaps
//! - The lock is never held across an `.await` or a callback

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::time::Instant;

use crate::git::{BranchInfo, CommitInfo};

use super::key::ResourceKey;
use super::layer::{Layer, LayerSet};

/// Membership flag, active branch and upstream divergence
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BasicState {
    /// Whether the key is inside a git working tree
    pub is_repository: bool,
    /// Checked-out branch, `None` when detached or not a repository
    pub current_branch: Option<String>,
    /// Commits ahead of upstream
    pub ahead: u32,
    /// Commits behind upstream
    pub behind: u32,
}

/// Working tree file lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusState {
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicts: Vec<String>,
}

impl StatusState {
    /// Whether any list is non-empty
    pub fn has_changes(&self) -> bool {
        !(self.staged.is_empty()
            && self.unstaged.is_empty()
            && self.untracked.is_empty()
            && self.conflicts.is_empty())
    }
}

/// Branch list and recent history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DetailedState {
    pub branches: Vec<BranchInfo>,
    pub commits: Vec<CommitInfo>,
}

/// When each layer was last fetched, `None` meaning never
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerTimestamps {
    pub basic: Option<Instant>,
    pub status: Option<Instant>,
    pub detailed: Option<Instant>,
}

impl LayerTimestamps {
    pub fn get(&self, layer: Layer) -> Option<Instant> {
        match layer {
            Layer::Basic => self.basic,
            Layer::Status => self.status,
            Layer::Detailed => self.detailed,
        }
    }

    pub fn set(&mut self, layer: Layer, at: Option<Instant>) {
        match layer {
            Layer::Basic => self.basic = at,
            Layer::Status => self.status = at,
            Layer::Detailed => self.detailed = at,
        }
    }
}

/// How many times each layer was explicitly invalidated
///
/// A fetch compares these against the counts it started with and leaves a
/// layer expired if it was invalidated while the fetch was running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvalidationCounts {
    basic: u64,
    status: u64,
    detailed: u64,
}

impl InvalidationCounts {
    pub fn get(&self, layer: Layer) -> u64 {
        match layer {
            Layer::Basic => self.basic,
            Layer::Status => self.status,
            Layer::Detailed => self.detailed,
        }
    }

    pub fn bump(&mut self, layer: Layer) {
        let count = match layer {
            Layer::Basic => &mut self.basic,
            Layer::Status => &mut self.status,
            Layer::Detailed => &mut self.detailed,
        };
        *count = count.wrapping_add(1);
    }
}

/// Cached view of one working tree
#[derive(Debug, Clone, Serialize)]
pub struct RepoSnapshot {
    pub key: ResourceKey,
    pub basic: BasicState,
    pub status: StatusState,
    /// Absent until the first detailed fetch
    pub detailed: Option<DetailedState>,
    #[serde(skip)]
    pub last_refresh: LayerTimestamps,
    /// Whether any layer was ever filled by a fetch; invalidation keeps it
    #[serde(skip)]
    pub has_fetched: bool,
    #[serde(skip)]
    pub invalidations: InvalidationCounts,
    pub is_refreshing: bool,
    pub refreshing_layers: LayerSet,
    /// Message of the last failed fetch
    pub error: Option<String>,
}

impl RepoSnapshot {
    /// The "empty / unknown" snapshot inserted on first access
    pub fn empty(key: ResourceKey) -> Self {
        Self {
            key,
            basic: BasicState::default(),
            status: StatusState::default(),
            detailed: None,
            last_refresh: LayerTimestamps::default(),
            has_fetched: false,
            invalidations: InvalidationCounts::default(),
            is_refreshing: false,
            refreshing_layers: LayerSet::EMPTY,
            error: None,
        }
    }

    pub fn is_repository(&self) -> bool {
        self.basic.is_repository
    }

    pub fn current_branch(&self) -> Option<&str> {
        self.basic.current_branch.as_deref()
    }

    pub fn has_changes(&self) -> bool {
        self.status.has_changes()
    }

    pub fn branches(&self) -> &[BranchInfo] {
        self.detailed.as_ref().map(|d| d.branches.as_slice()).unwrap_or(&[])
    }

    pub fn commits(&self) -> &[CommitInfo] {
        self.detailed.as_ref().map(|d| d.commits.as_slice()).unwrap_or(&[])
    }
}

/// Owner of every cached snapshot
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<ResourceKey, Arc<RepoSnapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last known snapshot, or `None` if the key was never initialized
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<RepoSnapshot>> {
        self.snapshots.read().get(key).cloned()
    }

    /// Snapshot for `key`, inserting the empty snapshot if absent
    pub fn get_or_create(&self, key: &ResourceKey) -> Arc<RepoSnapshot> {
        if let Some(existing) = self.get(key) {
            return existing;
        }
        self.snapshots
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RepoSnapshot::empty(key.clone())))
            .clone()
    }

    /// Copy-modify-swap the snapshot for `key`
    ///
    /// Returns `(previous, next)`. Creates the empty snapshot first if absent.
    pub fn update<F>(&self, key: &ResourceKey, f: F) -> (Arc<RepoSnapshot>, Arc<RepoSnapshot>)
    where
        F: FnOnce(&mut RepoSnapshot),
    {
        let mut snapshots = self.snapshots.write();
        let previous = snapshots
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RepoSnapshot::empty(key.clone())))
            .clone();

        let mut next = RepoSnapshot::clone(&previous);
        f(&mut next);
        let next = Arc::new(next);
        snapshots.insert(key.clone(), Arc::clone(&next));

        (previous, next)
    }

    /// Modify an existing snapshot only; no-op for unknown keys
    pub fn update_existing<F>(&self, key: &ResourceKey, f: F) -> Option<Arc<RepoSnapshot>>
    where
        F: FnOnce(&mut RepoSnapshot),
    {
        let mut snapshots = self.snapshots.write();
        let current = snapshots.get(key)?;
        let mut next = RepoSnapshot::clone(current);
        f(&mut next);
        let next = Arc::new(next);
        snapshots.insert(key.clone(), Arc::clone(&next));
        Some(next)
    }

    pub fn remove(&self, key: &ResourceKey) -> Option<Arc<RepoSnapshot>> {
        self.snapshots.write().remove(key)
    }

    pub fn keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.snapshots.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }

    pub fn clear(&self) {
        self.snapshots.write().clear();
    }
}
