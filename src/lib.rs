//! gitstate: layered, debounced git working-tree state for UI consumers
//!
//! Many views ask about the same repository at the same time: the branch
//! badge, the changes list, the history panel. This crate keeps one cached
//! snapshot per repository, split into independently aged layers, and turns
//! bursts of refresh requests into a single `git` invocation.
//!
//! # Layers
//!
//! | Layer      | Contents                                 | Default TTL |
//! |------------|------------------------------------------|-------------|
//! | `basic`    | repository flag, branch, ahead/behind    | infinite    |
//! | `status`   | staged, unstaged, untracked, conflicts   | 30s         |
//! | `detailed` | branch list, recent commits              | 60s         |
//!
//! # Example
//!
//! ```ignore
//! use gitstate::{CacheConfig, RefreshOptions, RepoStateManager, ResourceKey, SubscribeOptions};
//!
//! let manager = RepoStateManager::git(CacheConfig::default());
//! let key = ResourceKey::new("/path/to/repo");
//!
//! let _sub = manager.subscribe(&key, |next, _prev, changed| {
//!     println!("{:?} changed on {}", changed, next.key);
//! }, SubscribeOptions::default())?;
//!
//! manager.refresh(&key, RefreshOptions::default()).await?;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod git;
pub mod manager;
pub mod state;
pub mod sync;

pub use config::{CacheConfig, CacheConfigPatch, ConfigFile};
pub use error::{GitStateError, RefreshError, Result};
pub use fetcher::{FetchedStatus, GitCliFetcher, RepoFetcher};
pub use manager::{RepoStateManager, SubscribeOptions};
pub use state::{
    compare, BasicState, ChangeSet, DetailedState, Layer, LayerSet, RepoSnapshot, ResourceKey,
    StatusState, Ttl, TtlPatch, TtlPolicy,
};
pub use sync::{EventBus, EventEmitter, OperationKind, RefreshOptions, RepoEvent, Subscription};

// Re-export git module types
pub use git::{BranchInfo, CommitInfo};
