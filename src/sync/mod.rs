//! Refresh coordination and everything that triggers it
//!
//! - `machine`: per-key Idle/Pending/Executing transitions
//! - `coordinator`: debounce, coalescing and per-key mutual exclusion
//! - `subscriptions`: layer-filtered listeners
//! - `visibility`: which keys are in view
//! - `events`: event bus and JSON Lines emitter
//! - `bridge`: turns bus events into invalidations and refreshes
//! - `git_poller`, `watcher`: publish events for changes made outside the app

pub mod bridge;
pub mod coordinator;
pub mod events;
pub mod git_poller;
pub mod machine;
pub mod subscriptions;
pub mod visibility;
pub mod watcher;

pub use bridge::BridgeHandle;
pub use coordinator::RefreshCoordinator;
pub use events::{EventBus, EventEmitter, OperationKind, RepoEvent};
pub use git_poller::{GitPoller, PollerConfig, PollerHandle};
pub use machine::RefreshOptions;
pub use subscriptions::{StateCallback, Subscription, SubscriptionRegistry};
pub use visibility::VisibilityTracker;
pub use watcher::{RepoWatcher, WatcherConfig, WatcherHandle};
