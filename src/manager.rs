//! `RepoStateManager`: the surface UI consumers talk to
//!
//! Owns the snapshot store, the refresh coordinator, the subscription
//! registry, the visibility tracker and the event bus. Cloning is cheap and
//! every clone drives the same state.
//!
//! ```ignore
//! let manager = RepoStateManager::git(CacheConfig::default());
//! let key = ResourceKey::new("/repo");
//! let _sub = manager.subscribe(&key, |next, _prev, changed| {
//!     println!("{} changed {:?}", next.key, changed);
//! }, SubscribeOptions::default())?;
//! manager.refresh(&key, RefreshOptions::default()).await?;
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{CacheConfig, CacheConfigPatch};
use crate::error::{GitStateError, RefreshError, Result};
use crate::fetcher::{GitCliFetcher, RepoFetcher};
use crate::state::{LayerSet, RepoSnapshot, ResourceKey, SnapshotStore};
use crate::sync::coordinator::RefreshCoordinator;
use crate::sync::events::EventBus;
use crate::sync::machine::RefreshOptions;
use crate::sync::subscriptions::{StateCallback, Subscription, SubscriptionRegistry};
use crate::sync::visibility::VisibilityTracker;

/// Options for [`RepoStateManager::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Only fire when one of these layers changed; `None` means any
    pub layers: Option<LayerSet>,
    /// Call back once right away with the current snapshot, if one exists
    pub notify_immediately: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        Self {
            layers: None,
            notify_immediately: true,
        }
    }
}

impl SubscribeOptions {
    pub fn layers(mut self, layers: impl Into<LayerSet>) -> Self {
        self.layers = Some(layers.into());
        self
    }

    pub fn notify_immediately(mut self, notify: bool) -> Self {
        self.notify_immediately = notify;
        self
    }
}

struct ManagerInner {
    store: Arc<SnapshotStore>,
    config: Arc<RwLock<CacheConfig>>,
    coordinator: Arc<RefreshCoordinator>,
    subscriptions: SubscriptionRegistry,
    visibility: VisibilityTracker,
    bus: EventBus,
    disposed: AtomicBool,
}

#[derive(Clone)]
pub struct RepoStateManager {
    inner: Arc<ManagerInner>,
}

impl RepoStateManager {
    /// Manager with the default cache policy
    pub fn new<F: RepoFetcher>(fetcher: F) -> Self {
        Self::with_config(fetcher, CacheConfig::default())
    }

    pub fn with_config<F: RepoFetcher>(fetcher: F, config: CacheConfig) -> Self {
        Self::from_shared(Arc::new(fetcher), Arc::new(RwLock::new(config)))
    }

    /// Manager backed by the `git` binary
    pub fn git(config: CacheConfig) -> Self {
        let config = Arc::new(RwLock::new(config));
        let fetcher = GitCliFetcher::with_shared_config(Arc::clone(&config));
        Self::from_shared(Arc::new(fetcher), config)
    }

    fn from_shared(fetcher: Arc<dyn RepoFetcher>, config: Arc<RwLock<CacheConfig>>) -> Self {
        let store = Arc::new(SnapshotStore::new());
        let subscriptions = SubscriptionRegistry::new();
        let bus = EventBus::default();
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::clone(&store),
            fetcher,
            Arc::clone(&config),
            subscriptions.clone(),
            bus.clone(),
        ));

        Self {
            inner: Arc::new(ManagerInner {
                store,
                config,
                coordinator,
                subscriptions,
                visibility: VisibilityTracker::new(),
                bus,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(GitStateError::Disposed);
        }
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Last known snapshot, `None` if the key was never initialized
    pub fn get_state(&self, key: &ResourceKey) -> Option<Arc<RepoSnapshot>> {
        if self.is_disposed() {
            return None;
        }
        self.inner.store.get(key)
    }

    /// Snapshot for `key`, inserting the empty one if absent
    pub fn get_or_create_state(&self, key: &ResourceKey) -> Result<Arc<RepoSnapshot>> {
        self.ensure_live()?;
        Ok(self.inner.store.get_or_create(key))
    }

    /// Request a refresh. The request is registered before this returns.
    ///
    /// The future resolves once the batch this request joined has finished;
    /// it is safe to drop it without awaiting.
    pub fn refresh(
        &self,
        key: &ResourceKey,
        options: RefreshOptions,
    ) -> impl Future<Output = std::result::Result<(), RefreshError>> + Send + 'static {
        self.inner.coordinator.refresh(key.clone(), options)
    }

    pub fn subscribe<F>(
        &self,
        key: &ResourceKey,
        callback: F,
        options: SubscribeOptions,
    ) -> Result<Subscription>
    where
        F: Fn(&RepoSnapshot, Option<&RepoSnapshot>, LayerSet) + Send + Sync + 'static,
    {
        self.ensure_live()?;
        let callback: StateCallback = Arc::new(callback);
        let subscription =
            self.inner
                .subscriptions
                .subscribe(key.clone(), options.layers, Arc::clone(&callback));

        if options.notify_immediately {
            if let Some(snapshot) = self.inner.store.get(key) {
                SubscriptionRegistry::invoke_once(&callback, &snapshot);
            }
        }
        Ok(subscription)
    }

    pub fn set_visibility(&self, key: &ResourceKey, visible: bool) -> Result<()> {
        self.ensure_live()?;
        self.inner.visibility.set_visibility(key, visible);
        Ok(())
    }

    pub fn is_visible(&self, key: &ResourceKey) -> bool {
        !self.is_disposed() && self.inner.visibility.is_visible(key)
    }

    pub fn visible_keys(&self) -> Vec<ResourceKey> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.inner.visibility.visible_keys()
    }

    /// Mark layers stale so the next refresh fetches them
    ///
    /// An empty set means every layer. Unknown keys are ignored.
    pub fn invalidate_cache(&self, key: &ResourceKey, layers: LayerSet) -> Result<()> {
        self.ensure_live()?;
        let layers = if layers.is_empty() { LayerSet::ALL } else { layers };
        let updated = self.inner.store.update_existing(key, |s| {
            for layer in layers.iter() {
                s.last_refresh.set(layer, None);
                s.invalidations.bump(layer);
            }
        });
        if updated.is_some() {
            tracing::debug!("[CACHE] {} invalidated {:?}", key, layers);
        }
        Ok(())
    }

    /// Override parts of the cache policy; applies to later expiry checks
    pub fn set_cache_config(&self, patch: CacheConfigPatch) -> Result<()> {
        self.ensure_live()?;
        let mut config = self.inner.config.write();
        config.apply(patch);
        tracing::debug!("[CACHE] config updated: {:?}", *config);
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.inner.config.read().clone()
    }

    /// Drop the cached snapshot for `key`. Returns whether one existed.
    pub fn evict(&self, key: &ResourceKey) -> Result<bool> {
        self.ensure_live()?;
        Ok(self.inner.store.remove(key).is_some())
    }

    /// Keys with a cached snapshot
    pub fn keys(&self) -> Vec<ResourceKey> {
        if self.is_disposed() {
            return Vec::new();
        }
        self.inner.store.keys()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// Reject pending refreshes and release every snapshot and listener
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.coordinator.dispose();
        self.inner.subscriptions.clear();
        self.inner.visibility.clear();
        self.inner.store.clear();
        tracing::debug!("[MANAGER] disposed");
    }
}

impl std::fmt::Debug for RepoStateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoStateManager")
            .field("keys", &self.inner.store.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
