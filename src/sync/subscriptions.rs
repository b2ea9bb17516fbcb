//! Subscription registry
//!
//! Listeners register per key with an optional layer filter. After a refresh
//! that changed something, the coordinator calls [`SubscriptionRegistry::notify`]
//! and every active listener whose filter intersects the changed layers is
//! invoked with `(next, prev, changed_layers)`.
//!
//! Callbacks run on the notifying task, outside the registry lock, so a
//! callback may subscribe or unsubscribe freely. A panicking callback is
//! caught and logged and does not stop the others.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::state::{LayerSet, RepoSnapshot, ResourceKey};

/// `(next, prev, changed_layers)`; `prev` is `None` for the first snapshot
pub type StateCallback = Arc<dyn Fn(&RepoSnapshot, Option<&RepoSnapshot>, LayerSet) + Send + Sync>;

struct Entry {
    id: u64,
    /// `None` means every layer
    layers: Option<LayerSet>,
    active: AtomicBool,
    callback: StateCallback,
}

impl Entry {
    fn wants(&self, changed: LayerSet) -> bool {
        self.active.load(Ordering::Acquire)
            && self.layers.map_or(true, |filter| filter.intersects(changed))
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: RwLock<HashMap<ResourceKey, Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
}

/// Per-key listener lists
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` for `key`. Dropping the returned handle unsubscribes.
    pub fn subscribe(
        &self,
        key: ResourceKey,
        layers: Option<LayerSet>,
        callback: StateCallback,
    ) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            id,
            layers,
            active: AtomicBool::new(true),
            callback,
        });
        self.inner
            .entries
            .write()
            .entry(key.clone())
            .or_default()
            .push(entry);

        tracing::debug!("[SUBS] {} subscribed to {} ({:?})", id, key, layers);
        Subscription {
            id,
            key,
            registry: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    /// Invoke matching listeners; returns how many ran
    pub fn notify(
        &self,
        key: &ResourceKey,
        next: &RepoSnapshot,
        prev: Option<&RepoSnapshot>,
        changed: LayerSet,
    ) -> usize {
        if changed.is_empty() {
            return 0;
        }

        let targets: Vec<Arc<Entry>> = match self.inner.entries.read().get(key) {
            Some(entries) => entries.iter().filter(|e| e.wants(changed)).cloned().collect(),
            None => return 0,
        };

        let mut invoked = 0;
        for entry in targets {
            // Unsubscribed by an earlier callback in this round
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            invoked += 1;
            let callback = &entry.callback;
            if catch_unwind(AssertUnwindSafe(|| callback(next, prev, changed))).is_err() {
                tracing::error!("[SUBS] listener {} for {} panicked", entry.id, key);
            }
        }
        invoked
    }

    /// Call one listener directly, used for `notify_immediately`
    pub(crate) fn invoke_once(callback: &StateCallback, snapshot: &RepoSnapshot) {
        if catch_unwind(AssertUnwindSafe(|| callback(snapshot, None, LayerSet::ALL))).is_err() {
            tracing::error!("[SUBS] immediate listener for {} panicked", snapshot.key);
        }
    }

    pub fn subscriber_count(&self, key: &ResourceKey) -> usize {
        self.inner
            .entries
            .read()
            .get(key)
            .map_or(0, |entries| entries.len())
    }

    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.entries.write().drain().collect();
        for (_, entries) in drained {
            for entry in entries {
                entry.active.store(false, Ordering::Release);
            }
        }
    }
}

impl RegistryInner {
    fn unsubscribe(&self, key: &ResourceKey, id: u64) {
        let mut entries = self.entries.write();
        if let Some(list) = entries.get_mut(key) {
            if let Some(pos) = list.iter().position(|e| e.id == id) {
                let entry = list.remove(pos);
                entry.active.store(false, Ordering::Release);
            }
            if list.is_empty() {
                entries.remove(key);
            }
        }
    }
}

/// Handle returned by `subscribe`; unsubscribes on drop
pub struct Subscription {
    id: u64,
    key: ResourceKey,
    registry: Weak<RegistryInner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// Stop receiving notifications. Safe to call more than once.
    pub fn unsubscribe(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(&self.key, self.id);
            tracing::debug!("[SUBS] {} unsubscribed from {}", self.id, self.key);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("active", &self.active)
            .finish()
    }
}
