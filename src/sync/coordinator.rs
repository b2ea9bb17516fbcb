//! Refresh coordinator
//!
//! Turns many `refresh(key, options)` calls into as few fetches as possible
//! while keeping each key's snapshot consistent.
//!
//! # Architecture
//!
//! ```text
//! refresh() ──> RefreshMachine (per key, under the slot lock)
//!                  │ OpenedWindow
//!                  v
//!              driver task ── sleep(debounce) ── on_timer_fired ── execute ──┐
//!                  ^                                                         │
//!                  └──────────── on_fetch_completed: reopened ───────────────┘
//! ```
//!
//! There is at most one driver task per key. It is the only place a key's
//! fetch runs, so two executions for one key never overlap, while different
//! keys proceed independently.
//!
//! # Execution
//!
//! 1. Select layers: all requested layers if forced, otherwise the expired ones
//! 2. Nothing to do: resolve every waiter with `Ok(())`
//! 3. Unless silent, mark the snapshot refreshing and clear its error
//! 4. Call the fetcher once per layer group, concurrently
//! 5. Swap in the merged snapshot, stamping only the fetched layers that were
//!    not invalidated while the fetch ran
//! 6. Diff against the pre-refresh snapshot, notify subscribers and publish
//!    `state_changed`
//! 7. Resolve or reject every waiter

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::RefreshError;
use crate::fetcher::RepoFetcher;
use crate::state::{compare, Layer, LayerSet, RepoSnapshot, ResourceKey, SnapshotStore};

use super::events::{EventBus, RepoEvent};
use super::machine::{ExecutionPlan, RefreshMachine, RefreshOptions, RequestOutcome};
use super::subscriptions::SubscriptionRegistry;

type Waiter = oneshot::Sender<Result<(), RefreshError>>;

#[derive(Default)]
struct KeySlot {
    machine: RefreshMachine<Waiter>,
    driver: Option<JoinHandle<()>>,
}

pub struct RefreshCoordinator {
    store: Arc<SnapshotStore>,
    fetcher: Arc<dyn RepoFetcher>,
    config: Arc<RwLock<CacheConfig>>,
    subscriptions: SubscriptionRegistry,
    bus: EventBus,
    slots: Mutex<HashMap<ResourceKey, KeySlot>>,
    disposed: AtomicBool,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<SnapshotStore>,
        fetcher: Arc<dyn RepoFetcher>,
        config: Arc<RwLock<CacheConfig>>,
        subscriptions: SubscriptionRegistry,
        bus: EventBus,
    ) -> Self {
        Self {
            store,
            fetcher,
            config,
            subscriptions,
            bus,
            slots: Mutex::new(HashMap::new()),
            disposed: AtomicBool::new(false),
        }
    }

    /// Register a refresh request and return the future of its batch outcome
    ///
    /// Registration happens before this returns, so requests issued back to
    /// back from synchronous code land in the same window. The returned
    /// future does not need to be polled for the refresh to happen.
    pub fn refresh(
        self: &Arc<Self>,
        key: ResourceKey,
        options: RefreshOptions,
    ) -> impl Future<Output = Result<(), RefreshError>> + Send + 'static {
        let registered = self.enqueue(key, options);
        async move {
            match registered {
                Ok(rx) => rx.await.unwrap_or(Err(RefreshError::Disposed)),
                Err(e) => Err(e),
            }
        }
    }

    fn enqueue(
        self: &Arc<Self>,
        key: ResourceKey,
        options: RefreshOptions,
    ) -> Result<oneshot::Receiver<Result<(), RefreshError>>, RefreshError> {
        if self.is_disposed() {
            return Err(RefreshError::Disposed);
        }
        let runtime = Handle::try_current().map_err(|_| RefreshError::NoRuntime)?;

        let (tx, rx) = oneshot::channel();
        let layers = options.layers;
        let mut slots = self.slots.lock();
        // dispose() may have won the race for the lock
        if self.is_disposed() {
            return Err(RefreshError::Disposed);
        }
        let slot = slots.entry(key.clone()).or_default();

        match slot.machine.on_request(options, tx) {
            RequestOutcome::OpenedWindow => {
                tracing::debug!("[REFRESH] {} window opened for {:?}", key, layers);
                let this = Arc::clone(self);
                slot.driver = Some(runtime.spawn(this.drive(key)));
            }
            RequestOutcome::MergedIntoWindow => {
                tracing::debug!("[REFRESH] {} merged {:?} into open window", key, layers);
            }
            RequestOutcome::JoinedInFlight => {
                tracing::debug!("[REFRESH] {} joined in-flight fetch for {:?}", key, layers);
            }
            RequestOutcome::QueuedBehindExecution => {
                tracing::debug!("[REFRESH] {} queued {:?} behind in-flight fetch", key, layers);
            }
        }
        Ok(rx)
    }

    /// Per-key driver loop; exits when the machine returns to idle
    async fn drive(self: Arc<Self>, key: ResourceKey) {
        loop {
            let debounce = self.config.read().debounce;
            tokio::time::sleep(debounce).await;

            let plan = {
                let mut slots = self.slots.lock();
                match slots.get_mut(&key).and_then(|slot| slot.machine.on_timer_fired()) {
                    Some(plan) => plan,
                    None => return,
                }
            };

            let outcome = self.execute(&key, &plan).await;

            let (waiters, reopened) = {
                let mut slots = self.slots.lock();
                let Some(slot) = slots.get_mut(&key) else {
                    return;
                };
                let completion = slot.machine.on_fetch_completed();
                if !completion.reopened {
                    slots.remove(&key);
                }
                (completion.waiters, completion.reopened)
            };

            for waiter in waiters {
                // Caller may have stopped waiting
                let _ = waiter.send(outcome.clone());
            }

            if !reopened {
                return;
            }
            tracing::debug!("[REFRESH] {} running queued refresh", key);
        }
    }

    async fn execute(&self, key: &ResourceKey, plan: &ExecutionPlan) -> Result<(), RefreshError> {
        let now = Instant::now();
        let policy = self.config.read().ttl;
        let current = self.store.get_or_create(key);

        let layers: LayerSet = if plan.force {
            plan.layers
        } else {
            plan.layers
                .iter()
                .filter(|layer| policy.is_expired(&current, *layer, now))
                .collect()
        };

        if layers.is_empty() {
            tracing::debug!("[REFRESH] {} {:?} still fresh, skipping fetch", key, plan.layers);
            return Ok(());
        }

        if !plan.silent {
            self.store.update(key, |s| {
                s.is_refreshing = true;
                s.refreshing_layers = layers;
                s.error = None;
            });
        }

        tracing::debug!(
            "[REFRESH] {} fetching {:?} (force={}, reason={:?})",
            key,
            layers,
            plan.force,
            plan.reason
        );

        let wants_status = layers.intersects(LayerSet::BASIC_AND_STATUS);
        let wants_detailed = layers.contains(Layer::Detailed);
        let status_fetch = async {
            if wants_status {
                Some(self.fetcher.fetch_basic_and_status(key).await)
            } else {
                None
            }
        };
        let detailed_fetch = async {
            if wants_detailed {
                Some(self.fetcher.fetch_detailed(key).await)
            } else {
                None
            }
        };
        let (status_result, detailed_result) = tokio::join!(status_fetch, detailed_fetch);

        let started = current.invalidations;
        let stamp = |s: &mut RepoSnapshot, layer: Layer| {
            // Invalidated mid-flight: keep the data but leave the layer expired
            if s.invalidations.get(layer) == started.get(layer) {
                s.last_refresh.set(layer, Some(now));
            } else {
                tracing::debug!("[REFRESH] {} {} invalidated during fetch", s.key, layer);
            }
            s.has_fetched = true;
        };

        let mut failures = Vec::new();
        let (_, next) = self.store.update(key, |s| {
            match status_result {
                Some(Ok(fetched)) => {
                    if layers.contains(Layer::Basic) {
                        s.basic = fetched.basic();
                        stamp(s, Layer::Basic);
                    }
                    if layers.contains(Layer::Status) {
                        s.status = fetched.status();
                        stamp(s, Layer::Status);
                    }
                }
                Some(Err(e)) => failures.push(e.to_string()),
                None => {}
            }
            match detailed_result {
                Some(Ok(detailed)) => {
                    s.detailed = Some(detailed);
                    stamp(s, Layer::Detailed);
                }
                Some(Err(e)) => failures.push(e.to_string()),
                None => {}
            }

            s.is_refreshing = false;
            s.refreshing_layers = LayerSet::EMPTY;
            s.error = if failures.is_empty() {
                None
            } else {
                Some(failures.join("; "))
            };
        });

        // Diff against the snapshot from before the refreshing mark.
        // First data ever for this key: report every layer.
        let first_fetch = !current.has_fetched && next.has_fetched;
        let prev = if first_fetch { None } else { Some(current.as_ref()) };
        let changes = compare(prev, &next);

        if changes.has_changes() {
            tracing::debug!("[REFRESH] {} changed: {:?}", key, changes.changed_fields);
            self.subscriptions
                .notify(key, &next, prev, changes.changed_layers);
            self.bus.publish(RepoEvent::state_changed(
                key.clone(),
                changes.changed_layers,
                plan.reason.clone(),
            ));
        }

        match next.error.as_ref() {
            None => Ok(()),
            Some(message) => {
                tracing::warn!("[REFRESH] {} fetch failed: {}", key, message);
                Err(RefreshError::Fetch {
                    key: key.to_string(),
                    message: message.clone(),
                })
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Abort every driver and reject every outstanding waiter
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained: Vec<_> = self.slots.lock().drain().collect();
        for (key, mut slot) in drained {
            if let Some(driver) = slot.driver.take() {
                driver.abort();
            }
            let waiters = slot.machine.drain();
            if !waiters.is_empty() {
                tracing::debug!("[REFRESH] {} rejecting {} waiters on dispose", key, waiters.len());
            }
            for waiter in waiters {
                let _ = waiter.send(Err(RefreshError::Disposed));
            }
        }
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}
