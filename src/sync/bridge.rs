//! External event bridge
//!
//! Listens on the event bus and turns lifecycle signals into targeted
//! invalidations and refreshes:
//!
//! - focus regained: silent, non-forced basic+status refresh of every
//!   visible key (still obeys TTLs)
//! - operation completed: invalidate basic+status, plus detailed when the
//!   operation is configured to affect it, then force-refresh those layers
//! - working tree changed: invalidate status, then a silent forced status
//!   refresh, queued behind any fetch that started before the change
//!
//! Refresh futures are spawned and only their failures are logged; the
//! outcome is visible on the snapshot and through subscribers.

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::manager::RepoStateManager;
use crate::state::{Layer, LayerSet, ResourceKey};

use super::events::{OperationKind, RepoEvent};
use super::machine::RefreshOptions;

/// Running bridge task; aborted on drop
#[derive(Debug)]
pub struct BridgeHandle {
    task: JoinHandle<()>,
}

impl BridgeHandle {
    pub fn stop(&self) {
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Subscribe to the manager's bus and react until stopped
///
/// Must be called from within a Tokio runtime.
pub fn start(manager: RepoStateManager) -> BridgeHandle {
    let mut events = manager.event_bus().subscribe();
    let task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if manager.is_disposed() {
                        break;
                    }
                    handle_event(&manager, &event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("[BRIDGE] lagged, {} events dropped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!("[BRIDGE] stopped");
    });
    BridgeHandle { task }
}

/// React to one event. Exposed so hosts without a bus task can drive it.
pub fn handle_event(manager: &RepoStateManager, event: &RepoEvent) {
    match event {
        RepoEvent::FocusRegained { .. } => on_focus_regained(manager),
        RepoEvent::OperationCompleted { key, operation, .. } => {
            on_operation_completed(manager, key, *operation)
        }
        RepoEvent::WorkingTreeChanged { key, paths, .. } => {
            on_working_tree_changed(manager, key, paths.len())
        }
        RepoEvent::StateChanged { .. } => {}
    }
}

fn on_focus_regained(manager: &RepoStateManager) {
    let keys = manager.visible_keys();
    tracing::debug!("[BRIDGE] focus regained, {} visible keys", keys.len());
    for key in keys {
        let options = RefreshOptions::new(LayerSet::BASIC_AND_STATUS)
            .silent(true)
            .reason("focus");
        spawn_refresh(manager, &key, options);
    }
}

/// Layers a completed operation makes stale
pub fn layers_invalidated_by(manager: &RepoStateManager, operation: OperationKind) -> LayerSet {
    let mut layers = LayerSet::BASIC_AND_STATUS;
    if manager.cache_config().invalidates_detailed(operation) {
        layers.insert(Layer::Detailed);
    }
    layers
}

fn on_operation_completed(manager: &RepoStateManager, key: &ResourceKey, operation: OperationKind) {
    let layers = layers_invalidated_by(manager, operation);
    tracing::info!("[BRIDGE] {} finished on {}, refreshing {:?}", operation, key, layers);

    if let Err(e) = manager.invalidate_cache(key, layers) {
        tracing::debug!("[BRIDGE] invalidate {} skipped: {}", key, e);
        return;
    }
    let options = RefreshOptions::new(layers)
        .force(true)
        .reason(format!("operation:{}", operation));
    spawn_refresh(manager, key, options);
}

fn on_working_tree_changed(manager: &RepoStateManager, key: &ResourceKey, path_count: usize) {
    tracing::debug!("[BRIDGE] {} paths changed under {}", path_count, key);
    if let Err(e) = manager.invalidate_cache(key, LayerSet::single(Layer::Status)) {
        tracing::debug!("[BRIDGE] invalidate {} skipped: {}", key, e);
        return;
    }
    let options = RefreshOptions::new(Layer::Status)
        .force(true)
        .silent(true)
        .reason("working-tree");
    spawn_refresh(manager, key, options);
}

fn spawn_refresh(manager: &RepoStateManager, key: &ResourceKey, options: RefreshOptions) {
    let Ok(runtime) = Handle::try_current() else {
        tracing::warn!("[BRIDGE] no runtime, refresh of {} dropped", key);
        return;
    };
    let refresh = manager.refresh(key, options);
    let key = key.clone();
    runtime.spawn(async move {
        if let Err(e) = refresh.await {
            tracing::warn!("[BRIDGE] refresh of {} failed: {}", key, e);
        }
    });
}
