//! HEAD polling for changes made outside this process
//!
//! A background task reads each watched key's HEAD SHA and branch on an
//! interval and publishes an `operation_completed` event when they move:
//!
//! - branch changed: `checkout`
//! - same branch, different SHA: `external` (commit, reset, pull done elsewhere)
//!
//! The bridge turns those into the usual invalidate + forced refresh.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::state::ResourceKey;

use super::events::{EventBus, OperationKind, RepoEvent};

/// Configuration for HEAD polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Poll interval (default: 1s)
    pub interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// HEAD as last observed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadState {
    pub head_sha: Option<String>,
    pub branch: Option<String>,
}

impl HeadState {
    /// Read HEAD of the repository at `root`; empty outside a repository
    pub fn read(root: &Path) -> Self {
        if !root.is_dir() || !crate::git::is_git_repo(Some(root)) {
            return Self::default();
        }
        Self {
            head_sha: crate::git::get_head_sha(Some(root)).ok(),
            branch: crate::git::get_current_branch(Some(root)).ok(),
        }
    }

    /// Which operation explains the move from `previous` to `self`, if any
    pub fn detect(&self, previous: &HeadState) -> Option<OperationKind> {
        if self.branch != previous.branch {
            Some(OperationKind::Checkout)
        } else if self.head_sha != previous.head_sha {
            Some(OperationKind::External)
        } else {
            None
        }
    }
}

/// HEAD poller over a fixed set of keys
pub struct GitPoller {
    keys: Vec<ResourceKey>,
    config: PollerConfig,
    last_state: HashMap<ResourceKey, HeadState>,
}

impl GitPoller {
    pub fn new(keys: Vec<ResourceKey>) -> Self {
        Self::with_config(keys, PollerConfig::default())
    }

    pub fn with_config(keys: Vec<ResourceKey>, config: PollerConfig) -> Self {
        Self {
            keys,
            config,
            last_state: HashMap::new(),
        }
    }

    pub fn keys(&self) -> &[ResourceKey] {
        &self.keys
    }

    /// Record the current HEAD of every key without publishing anything
    pub fn prime(&mut self) {
        for key in &self.keys {
            self.last_state
                .insert(key.clone(), HeadState::read(key.as_path()));
        }
    }

    /// Poll every key once and publish detected moves. Blocking.
    pub fn poll_once(&mut self, bus: &EventBus) -> Vec<(ResourceKey, OperationKind)> {
        let mut detected = Vec::new();
        for key in &self.keys {
            let current = HeadState::read(key.as_path());
            let operation = self
                .last_state
                .get(key)
                .and_then(|previous| current.detect(previous));

            if let Some(operation) = operation {
                tracing::info!(
                    "[POLLER] {} HEAD moved ({}): {:?} -> {:?}",
                    key,
                    operation,
                    self.last_state.get(key).and_then(|s| s.head_sha.as_deref()),
                    current.head_sha
                );
                bus.publish(RepoEvent::operation_completed(key.clone(), operation));
                detected.push((key.clone(), operation));
            }
            self.last_state.insert(key.clone(), current);
        }
        detected
    }

    /// Spawn the polling task. Must be called from within a Tokio runtime.
    pub fn start(self, bus: EventBus) -> PollerHandle {
        let mut poller = self;
        let running = Arc::new(AtomicBool::new(true));
        let task_running = Arc::clone(&running);
        let interval = poller.config.interval;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            poller = match tokio::task::spawn_blocking(move || {
                poller.prime();
                poller
            })
            .await
            {
                Ok(primed) => primed,
                Err(e) => {
                    tracing::error!("[POLLER] failed to read initial HEAD: {}", e);
                    return;
                }
            };

            while task_running.load(Ordering::SeqCst) {
                ticker.tick().await;
                let bus = bus.clone();
                poller = match tokio::task::spawn_blocking(move || {
                    poller.poll_once(&bus);
                    poller
                })
                .await
                {
                    Ok(polled) => polled,
                    Err(e) => {
                        tracing::error!("[POLLER] poll failed: {}", e);
                        return;
                    }
                };
            }
        });

        PollerHandle { running, task }
    }
}

/// Handle for controlling a running poller
pub struct PollerHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(sha: &str, branch: &str) -> HeadState {
        HeadState {
            head_sha: Some(sha.to_string()),
            branch: Some(branch.to_string()),
        }
    }

    #[test]
    fn test_poller_config_default() {
        assert_eq!(PollerConfig::default().interval, Duration::from_secs(1));
    }

    #[test]
    fn test_head_move_detection() {
        let before = head("abc123", "main");

        assert_eq!(head("abc123", "main").detect(&before), None);
        assert_eq!(
            head("def456", "main").detect(&before),
            Some(OperationKind::External)
        );
        assert_eq!(
            head("abc123", "feature").detect(&before),
            Some(OperationKind::Checkout)
        );
        // First commit on an unborn branch
        let unborn = HeadState {
            head_sha: None,
            branch: Some("main".to_string()),
        };
        assert_eq!(
            head("abc123", "main").detect(&unborn),
            Some(OperationKind::External)
        );
    }

    #[test]
    fn test_poll_non_repository_is_quiet() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = EventBus::default();
        let mut poller = GitPoller::new(vec![ResourceKey::from_path(dir.path())]);
        poller.prime();
        assert!(poller.poll_once(&bus).is_empty());
    }
}
