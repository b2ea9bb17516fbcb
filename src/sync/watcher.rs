//! Working-tree watcher
//!
//! Uses `notify` with the mini debouncer to watch a repository root and
//! publish `working_tree_changed` events on the bus.
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────┐     ┌────────┐
//! │   notify    │────>│  debouncer  │────>│  filter  │────>│  bus   │
//! │   watcher   │     │  (200ms)    │     │          │     │        │
//! └─────────────┘     └─────────────┘     └──────────┘     └────────┘
//! ```
//!
//! Inside `.git` only the index is interesting (staging changes status);
//! object, log and ref churn is dropped.

use std::path::{Component, Path};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

use crate::error::{GitStateError, Result};
use crate::state::ResourceKey;

use super::events::{EventBus, RepoEvent};

/// Configuration for the working-tree watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Debounce duration (default: 200ms)
    pub debounce_duration: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            debounce_duration: Duration::from_millis(200),
        }
    }
}

const IGNORED_DIRS: [&str; 8] = [
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
];

/// Watches one repository root
pub struct RepoWatcher {
    key: ResourceKey,
    config: WatcherConfig,
}

impl RepoWatcher {
    pub fn new(key: ResourceKey) -> Self {
        Self::with_config(key, WatcherConfig::default())
    }

    pub fn with_config(key: ResourceKey, config: WatcherConfig) -> Self {
        Self { key, config }
    }

    /// Start watching. Events are processed on a dedicated thread.
    pub fn start(&self, bus: EventBus) -> Result<WatcherHandle> {
        let repo_root = self.key.as_path().to_path_buf();
        let key = self.key.clone();
        let running = Arc::new(AtomicBool::new(true));

        let (tx, rx) = std::sync::mpsc::channel();
        let mut debouncer =
            new_debouncer(self.config.debounce_duration, tx).map_err(|e| {
                GitStateError::WatcherError {
                    message: e.to_string(),
                }
            })?;
        debouncer
            .watcher()
            .watch(&repo_root, RecursiveMode::Recursive)
            .map_err(|e| GitStateError::WatcherError {
                message: format!("cannot watch {}: {}", repo_root.display(), e),
            })?;

        tracing::info!("[WATCHER] watching {}", repo_root.display());

        let thread_running = Arc::clone(&running);
        std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(Ok(events)) => {
                        let paths: Vec<String> = events
                            .into_iter()
                            .filter(|event| matches!(event.kind, DebouncedEventKind::Any))
                            .filter_map(|event| relevant_path(&event.path, &repo_root))
                            .collect();

                        if paths.is_empty() {
                            continue;
                        }
                        tracing::debug!("[WATCHER] {} changed: {:?}", key, paths);
                        bus.publish(RepoEvent::working_tree_changed(key.clone(), paths));
                    }
                    Ok(Err(e)) => {
                        tracing::error!("[WATCHER] watch error on {}: {:?}", key, e);
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }

            // Keep debouncer alive until thread exits
            drop(debouncer);
            tracing::debug!("[WATCHER] stopped watching {}", key);
        });

        Ok(WatcherHandle { running })
    }
}

/// Repo-relative path of a change worth reporting, `None` if ignored
pub fn relevant_path(path: &Path, repo_root: &Path) -> Option<String> {
    let relative = path.strip_prefix(repo_root).unwrap_or(path);
    let components: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    match components.first().map(String::as_str) {
        None => return None,
        Some(".git") => {
            return (components.len() == 2 && components[1] == "index")
                .then(|| ".git/index".to_string());
        }
        Some(_) => {}
    }

    if components
        .iter()
        .any(|c| IGNORED_DIRS.contains(&c.as_str()))
    {
        return None;
    }

    Some(components.join("/"))
}

/// Handle for controlling a running watcher
pub struct WatcherHandle {
    running: Arc<AtomicBool>,
}

impl WatcherHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
