//! Domain events and the event bus
//!
//! The bus is a `tokio::sync::broadcast` channel of [`RepoEvent`]. It carries
//! both the signals the bridge reacts to (focus regained, operation
//! completed, working tree changed) and the `state_changed` notifications the
//! coordinator publishes for listeners that are not snapshot subscribers.
//!
//! # Event Format
//!
//! [`EventEmitter`] writes events as JSON Lines:
//! ```json
//! {"type":"state_changed","topic":"git:state-changed","key":"/repo","changed_layers":["status"],...}
//! ```

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::state::{LayerSet, ResourceKey};

const DEFAULT_CAPACITY: usize = 256;

/// Kind of mutating operation that just finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    Commit,
    Merge,
    Rebase,
    CherryPick,
    BranchCreate,
    BranchDelete,
    Checkout,
    Pull,
    Push,
    Fetch,
    Stage,
    Unstage,
    Discard,
    Stash,
    Reset,
    /// HEAD moved outside this process
    External,
    #[serde(other)]
    Unknown,
}

impl OperationKind {
    pub const ALL: [OperationKind; 17] = [
        OperationKind::Commit,
        OperationKind::Merge,
        OperationKind::Rebase,
        OperationKind::CherryPick,
        OperationKind::BranchCreate,
        OperationKind::BranchDelete,
        OperationKind::Checkout,
        OperationKind::Pull,
        OperationKind::Push,
        OperationKind::Fetch,
        OperationKind::Stage,
        OperationKind::Unstage,
        OperationKind::Discard,
        OperationKind::Stash,
        OperationKind::Reset,
        OperationKind::External,
        OperationKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Commit => "commit",
            OperationKind::Merge => "merge",
            OperationKind::Rebase => "rebase",
            OperationKind::CherryPick => "cherry-pick",
            OperationKind::BranchCreate => "branch-create",
            OperationKind::BranchDelete => "branch-delete",
            OperationKind::Checkout => "checkout",
            OperationKind::Pull => "pull",
            OperationKind::Push => "push",
            OperationKind::Fetch => "fetch",
            OperationKind::Stage => "stage",
            OperationKind::Unstage => "unstage",
            OperationKind::Discard => "discard",
            OperationKind::Stash => "stash",
            OperationKind::Reset => "reset",
            OperationKind::External => "external",
            OperationKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Unknown`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Ok(OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .unwrap_or(OperationKind::Unknown))
    }
}

/// Everything that travels over the bus
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepoEvent {
    /// A refresh changed at least one layer of `key`
    StateChanged {
        key: ResourceKey,
        changed_layers: LayerSet,
        reason: Option<String>,
        /// ISO 8601
        timestamp: String,
    },
    /// A mutating operation finished on `key`
    OperationCompleted {
        key: ResourceKey,
        operation: OperationKind,
        timestamp: String,
    },
    /// The host application regained focus
    FocusRegained { timestamp: String },
    /// Files under the working tree of `key` changed on disk
    WorkingTreeChanged {
        key: ResourceKey,
        paths: Vec<String>,
        timestamp: String,
    },
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

impl RepoEvent {
    pub fn state_changed(key: ResourceKey, changed_layers: LayerSet, reason: Option<String>) -> Self {
        RepoEvent::StateChanged {
            key,
            changed_layers,
            reason,
            timestamp: now_rfc3339(),
        }
    }

    pub fn operation_completed(key: ResourceKey, operation: OperationKind) -> Self {
        RepoEvent::OperationCompleted {
            key,
            operation,
            timestamp: now_rfc3339(),
        }
    }

    pub fn focus_regained() -> Self {
        RepoEvent::FocusRegained {
            timestamp: now_rfc3339(),
        }
    }

    pub fn working_tree_changed(key: ResourceKey, paths: Vec<String>) -> Self {
        RepoEvent::WorkingTreeChanged {
            key,
            paths,
            timestamp: now_rfc3339(),
        }
    }

    /// Topic name used when events leave the process
    pub fn topic(&self) -> &'static str {
        match self {
            RepoEvent::StateChanged { .. } => "git:state-changed",
            RepoEvent::OperationCompleted { .. } => "git:operation-completed",
            RepoEvent::FocusRegained { .. } => "window:focus-regained",
            RepoEvent::WorkingTreeChanged { .. } => "fs:working-tree-changed",
        }
    }

    /// Key the event is about, if any
    pub fn key(&self) -> Option<&ResourceKey> {
        match self {
            RepoEvent::StateChanged { key, .. }
            | RepoEvent::OperationCompleted { key, .. }
            | RepoEvent::WorkingTreeChanged { key, .. } => Some(key),
            RepoEvent::FocusRegained { .. } => None,
        }
    }
}

/// Publish/subscribe hub for [`RepoEvent`]
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<RepoEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many receivers saw it; zero is not an error.
    pub fn publish(&self, event: RepoEvent) -> usize {
        let topic = event.topic();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::trace!("[BUS] {} delivered to {} receivers", topic, receivers);
                receivers
            }
            Err(_) => {
                tracing::trace!("[BUS] {} dropped, no receivers", topic);
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepoEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Writes events to stdout as JSON Lines
pub struct EventEmitter {
    enabled: bool,
}

#[derive(Serialize)]
struct EventWrapper<'a> {
    topic: &'static str,
    #[serde(flatten)]
    event: &'a RepoEvent,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Serialize `event` as one line, `None` when disabled
    pub fn to_line(&self, event: &RepoEvent) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let wrapper = EventWrapper {
            topic: event.topic(),
            event,
        };
        serde_json::to_string(&wrapper).ok()
    }

    pub fn emit(&self, event: &RepoEvent) {
        let Some(line) = self.to_line(event) else {
            return;
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        // Reader may have gone away
        let _ = writeln!(handle, "{}", line);
        let _ = handle.flush();
    }
}
