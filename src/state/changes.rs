//! Snapshot change detection
//!
//! Compares a pre-refresh snapshot with the post-refresh one and reports
//! which layers (and which fields inside them) differ. Bookkeeping fields
//! (`is_refreshing`, timestamps, `error`) are not layer data and never count
//! as a change.

use serde::Serialize;

use super::layer::{Layer, LayerSet};
use super::snapshot::RepoSnapshot;

/// Result of comparing two snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub changed_layers: LayerSet,
    /// Dotted field names, e.g. `status.staged`
    pub changed_fields: Vec<&'static str>,
}

impl ChangeSet {
    /// Every layer changed (first snapshot ever)
    pub fn everything() -> Self {
        Self {
            changed_layers: LayerSet::ALL,
            changed_fields: FIELDS.iter().map(|(_, name)| *name).collect(),
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_layers.is_empty()
    }

    fn record(&mut self, layer: Layer, field: &'static str) {
        self.changed_layers.insert(layer);
        self.changed_fields.push(field);
    }
}

const FIELDS: [(Layer, &str); 10] = [
    (Layer::Basic, "basic.is_repository"),
    (Layer::Basic, "basic.current_branch"),
    (Layer::Basic, "basic.ahead"),
    (Layer::Basic, "basic.behind"),
    (Layer::Status, "status.staged"),
    (Layer::Status, "status.unstaged"),
    (Layer::Status, "status.untracked"),
    (Layer::Status, "status.conflicts"),
    (Layer::Detailed, "detailed.branches"),
    (Layer::Detailed, "detailed.commits"),
];

/// Compare `prev` with `next`. `None` for `prev` means all layers changed.
pub fn compare(prev: Option<&RepoSnapshot>, next: &RepoSnapshot) -> ChangeSet {
    let Some(prev) = prev else {
        return ChangeSet::everything();
    };

    let mut changes = ChangeSet::default();

    let (a, b) = (&prev.basic, &next.basic);
    if a.is_repository != b.is_repository {
        changes.record(Layer::Basic, "basic.is_repository");
    }
    if a.current_branch != b.current_branch {
        changes.record(Layer::Basic, "basic.current_branch");
    }
    if a.ahead != b.ahead {
        changes.record(Layer::Basic, "basic.ahead");
    }
    if a.behind != b.behind {
        changes.record(Layer::Basic, "basic.behind");
    }

    let (a, b) = (&prev.status, &next.status);
    if a.staged != b.staged {
        changes.record(Layer::Status, "status.staged");
    }
    if a.unstaged != b.unstaged {
        changes.record(Layer::Status, "status.unstaged");
    }
    if a.untracked != b.untracked {
        changes.record(Layer::Status, "status.untracked");
    }
    if a.conflicts != b.conflicts {
        changes.record(Layer::Status, "status.conflicts");
    }

    match (&prev.detailed, &next.detailed) {
        (None, None) => {}
        (Some(a), Some(b)) => {
            if a.branches != b.branches {
                changes.record(Layer::Detailed, "detailed.branches");
            }
            if a.commits != b.commits {
                changes.record(Layer::Detailed, "detailed.commits");
            }
        }
        // Appearing or disappearing counts as both lists changing
        _ => {
            changes.record(Layer::Detailed, "detailed.branches");
            changes.record(Layer::Detailed, "detailed.commits");
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::BranchInfo;
    use crate::state::key::ResourceKey;
    use crate::state::snapshot::DetailedState;

    fn base() -> RepoSnapshot {
        let mut snapshot = RepoSnapshot::empty(ResourceKey::new("/repo"));
        snapshot.basic.is_repository = true;
        snapshot.basic.current_branch = Some("main".to_string());
        snapshot
    }

    #[test]
    fn test_first_snapshot_changes_everything() {
        let changes = compare(None, &base());
        assert!(changes.has_changes());
        assert_eq!(changes.changed_layers, LayerSet::ALL);
        assert_eq!(changes.changed_fields.len(), FIELDS.len());
    }

    #[test]
    fn test_identical_snapshots() {
        let prev = base();
        let mut next = base();
        next.is_refreshing = true;
        next.error = Some("ignored".to_string());
        let changes = compare(Some(&prev), &next);
        assert!(!changes.has_changes());
        assert!(changes.changed_fields.is_empty());
    }

    #[test]
    fn test_status_change_only() {
        let prev = base();
        let mut next = base();
        next.status.unstaged.push("a.txt".to_string());

        let changes = compare(Some(&prev), &next);
        assert_eq!(changes.changed_layers, LayerSet::single(Layer::Status));
        assert_eq!(changes.changed_fields, vec!["status.unstaged"]);
    }

    #[test]
    fn test_basic_fields() {
        let prev = base();
        let mut next = base();
        next.basic.current_branch = Some("feature".to_string());
        next.basic.behind = 2;

        let changes = compare(Some(&prev), &next);
        assert_eq!(changes.changed_layers, LayerSet::single(Layer::Basic));
        assert_eq!(
            changes.changed_fields,
            vec!["basic.current_branch", "basic.behind"]
        );
    }

    #[test]
    fn test_detailed_structural_equality() {
        let branch = BranchInfo {
            name: "main".to_string(),
            is_current: true,
            is_remote: false,
            upstream: None,
        };
        let mut prev = base();
        prev.detailed = Some(DetailedState {
            branches: vec![branch.clone()],
            commits: vec![],
        });

        // Structurally equal, separately allocated
        let mut next = base();
        next.detailed = Some(DetailedState {
            branches: vec![branch.clone()],
            commits: vec![],
        });
        assert!(!compare(Some(&prev), &next).has_changes());

        next.detailed.as_mut().unwrap().branches.push(BranchInfo {
            name: "feature".to_string(),
            ..branch
        });
        let changes = compare(Some(&prev), &next);
        assert_eq!(changes.changed_layers, LayerSet::single(Layer::Detailed));
        assert_eq!(changes.changed_fields, vec!["detailed.branches"]);
    }

    #[test]
    fn test_detailed_appearing() {
        let prev = base();
        let mut next = base();
        next.detailed = Some(DetailedState::default());
        let changes = compare(Some(&prev), &next);
        assert_eq!(changes.changed_layers, LayerSet::single(Layer::Detailed));
    }
}
