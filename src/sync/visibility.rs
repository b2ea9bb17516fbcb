//! Which keys are currently in view
//!
//! Pure bookkeeping. The bridge reads it to decide which keys get an
//! opportunistic refresh when focus comes back.

use std::collections::HashSet;

use parking_lot::RwLock;

use crate::state::ResourceKey;

#[derive(Debug, Default)]
pub struct VisibilityTracker {
    visible: RwLock<HashSet<ResourceKey>>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the visibility actually changed
    pub fn set_visibility(&self, key: &ResourceKey, visible: bool) -> bool {
        let mut set = self.visible.write();
        let changed = if visible {
            set.insert(key.clone())
        } else {
            set.remove(key)
        };
        if changed {
            tracing::debug!("[VIS] {} visible={}", key, visible);
        }
        changed
    }

    pub fn is_visible(&self, key: &ResourceKey) -> bool {
        self.visible.read().contains(key)
    }

    /// Sorted for deterministic refresh order
    pub fn visible_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<_> = self.visible.read().iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.visible.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_toggle() {
        let tracker = VisibilityTracker::new();
        let a = ResourceKey::new("/a");
        let b = ResourceKey::new("/b");

        assert!(!tracker.is_visible(&a));
        assert!(tracker.set_visibility(&b, true));
        assert!(tracker.set_visibility(&a, true));
        assert!(!tracker.set_visibility(&a, true));
        assert_eq!(tracker.visible_keys(), vec![a.clone(), b.clone()]);

        assert!(tracker.set_visibility(&a, false));
        assert!(!tracker.set_visibility(&a, false));
        assert!(!tracker.is_visible(&a));
        assert_eq!(tracker.visible_keys(), vec![b]);
    }
}
