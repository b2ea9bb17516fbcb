//! Per-layer time-to-live policy
//!
//! | Layer    | Default  | Meaning                                        |
//! |----------|----------|------------------------------------------------|
//! | basic    | infinite | refetched only after explicit invalidation     |
//! | status   | 30s      | working tree lists go stale quickly            |
//! | detailed | 60s      | branch list and history change less often      |
//!
//! A layer that was never fetched is always expired.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::layer::Layer;
use super::snapshot::RepoSnapshot;

/// Lifetime of a cached layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ttl {
    /// Never expires once fetched
    Infinite,
    /// Expires once this much time has elapsed since the fetch
    After(Duration),
}

impl Ttl {
    pub fn from_millis(ms: Option<u64>) -> Self {
        match ms {
            Some(ms) => Ttl::After(Duration::from_millis(ms)),
            None => Ttl::Infinite,
        }
    }

    pub fn as_millis(&self) -> Option<u64> {
        match self {
            Ttl::Infinite => None,
            Ttl::After(d) => Some(d.as_millis() as u64),
        }
    }
}

/// TTL per layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub basic: Ttl,
    pub status: Ttl,
    pub detailed: Ttl,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            basic: Ttl::Infinite,
            status: Ttl::After(Duration::from_secs(30)),
            detailed: Ttl::After(Duration::from_secs(60)),
        }
    }
}

/// Partial override of a `TtlPolicy`; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtlPatch {
    pub basic: Option<Ttl>,
    pub status: Option<Ttl>,
    pub detailed: Option<Ttl>,
}

impl TtlPolicy {
    pub fn ttl(&self, layer: Layer) -> Ttl {
        match layer {
            Layer::Basic => self.basic,
            Layer::Status => self.status,
            Layer::Detailed => self.detailed,
        }
    }

    /// Whether `layer` of `snapshot` needs a refetch at `now`
    pub fn is_expired(&self, snapshot: &RepoSnapshot, layer: Layer, now: Instant) -> bool {
        let Some(fetched_at) = snapshot.last_refresh.get(layer) else {
            return true;
        };
        match self.ttl(layer) {
            Ttl::Infinite => false,
            Ttl::After(ttl) => now.saturating_duration_since(fetched_at) >= ttl,
        }
    }

    /// Apply a partial override. Existing timestamps are not touched, so the
    /// new TTLs only take effect on the next expiry check.
    pub fn apply(&mut self, patch: TtlPatch) {
        if let Some(ttl) = patch.basic {
            self.basic = ttl;
        }
        if let Some(ttl) = patch.status {
            self.status = ttl;
        }
        if let Some(ttl) = patch.detailed {
            self.detailed = ttl;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::key::ResourceKey;

    fn snapshot_fetched_at(at: Instant) -> RepoSnapshot {
        let mut snapshot = RepoSnapshot::empty(ResourceKey::new("/repo"));
        for layer in Layer::ALL {
            snapshot.last_refresh.set(layer, Some(at));
        }
        snapshot
    }

    #[test]
    fn test_never_fetched_is_expired() {
        let policy = TtlPolicy::default();
        let snapshot = RepoSnapshot::empty(ResourceKey::new("/repo"));
        let now = Instant::now();
        for layer in Layer::ALL {
            assert!(policy.is_expired(&snapshot, layer, now));
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = TtlPolicy::default();
        let start = Instant::now();
        let snapshot = snapshot_fetched_at(start);

        let t10 = start + Duration::from_secs(10);
        assert!(!policy.is_expired(&snapshot, Layer::Status, t10));
        assert!(!policy.is_expired(&snapshot, Layer::Detailed, t10));

        let t31 = start + Duration::from_secs(31);
        assert!(policy.is_expired(&snapshot, Layer::Status, t31));
        assert!(!policy.is_expired(&snapshot, Layer::Detailed, t31));

        let much_later = start + Duration::from_secs(60 * 60 * 24);
        assert!(!policy.is_expired(&snapshot, Layer::Basic, much_later));
        assert!(policy.is_expired(&snapshot, Layer::Detailed, much_later));
    }

    #[test]
    fn test_apply_patch() {
        let mut policy = TtlPolicy::default();
        policy.apply(TtlPatch {
            basic: Some(Ttl::After(Duration::from_secs(5))),
            ..Default::default()
        });
        assert_eq!(policy.basic, Ttl::After(Duration::from_secs(5)));
        assert_eq!(policy.status, Ttl::After(Duration::from_secs(30)));
    }

    #[test]
    fn test_ttl_millis_conversion() {
        assert_eq!(Ttl::from_millis(None), Ttl::Infinite);
        assert_eq!(Ttl::from_millis(Some(1500)).as_millis(), Some(1500));
    }
}
