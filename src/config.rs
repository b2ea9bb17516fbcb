//! gitstate configuration
//!
//! Two layers:
//! - [`CacheConfig`]: the runtime policy the coordinator reads on every
//!   refresh, patched at runtime with [`CacheConfigPatch`]
//! - [`ConfigFile`]: the on-disk TOML form, at
//!   - Linux: ~/.config/gitstate/config.toml
//!   - macOS: ~/Library/Application Support/gitstate/config.toml
//!   - Windows: %APPDATA%\gitstate\config.toml

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GitStateError, Result};
use crate::state::{Ttl, TtlPatch, TtlPolicy};
use crate::sync::events::OperationKind;
use crate::sync::git_poller::PollerConfig;
use crate::sync::watcher::WatcherConfig;

/// Operations that also invalidate the detailed layer by default
pub const DEFAULT_DETAILED_INVALIDATING_OPS: [OperationKind; 9] = [
    OperationKind::Commit,
    OperationKind::Merge,
    OperationKind::Rebase,
    OperationKind::CherryPick,
    OperationKind::BranchCreate,
    OperationKind::BranchDelete,
    OperationKind::Checkout,
    OperationKind::Pull,
    OperationKind::External,
];

/// Runtime cache policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: TtlPolicy,
    /// Length of the coalescing window
    pub debounce: Duration,
    pub detailed_invalidating_ops: Vec<OperationKind>,
    /// Commits kept in the detailed layer
    pub recent_commit_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: TtlPolicy::default(),
            debounce: Duration::from_millis(100),
            detailed_invalidating_ops: DEFAULT_DETAILED_INVALIDATING_OPS.to_vec(),
            recent_commit_limit: 50,
        }
    }
}

impl CacheConfig {
    pub fn invalidates_detailed(&self, operation: OperationKind) -> bool {
        self.detailed_invalidating_ops.contains(&operation)
    }

    /// Apply a partial override. Cached timestamps are untouched.
    pub fn apply(&mut self, patch: CacheConfigPatch) {
        self.ttl.apply(patch.ttl);
        if let Some(debounce) = patch.debounce {
            self.debounce = debounce;
        }
        if let Some(ops) = patch.detailed_invalidating_ops {
            self.detailed_invalidating_ops = ops;
        }
        if let Some(limit) = patch.recent_commit_limit {
            self.recent_commit_limit = limit;
        }
    }
}

/// Partial `CacheConfig`; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheConfigPatch {
    pub ttl: TtlPatch,
    pub debounce: Option<Duration>,
    pub detailed_invalidating_ops: Option<Vec<OperationKind>>,
    pub recent_commit_limit: Option<usize>,
}

impl CacheConfigPatch {
    pub fn ttl(mut self, ttl: TtlPatch) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.debounce = Some(debounce);
        self
    }
}

// ============================================================================
// On-disk configuration
// ============================================================================

/// Contents of `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub poller: PollerSection,

    #[serde(default)]
    pub watcher: WatcherSection,
}

/// `[cache]`; TTLs in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    /// Absent means never expires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_ttl_ms: Option<u64>,

    #[serde(default = "default_status_ttl_ms")]
    pub status_ttl_ms: u64,

    #[serde(default = "default_detailed_ttl_ms")]
    pub detailed_ttl_ms: u64,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_detailed_invalidating_ops")]
    pub detailed_invalidating_ops: Vec<OperationKind>,

    #[serde(default = "default_recent_commit_limit")]
    pub recent_commit_limit: usize,
}

fn default_status_ttl_ms() -> u64 {
    30_000
}

fn default_detailed_ttl_ms() -> u64 {
    60_000
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_detailed_invalidating_ops() -> Vec<OperationKind> {
    DEFAULT_DETAILED_INVALIDATING_OPS.to_vec()
}

fn default_recent_commit_limit() -> usize {
    50
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            basic_ttl_ms: None,
            status_ttl_ms: default_status_ttl_ms(),
            detailed_ttl_ms: default_detailed_ttl_ms(),
            debounce_ms: default_debounce_ms(),
            detailed_invalidating_ops: default_detailed_invalidating_ops(),
            recent_commit_limit: default_recent_commit_limit(),
        }
    }
}

impl From<&CacheSection> for CacheConfig {
    fn from(section: &CacheSection) -> Self {
        Self {
            ttl: TtlPolicy {
                basic: Ttl::from_millis(section.basic_ttl_ms),
                status: Ttl::After(Duration::from_millis(section.status_ttl_ms)),
                detailed: Ttl::After(Duration::from_millis(section.detailed_ttl_ms)),
            },
            debounce: Duration::from_millis(section.debounce_ms),
            detailed_invalidating_ops: section.detailed_invalidating_ops.clone(),
            recent_commit_limit: section.recent_commit_limit,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default tracing directive (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// `[poller]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

impl Default for PollerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl From<&PollerSection> for PollerConfig {
    fn from(section: &PollerSection) -> Self {
        Self {
            interval: Duration::from_millis(section.interval_ms.max(1)),
        }
    }
}

/// `[watcher]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_watch_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_watch_debounce_ms() -> u64 {
    200
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_watch_debounce_ms(),
        }
    }
}

impl From<&WatcherSection> for WatcherConfig {
    fn from(section: &WatcherSection) -> Self {
        Self {
            debounce_duration: Duration::from_millis(section.debounce_ms),
        }
    }
}

impl ConfigFile {
    /// `<config dir>/gitstate/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gitstate").join("config.toml"))
    }

    /// Load from the default path; missing file means defaults
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific path; missing file means defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| GitStateError::ConfigError {
            message: format!("Failed to parse config: {}", e),
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| GitStateError::ConfigError {
            message: format!("Failed to serialize config: {}", e),
        })?;

        // Write then rename so readers never see a partial file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }

    pub fn poller_config(&self) -> Option<PollerConfig> {
        self.poller.enabled.then(|| PollerConfig::from(&self.poller))
    }

    pub fn watcher_config(&self) -> Option<WatcherConfig> {
        self.watcher.enabled.then(|| WatcherConfig::from(&self.watcher))
    }
}
