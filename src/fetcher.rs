//! Fetcher adapter: the only place that actually queries a repository
//!
//! The coordinator never talks to git directly. It calls a [`RepoFetcher`]
//! once per layer group:
//!
//! - `basic` + `status` share one `git status` call
//! - `detailed` is a separate branch-list + history call
//!
//! No timeout or backoff is applied by the coordinator; an implementation
//! that wants either applies it inside these futures.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::RwLock;

use crate::config::CacheConfig;
use crate::error::{GitStateError, Result};
use crate::git;
use crate::state::{BasicState, DetailedState, ResourceKey, StatusState};

/// Result of the combined basic + status query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedStatus {
    pub is_repository: bool,
    pub current_branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicts: Vec<String>,
}

impl FetchedStatus {
    /// The key is not inside a working tree. A legitimate state, not an error.
    pub fn not_a_repository() -> Self {
        Self::default()
    }

    pub fn basic(&self) -> BasicState {
        BasicState {
            is_repository: self.is_repository,
            current_branch: self.current_branch.clone(),
            ahead: self.ahead,
            behind: self.behind,
        }
    }

    pub fn status(&self) -> StatusState {
        StatusState {
            staged: self.staged.clone(),
            unstaged: self.unstaged.clone(),
            untracked: self.untracked.clone(),
            conflicts: self.conflicts.clone(),
        }
    }
}

impl From<git::WorkingTreeStatus> for FetchedStatus {
    fn from(status: git::WorkingTreeStatus) -> Self {
        Self {
            is_repository: true,
            current_branch: status.branch,
            ahead: status.ahead,
            behind: status.behind,
            staged: status.staged,
            unstaged: status.unstaged,
            untracked: status.untracked,
            conflicts: status.conflicts,
        }
    }
}

/// Pluggable slow query, one method per layer group
pub trait RepoFetcher: Send + Sync + 'static {
    /// Fetch membership, branch, divergence and file lists together
    fn fetch_basic_and_status(&self, key: &ResourceKey) -> BoxFuture<'static, Result<FetchedStatus>>;

    /// Fetch branch list and recent history
    fn fetch_detailed(&self, key: &ResourceKey) -> BoxFuture<'static, Result<DetailedState>>;
}

impl<F: RepoFetcher + ?Sized> RepoFetcher for Arc<F> {
    fn fetch_basic_and_status(&self, key: &ResourceKey) -> BoxFuture<'static, Result<FetchedStatus>> {
        (**self).fetch_basic_and_status(key)
    }

    fn fetch_detailed(&self, key: &ResourceKey) -> BoxFuture<'static, Result<DetailedState>> {
        (**self).fetch_detailed(key)
    }
}

/// Fetcher backed by the `git` binary
///
/// Each call runs on Tokio's blocking pool so the coordinator's tasks never
/// block a runtime worker.
#[derive(Debug, Clone)]
pub struct GitCliFetcher {
    /// Number of commits returned in the detailed layer
    commit_limit: CommitLimit,
}

#[derive(Debug, Clone)]
enum CommitLimit {
    Fixed(usize),
    /// Read on every fetch, so runtime config patches apply
    Shared(Arc<RwLock<CacheConfig>>),
}

impl CommitLimit {
    fn get(&self) -> usize {
        match self {
            CommitLimit::Fixed(limit) => *limit,
            CommitLimit::Shared(config) => config.read().recent_commit_limit,
        }
    }
}

impl GitCliFetcher {
    pub fn new(commit_limit: usize) -> Self {
        Self {
            commit_limit: CommitLimit::Fixed(commit_limit),
        }
    }

    /// Take the commit limit from a live `CacheConfig`
    pub fn with_shared_config(config: Arc<RwLock<CacheConfig>>) -> Self {
        Self {
            commit_limit: CommitLimit::Shared(config),
        }
    }
}

impl Default for GitCliFetcher {
    fn default() -> Self {
        Self::new(50)
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| GitStateError::GitError {
            message: format!("git task failed: {}", e),
        })?
}

impl RepoFetcher for GitCliFetcher {
    fn fetch_basic_and_status(&self, key: &ResourceKey) -> BoxFuture<'static, Result<FetchedStatus>> {
        let root = key.as_path().to_path_buf();
        run_blocking(move || {
            if !root.is_dir() || !git::is_git_repo(Some(&root)) {
                tracing::debug!("{} is not a git working tree", root.display());
                return Ok(FetchedStatus::not_a_repository());
            }
            git::get_status(Some(&root)).map(FetchedStatus::from)
        })
        .boxed()
    }

    fn fetch_detailed(&self, key: &ResourceKey) -> BoxFuture<'static, Result<DetailedState>> {
        let root = key.as_path().to_path_buf();
        let limit = self.commit_limit.get();
        run_blocking(move || {
            if !root.is_dir() || !git::is_git_repo(Some(&root)) {
                return Ok(DetailedState::default());
            }
            Ok(DetailedState {
                branches: git::list_branches(Some(&root))?,
                commits: git::get_recent_commits(limit, Some(&root))?,
            })
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_status_split() {
        let fetched = FetchedStatus {
            is_repository: true,
            current_branch: Some("main".to_string()),
            ahead: 0,
            behind: 1,
            unstaged: vec!["a.txt".to_string()],
            ..Default::default()
        };

        let basic = fetched.basic();
        assert!(basic.is_repository);
        assert_eq!(basic.behind, 1);

        let status = fetched.status();
        assert!(status.has_changes());
        assert_eq!(status.unstaged, vec!["a.txt"]);
    }

    #[test]
    fn test_not_a_repository_is_empty() {
        let fetched = FetchedStatus::not_a_repository();
        assert!(!fetched.is_repository);
        assert!(!fetched.status().has_changes());
    }

    #[tokio::test]
    async fn test_git_fetcher_outside_repository() {
        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = GitCliFetcher::default();
        let key = ResourceKey::from_path(dir.path());

        let fetched = fetcher.fetch_basic_and_status(&key).await.unwrap();
        assert!(!fetched.is_repository);

        let detailed = fetcher.fetch_detailed(&key).await.unwrap();
        assert!(detailed.branches.is_empty());
    }

    #[test]
    fn test_shared_commit_limit_follows_config() {
        let config = Arc::new(RwLock::new(CacheConfig::default()));
        let fetcher = GitCliFetcher::with_shared_config(Arc::clone(&config));
        assert_eq!(fetcher.commit_limit.get(), 50);

        config.write().recent_commit_limit = 5;
        assert_eq!(fetcher.commit_limit.get(), 5);
        assert_eq!(GitCliFetcher::new(7).commit_limit.get(), 7);
    }
}
