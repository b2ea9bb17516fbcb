//! Scripted fetcher
//!
//! Answers with whatever was set with `set_status` / `set_detailed` when the
//! call was made, after an optional delay on Tokio's clock, and counts every
//! call. Clones share state
//! so a test keeps one handle while the manager owns another.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use parking_lot::Mutex;

use gitstate::{
    BranchInfo, CommitInfo, DetailedState, FetchedStatus, GitStateError, RepoFetcher, ResourceKey,
    Result,
};

#[derive(Default)]
struct MockState {
    status: Mutex<FetchedStatus>,
    detailed: Mutex<DetailedState>,
    delay: Mutex<Duration>,
    fail_status: AtomicBool,
    fail_detailed: AtomicBool,
    status_calls: AtomicUsize,
    detailed_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    keys: Mutex<Vec<ResourceKey>>,
}

/// Decrements the in-flight counter when the fetch finishes
struct InFlight<'a>(&'a MockState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a MockState) -> Self {
        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(current, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Default)]
pub struct MockFetcher {
    state: Arc<MockState>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repository on `branch` with the given unstaged files
    pub fn repo(branch: &str, unstaged: &[&str]) -> Self {
        let fetcher = Self::new();
        fetcher.set_status(status(branch, unstaged));
        fetcher
    }

    pub fn set_status(&self, status: FetchedStatus) {
        *self.state.status.lock() = status;
    }

    pub fn set_detailed(&self, detailed: DetailedState) {
        *self.state.detailed.lock() = detailed;
    }

    /// Every fetch sleeps this long before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.state.delay.lock() = delay;
    }

    pub fn fail_status(&self, fail: bool) {
        self.state.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn fail_detailed(&self, fail: bool) {
        self.state.fail_detailed.store(fail, Ordering::SeqCst);
    }

    pub fn status_calls(&self) -> usize {
        self.state.status_calls.load(Ordering::SeqCst)
    }

    pub fn detailed_calls(&self) -> usize {
        self.state.detailed_calls.load(Ordering::SeqCst)
    }

    /// Fetches of either group currently running
    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of fetches ever running at once
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Keys passed to the fetcher, in call order
    pub fn fetched_keys(&self) -> Vec<ResourceKey> {
        self.state.keys.lock().clone()
    }
}

impl RepoFetcher for MockFetcher {
    fn fetch_basic_and_status(&self, key: &ResourceKey) -> BoxFuture<'static, Result<FetchedStatus>> {
        let state = Arc::clone(&self.state);
        state.keys.lock().push(key.clone());
        async move {
            state.status_calls.fetch_add(1, Ordering::SeqCst);
            let _guard = InFlight::enter(&state);
            let answer = if state.fail_status.load(Ordering::SeqCst) {
                Err(GitStateError::GitError {
                    message: "status unavailable".to_string(),
                })
            } else {
                Ok(state.status.lock().clone())
            };
            let delay = *state.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            answer
        }
        .boxed()
    }

    fn fetch_detailed(&self, _key: &ResourceKey) -> BoxFuture<'static, Result<DetailedState>> {
        let state = Arc::clone(&self.state);
        async move {
            state.detailed_calls.fetch_add(1, Ordering::SeqCst);
            let _guard = InFlight::enter(&state);
            let answer = if state.fail_detailed.load(Ordering::SeqCst) {
                Err(GitStateError::GitError {
                    message: "history unavailable".to_string(),
                })
            } else {
                Ok(state.detailed.lock().clone())
            };
            let delay = *state.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            answer
        }
        .boxed()
    }
}

pub fn status(branch: &str, unstaged: &[&str]) -> FetchedStatus {
    FetchedStatus {
        is_repository: true,
        current_branch: Some(branch.to_string()),
        unstaged: unstaged.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }
}

pub fn detailed(branches: &[&str]) -> DetailedState {
    DetailedState {
        branches: branches
            .iter()
            .enumerate()
            .map(|(i, name)| BranchInfo {
                name: name.to_string(),
                is_current: i == 0,
                is_remote: false,
                upstream: None,
            })
            .collect(),
        commits: vec![CommitInfo {
            sha: "a".repeat(40),
            short_sha: "aaaaaaa".to_string(),
            subject: "Initial commit".to_string(),
            author: "Test".to_string(),
            date: "2024-01-01T00:00:00Z".to_string(),
        }],
    }
}
