//! Shared test utilities
//!
//! - `mock_fetcher`: scripted `RepoFetcher` with call counters
//! - `test_repo`: temporary git repositories driven through the `git` binary

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod mock_fetcher;
pub mod test_repo;

pub use mock_fetcher::MockFetcher;
pub use test_repo::TestRepo;
