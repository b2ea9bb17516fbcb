//! Git-backed fetcher and HEAD poller against real temporary repositories
//!
//! These run the `git` binary and use the real clock.

mod common;

use common::TestRepo;
use gitstate::sync::git_poller::HeadState;
use gitstate::sync::GitPoller;
use gitstate::{
    CacheConfig, CacheConfigPatch, EventBus, GitCliFetcher, Layer, LayerSet, OperationKind,
    RefreshOptions, RepoEvent, RepoFetcher, RepoStateManager,
};

mod fetcher {
    use super::*;

    #[tokio::test]
    async fn test_status_of_clean_repository() {
        let repo = TestRepo::with_initial_commit();
        let fetched = GitCliFetcher::default()
            .fetch_basic_and_status(&repo.key())
            .await
            .unwrap();

        assert!(fetched.is_repository);
        assert_eq!(fetched.current_branch.as_deref(), Some("main"));
        assert_eq!((fetched.ahead, fetched.behind), (0, 0));
        assert!(!fetched.status().has_changes());
    }

    #[tokio::test]
    async fn test_status_lists_each_kind() {
        let repo = TestRepo::with_initial_commit();
        repo.add_file("README.md", "# changed\n");
        repo.add_file("staged.txt", "staged\n");
        repo.stage("staged.txt");
        repo.add_file("notes/new.txt", "new\n");

        let fetched = GitCliFetcher::default()
            .fetch_basic_and_status(&repo.key())
            .await
            .unwrap();

        assert_eq!(fetched.staged, vec!["staged.txt"]);
        assert_eq!(fetched.unstaged, vec!["README.md"]);
        assert_eq!(fetched.untracked, vec!["notes/new.txt"]);
        assert!(fetched.conflicts.is_empty());
    }

    #[tokio::test]
    async fn test_detailed_lists_branches_and_commits() {
        let repo = TestRepo::with_initial_commit();
        repo.add_file("two.txt", "2\n");
        repo.commit("Second commit");
        repo.checkout_new_branch("feature");

        let detailed = GitCliFetcher::new(1)
            .fetch_detailed(&repo.key())
            .await
            .unwrap();

        let names: Vec<_> = detailed.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["feature", "main"]);
        assert!(detailed.branches[0].is_current);
        assert_eq!(detailed.commits.len(), 1);
        assert_eq!(detailed.commits[0].subject, "Second commit");
    }

    #[tokio::test]
    async fn test_plain_directory_is_not_a_repository() {
        let dir = TestRepo::new();
        let fetched = GitCliFetcher::default()
            .fetch_basic_and_status(&dir.key())
            .await
            .unwrap();
        assert!(!fetched.is_repository);
        assert!(fetched.current_branch.is_none());
    }
}

mod manager {
    use super::*;

    #[tokio::test]
    async fn test_git_manager_end_to_end() {
        let repo = TestRepo::with_initial_commit();
        repo.add_file("a.txt", "a\n");
        let key = repo.key();
        let manager = RepoStateManager::git(CacheConfig::default());

        manager
            .refresh(&key, RefreshOptions::new(LayerSet::ALL))
            .await
            .unwrap();
        let state = manager.get_state(&key).unwrap();
        assert!(state.is_repository());
        assert_eq!(state.current_branch(), Some("main"));
        assert_eq!(state.status.untracked, vec!["a.txt"]);
        assert_eq!(state.commits().len(), 1);

        repo.commit("Add a");
        manager
            .refresh(&key, RefreshOptions::new(LayerSet::ALL).force(true))
            .await
            .unwrap();
        let state = manager.get_state(&key).unwrap();
        assert!(!state.has_changes());
        assert_eq!(state.commits()[0].subject, "Add a");

        manager.dispose();
    }

    #[tokio::test]
    async fn test_commit_limit_patch_applies_to_later_fetches() {
        let repo = TestRepo::with_initial_commit();
        repo.add_file("two.txt", "2\n");
        repo.commit("Second commit");
        let key = repo.key();
        let manager = RepoStateManager::git(CacheConfig::default());

        manager
            .refresh(&key, RefreshOptions::new(Layer::Detailed))
            .await
            .unwrap();
        assert_eq!(manager.get_state(&key).unwrap().commits().len(), 2);

        manager
            .set_cache_config(CacheConfigPatch {
                recent_commit_limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        manager
            .refresh(&key, RefreshOptions::new(Layer::Detailed).force(true))
            .await
            .unwrap();
        let state = manager.get_state(&key).unwrap();
        assert_eq!(state.commits().len(), 1);
        assert_eq!(state.commits()[0].subject, "Second commit");

        manager.dispose();
    }

    #[tokio::test]
    async fn test_missing_path_is_an_empty_state() {
        let dir = TestRepo::new();
        let key = gitstate::ResourceKey::from_path(&dir.path().join("missing"));
        let manager = RepoStateManager::git(CacheConfig::default());

        manager
            .refresh(&key, RefreshOptions::new(Layer::Basic))
            .await
            .unwrap();
        let state = manager.get_state(&key).unwrap();
        assert!(!state.is_repository());
        assert!(state.error.is_none());
    }
}

mod poller {
    use super::*;

    #[test]
    fn test_head_state_read() {
        let repo = TestRepo::with_initial_commit();
        let head = HeadState::read(repo.key().as_path());
        assert_eq!(head.branch.as_deref(), Some("main"));
        assert_eq!(head.head_sha.as_deref().map(str::len), Some(40));

        let outside = HeadState::read(TestRepo::new().path());
        assert_eq!(outside, HeadState::default());
    }

    #[test]
    fn test_poll_detects_commit_and_checkout() {
        let repo = TestRepo::with_initial_commit();
        let key = repo.key();
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        let mut poller = GitPoller::new(vec![key.clone()]);

        poller.prime();
        assert!(poller.poll_once(&bus).is_empty());

        repo.add_file("b.txt", "b\n");
        repo.commit("Outside commit");
        assert_eq!(
            poller.poll_once(&bus),
            vec![(key.clone(), OperationKind::External)]
        );

        repo.checkout_new_branch("topic");
        assert_eq!(
            poller.poll_once(&bus),
            vec![(key.clone(), OperationKind::Checkout)]
        );

        let published: Vec<_> = std::iter::from_fn(|| events.try_recv().ok()).collect();
        assert_eq!(published.len(), 2);
        assert!(matches!(
            &published[0],
            RepoEvent::OperationCompleted { operation: OperationKind::External, .. }
        ));
    }

    #[test]
    fn test_first_poll_without_prime_is_silent() {
        let repo = TestRepo::with_initial_commit();
        let bus = EventBus::default();
        let mut poller = GitPoller::new(vec![repo.key()]);
        assert!(poller.poll_once(&bus).is_empty());
        assert_eq!(poller.keys(), &[repo.key()]);
    }
}
