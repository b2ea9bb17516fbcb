//! Temporary git repositories for fetcher and poller tests

use std::fs;
use std::path::Path;
use std::process::Command;

use gitstate::ResourceKey;
use tempfile::TempDir;

/// A git working tree in a temp dir, removed on drop
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create an empty directory (not yet a repository)
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Create a repository with one commit on `main`
    pub fn with_initial_commit() -> Self {
        let repo = Self::new();
        repo.init_git();
        repo.add_file("README.md", "# test\n");
        repo.commit("Initial commit");
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Key for the canonical path (temp dirs may sit behind symlinks)
    pub fn key(&self) -> ResourceKey {
        let path = fs::canonicalize(self.path()).expect("Failed to canonicalize");
        ResourceKey::from_path(&path)
    }

    pub fn add_file(&self, relative_path: &str, content: &str) -> &Self {
        let full_path = self.dir.path().join(relative_path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        fs::write(&full_path, content).expect("Failed to write file");
        self
    }

    /// Initialize as a git repository on `main`
    pub fn init_git(&self) -> &Self {
        self.git(&["init", "-q"]);
        self.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        self.git(&["config", "user.email", "test@test.com"]);
        self.git(&["config", "user.name", "Test"]);
        self.git(&["config", "commit.gpgsign", "false"]);
        self
    }

    pub fn stage(&self, relative_path: &str) -> &Self {
        self.git(&["add", relative_path]);
        self
    }

    /// Stage everything and commit
    pub fn commit(&self, message: &str) -> &Self {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self
    }

    pub fn checkout_new_branch(&self, name: &str) -> &Self {
        self.git(&["checkout", "-q", "-b", name]);
        self
    }

    /// Run git in the repository and return trimmed stdout
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}
