//! Git subprocess helpers
//!
//! Everything here shells out to the `git` binary and blocks. Async callers
//! go through [`crate::fetcher::GitCliFetcher`], which moves these calls onto
//! the blocking thread pool.

mod branch;
mod commit;
mod status;

pub use branch::{get_current_branch, is_git_repo, list_branches, BranchInfo};
pub use commit::{get_head_sha, get_recent_commits, parse_log_output, CommitInfo};
pub use status::{get_status, parse_porcelain_v2, WorkingTreeStatus};

use std::path::Path;
use std::process::Command;

use crate::error::{GitStateError, Result};

/// Run a git command and return stdout as string
pub fn git_command(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    git_command_raw(args, cwd).map(|out| out.trim().to_string())
}

/// Run a git command and return stdout untouched
pub fn git_command_raw(args: &[&str], cwd: Option<&Path>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|e| GitStateError::GitError {
        message: format!("Failed to execute git: {}", e),
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GitStateError::GitError {
            message: format!("git {} failed: {}", args.join(" "), stderr.trim()),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a git command, returning None if it fails (for optional queries)
pub fn git_command_optional(args: &[&str], cwd: Option<&Path>) -> Option<String> {
    git_command(args, cwd).ok()
}
