//! Branch detection and listing

use std::path::Path;

use serde::Serialize;

use super::{git_command, git_command_optional};
use crate::error::Result;

/// One local or remote-tracking branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    /// Short name (`main`, `origin/main`)
    pub name: String,
    /// Whether this is the checked-out branch
    pub is_current: bool,
    /// Whether this is a remote-tracking branch
    pub is_remote: bool,
    /// Upstream short name, if configured
    pub upstream: Option<String>,
}

/// Check if the directory is inside a git working tree
pub fn is_git_repo(cwd: Option<&Path>) -> bool {
    git_command_optional(&["rev-parse", "--is-inside-work-tree"], cwd)
        .map(|s| s == "true")
        .unwrap_or(false)
}

/// Get the current branch name
pub fn get_current_branch(cwd: Option<&Path>) -> Result<String> {
    git_command(&["rev-parse", "--abbrev-ref", "HEAD"], cwd)
}

/// List local branches followed by remote-tracking branches
pub fn list_branches(cwd: Option<&Path>) -> Result<Vec<BranchInfo>> {
    // Format: fullref|HEAD marker|upstream
    let output = git_command(
        &[
            "for-each-ref",
            "--format=%(refname)|%(HEAD)|%(upstream:short)",
            "refs/heads",
            "refs/remotes",
        ],
        cwd,
    )?;

    Ok(parse_branch_output(&output))
}

fn parse_branch_output(output: &str) -> Vec<BranchInfo> {
    let mut branches = Vec::new();

    for line in output.lines() {
        let parts: Vec<&str> = line.splitn(3, '|').collect();
        if parts.len() < 3 {
            continue;
        }

        let (name, is_remote) = if let Some(local) = parts[0].strip_prefix("refs/heads/") {
            (local, false)
        } else if let Some(remote) = parts[0].strip_prefix("refs/remotes/") {
            // Symbolic origin/HEAD is not a branch
            if remote.ends_with("/HEAD") {
                continue;
            }
            (remote, true)
        } else {
            continue;
        };

        branches.push(BranchInfo {
            name: name.to_string(),
            is_current: parts[1] == "*",
            is_remote,
            upstream: Some(parts[2].to_string()).filter(|u| !u.is_empty()),
        });
    }

    branches
}
