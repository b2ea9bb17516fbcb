//! Commit history

use std::path::Path;

use serde::Serialize;

use super::git_command;
use crate::error::Result;

/// Information about a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    /// Commit SHA (full)
    pub sha: String,
    /// Short SHA (7 chars)
    pub short_sha: String,
    /// Commit message (first line)
    pub subject: String,
    /// Author name
    pub author: String,
    /// Author date (ISO format)
    pub date: String,
}

// Format: SHA|short|author|date|subject (subject last, it may contain '|')
const LOG_FORMAT: &str = "--format=%H|%h|%an|%aI|%s";

/// Get the most recent commits reachable from HEAD, newest first
///
/// A repository without commits yields an empty list rather than an error.
pub fn get_recent_commits(limit: usize, cwd: Option<&Path>) -> Result<Vec<CommitInfo>> {
    if get_head_sha(cwd).is_err() {
        return Ok(Vec::new());
    }

    let output = git_command(&["log", "-n", &limit.to_string(), LOG_FORMAT], cwd)?;
    Ok(parse_log_output(&output))
}

/// Parse `git log` output produced with the crate's log format
pub fn parse_log_output(output: &str) -> Vec<CommitInfo> {
    let mut commits = Vec::new();
    for line in output.lines() {
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.splitn(5, '|').collect();
        if parts.len() < 5 {
            continue;
        }

        commits.push(CommitInfo {
            sha: parts[0].to_string(),
            short_sha: parts[1].to_string(),
            author: parts[2].to_string(),
            date: parts[3].to_string(),
            subject: parts[4].to_string(),
        });
    }

    commits
}

/// Get current HEAD SHA
pub fn get_head_sha(cwd: Option<&Path>) -> Result<String> {
    git_command(&["rev-parse", "--verify", "HEAD"], cwd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_output() {
        let output = "abc123def456|abc123d|Test Author|2024-01-01T12:00:00Z|Fix a | b\n\
                      \n\
                      def456|def456a|Other|2023-12-31T08:00:00Z|Initial commit\n\
                      broken line\n";

        let commits = parse_log_output(output);
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].short_sha, "abc123d");
        assert_eq!(commits[0].subject, "Fix a | b");
        assert_eq!(commits[1].author, "Other");
    }
}
