//! Working tree status via `git status --porcelain=v2 --branch`
//!
//! Porcelain v2 record kinds handled here:
//!
//! | Prefix | Meaning                     |
//! |--------|-----------------------------|
//! | `#`    | branch header               |
//! | `1`    | ordinary changed entry      |
//! | `2`    | renamed or copied entry     |
//! | `u`    | unmerged (conflicted) entry |
//! | `?`    | untracked path              |
//! | `!`    | ignored path (skipped)      |

use std::path::Path;

use super::git_command_raw;
use crate::error::Result;

/// Parsed output of one `git status` call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingTreeStatus {
    /// `None` when HEAD is detached
    pub branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub staged: Vec<String>,
    pub unstaged: Vec<String>,
    pub untracked: Vec<String>,
    pub conflicts: Vec<String>,
}

/// Run `git status` in `cwd` and parse it
pub fn get_status(cwd: Option<&Path>) -> Result<WorkingTreeStatus> {
    let output = git_command_raw(
        &[
            "status",
            "--porcelain=v2",
            "--branch",
            "--untracked-files=all",
        ],
        cwd,
    )?;
    Ok(parse_porcelain_v2(&output))
}

/// Parse porcelain v2 output
pub fn parse_porcelain_v2(output: &str) -> WorkingTreeStatus {
    let mut status = WorkingTreeStatus::default();

    for line in output.lines() {
        if let Some(header) = line.strip_prefix("# ") {
            parse_header(header, &mut status);
        } else if let Some(entry) = line.strip_prefix("1 ") {
            // XY sub mH mI mW hH hI path
            let fields: Vec<&str> = entry.splitn(8, ' ').collect();
            if fields.len() == 8 {
                record_xy(fields[0], fields[7], &mut status);
            }
        } else if let Some(entry) = line.strip_prefix("2 ") {
            // XY sub mH mI mW hH hI Xscore path<TAB>origPath
            let fields: Vec<&str> = entry.splitn(9, ' ').collect();
            if fields.len() == 9 {
                let path = fields[8].split('\t').next().unwrap_or(fields[8]);
                record_xy(fields[0], path, &mut status);
            }
        } else if let Some(entry) = line.strip_prefix("u ") {
            // XY sub m1 m2 m3 mW h1 h2 h3 path
            let fields: Vec<&str> = entry.splitn(10, ' ').collect();
            if fields.len() == 10 {
                status.conflicts.push(fields[9].to_string());
            }
        } else if let Some(path) = line.strip_prefix("? ") {
            status.untracked.push(path.to_string());
        }
    }

    status
}

fn parse_header(header: &str, status: &mut WorkingTreeStatus) {
    if let Some(head) = header.strip_prefix("branch.head ") {
        status.branch = match head {
            "(detached)" => None,
            name => Some(name.to_string()),
        };
    } else if let Some(ab) = header.strip_prefix("branch.ab ") {
        for part in ab.split_whitespace() {
            if let Some(n) = part.strip_prefix('+') {
                status.ahead = n.parse().unwrap_or(0);
            } else if let Some(n) = part.strip_prefix('-') {
                status.behind = n.parse().unwrap_or(0);
            }
        }
    }
}

fn record_xy(xy: &str, path: &str, status: &mut WorkingTreeStatus) {
    let mut chars = xy.chars();
    let index = chars.next().unwrap_or('.');
    let worktree = chars.next().unwrap_or('.');

    if index != '.' {
        status.staged.push(path.to_string());
    }
    if worktree != '.' {
        status.unstaged.push(path.to_string());
    }
}
