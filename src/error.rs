//! Error types and exit codes for gitstate

use std::process::ExitCode;
use thiserror::Error;

/// Main error type for gitstate operations
#[derive(Error, Debug)]
pub enum GitStateError {
    #[error("Git error: {message}")]
    GitError { message: String },

    #[error("Not a git repository")]
    NotGitRepo,

    #[error("Config error: {message}")]
    ConfigError { message: String },

    #[error("Watcher error: {message}")]
    WatcherError { message: String },

    #[error("Repository state manager has been disposed")]
    Disposed,

    #[error("No Tokio runtime is available to schedule the refresh")]
    NoRuntime,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GitStateError {
    /// Convert error to an exit code for the binary:
    /// - 1: IO error
    /// - 2: Config error
    /// - 3: Watcher error
    /// - 4: Manager misuse (disposed / no runtime)
    /// - 5: Git error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::ConfigError { .. } => ExitCode::from(2),
            Self::WatcherError { .. } => ExitCode::from(3),
            Self::Disposed | Self::NoRuntime => ExitCode::from(4),
            Self::GitError { .. } | Self::NotGitRepo => ExitCode::from(5),
        }
    }
}

/// Result type alias for gitstate operations
pub type Result<T> = std::result::Result<T, GitStateError>;

/// Outcome delivered to every caller that contributed to one refresh batch.
///
/// `Clone` because a single fetch fans out to many waiters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("Refresh of {key} failed: {message}")]
    Fetch { key: String, message: String },

    #[error("Repository state manager has been disposed")]
    Disposed,

    #[error("No Tokio runtime is available to schedule the refresh")]
    NoRuntime,
}

impl From<RefreshError> for GitStateError {
    fn from(err: RefreshError) -> Self {
        match err {
            RefreshError::Fetch { message, .. } => GitStateError::GitError { message },
            RefreshError::Disposed => GitStateError::Disposed,
            RefreshError::NoRuntime => GitStateError::NoRuntime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_error_converts() {
        let err: GitStateError = RefreshError::Fetch {
            key: "/repo".to_string(),
            message: "boom".to_string(),
        }
        .into();
        assert!(matches!(err, GitStateError::GitError { ref message } if message == "boom"));

        let err: GitStateError = RefreshError::Disposed.into();
        assert!(matches!(err, GitStateError::Disposed));
    }

    #[test]
    fn test_refresh_error_display() {
        let err = RefreshError::Fetch {
            key: "/repo".to_string(),
            message: "git status failed".to_string(),
        };
        assert_eq!(err.to_string(), "Refresh of /repo failed: git status failed");
    }
}
