//! Error types for the branchsync core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    Push(#[from] PushError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from invoking the `git` CLI.
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The configured root is not inside a git work tree.
    #[error("not a git repository: '{0}'")]
    RepositoryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("`git {command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A branch name does not satisfy ref-name rules.
    #[error("invalid branch name '{name}': {reason}")]
    InvalidRef { name: String, reason: String },

    /// HEAD points at a commit rather than a branch.
    #[error("HEAD is detached; check out a branch first")]
    DetachedHead,

    /// A previously recorded stash entry is no longer in the stash list.
    #[error("stash entry {0} not found")]
    StashNotFound(String),

    /// Output from `git` could not be interpreted.
    #[error("unexpected git output for `{command}`: {output}")]
    UnexpectedOutput { command: String, output: String },

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GitError {
    /// The captured stderr for a failed command, empty for other variants.
    pub fn stderr(&self) -> &str {
        match self {
            Self::CommandFailed { stderr, .. } => stderr,
            _ => "",
        }
    }
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict resolution subsystem.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// A conflicted file could not be read or written.
    #[error("conflicted file '{path}': {source}")]
    FileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Enumerating or staging files through git failed.
    #[error("conflict resolution git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Sync errors
// ---------------------------------------------------------------------------

/// Errors from the sync orchestrator that are not conflicts.
///
/// Conflicts are an expected outcome and are reported through
/// [`crate::models::SyncOutcome`], never through this type.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Uncommitted work could not be set aside.
    #[error("failed to stash local changes: {0}")]
    StashFailed(String),

    /// Fetching the remote failed (network, missing remote).
    #[error("failed to fetch '{remote}': {detail}")]
    FetchFailed { remote: String, detail: String },

    /// The rebase or merge failed for a reason other than conflicts.
    #[error("{operation} onto '{target}' failed: {detail}")]
    ApplyFailed {
        operation: String,
        target: String,
        detail: String,
    },

    /// A rebase or merge was already in progress before the sync started.
    #[error("a {0} is already in progress; finish or abort it first")]
    OperationInProgress(String),

    /// An operator interrupt arrived while the sync was running.
    #[error("sync cancelled by operator")]
    Cancelled,

    /// More conflict rounds were seen than the rebase has commits.
    #[error("conflict resolution exceeded {0} rounds")]
    RoundLimitExceeded(usize),

    /// Underlying git error during sync.
    #[error("sync git error: {0}")]
    GitError(#[from] GitError),

    /// Underlying conflict resolution error during sync.
    #[error("sync conflict error: {0}")]
    ConflictError(#[from] ConflictError),
}

// ---------------------------------------------------------------------------
// Push errors
// ---------------------------------------------------------------------------

/// Errors from pushing and push recovery.
#[derive(Debug, Error)]
pub enum PushError {
    /// The push was rejected again after the single sync-and-retry cycle.
    #[error("push of '{branch}' rejected after retry: {detail}")]
    RetryExhausted { branch: String, detail: String },

    /// The operator declined to reconcile or force.
    #[error("push of '{branch}' aborted: {reason}")]
    Declined { branch: String, reason: String },

    /// The sync performed during recovery did not finish cleanly.
    #[error("sync before retrying push did not complete: {0}")]
    SyncIncomplete(String),

    /// Underlying sync error during recovery.
    #[error("push sync error: {0}")]
    SyncError(#[from] SyncError),

    /// Underlying git error during push.
    #[error("push git error: {0}")]
    GitError(#[from] GitError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = GitError::RepositoryNotFound("/tmp/repo".into());
        assert_eq!(err.to_string(), "not a git repository: '/tmp/repo'");

        let err = GitError::CommandFailed {
            command: "rebase origin/main".into(),
            exit_code: 1,
            stderr: "CONFLICT (content)".into(),
        };
        assert!(err.to_string().contains("git rebase origin/main"));
        assert_eq!(err.stderr(), "CONFLICT (content)");

        let err = PushError::RetryExhausted {
            branch: "feature".into(),
            detail: "non-fast-forward".into(),
        };
        assert!(err.to_string().contains("after retry"));

        let err = ConfigError::InvalidValue {
            field: "sync.remote".into(),
            detail: "must not be empty".into(),
        };
        assert!(err.to_string().contains("sync.remote"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let git_err = GitError::StashNotFound("abc".into());
        let core_err: CoreError = git_err.into();
        assert!(matches!(core_err, CoreError::Git(_)));

        let sync_err: SyncError = GitError::BinaryNotFound("git".into()).into();
        let core_err: CoreError = sync_err.into();
        assert!(matches!(core_err, CoreError::Sync(SyncError::GitError(_))));
    }
}
