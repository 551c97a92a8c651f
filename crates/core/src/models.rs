//! Domain model types used throughout branchsync.
//!
//! All of these are value types created and consumed within a single
//! invocation; nothing here is persisted.

use std::sync::OnceLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

// ---------------------------------------------------------------------------
// Branch references
// ---------------------------------------------------------------------------

/// A validated local or remote-tracking branch name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BranchRef(String);

fn forbidden_ref_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x00-\x20\x7f~^:?*\[\\]").expect("static regex is valid"))
}

impl BranchRef {
    /// Validate `name` against git's ref-name rules.
    pub fn new(name: impl Into<String>) -> Result<Self, GitError> {
        let name = name.into();
        let reject = |reason: &str| GitError::InvalidRef {
            name: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(reject("must not be empty"));
        }
        if name == "@" {
            return Err(reject("'@' alone is reserved"));
        }
        if forbidden_ref_chars().is_match(&name) {
            return Err(reject("contains whitespace, control or special characters"));
        }
        if name.contains("..") || name.contains("@{") || name.contains("//") {
            return Err(reject("contains '..', '@{' or '//'"));
        }
        if name.starts_with('-') || name.starts_with('/') {
            return Err(reject("must not start with '-' or '/'"));
        }
        if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
            return Err(reject("must not end with '/', '.' or '.lock'"));
        }
        if name.split('/').any(|part| part.starts_with('.')) {
            return Err(reject("path components must not start with '.'"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The remote-tracking ref for this branch on `remote` (e.g. `origin/main`).
    pub fn on_remote(&self, remote: &str) -> String {
        format!("{}/{}", remote, self.0)
    }
}

impl std::fmt::Display for BranchRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BranchRef {
    type Error = GitError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BranchRef> for String {
    fn from(value: BranchRef) -> Self {
        value.0
    }
}

impl std::str::FromStr for BranchRef {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Working tree
// ---------------------------------------------------------------------------

/// Snapshot of the working tree, recomputed on demand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkingTreeStatus {
    pub has_staged: bool,
    pub has_unstaged: bool,
    pub has_untracked: bool,
}

impl WorkingTreeStatus {
    pub fn is_dirty(&self) -> bool {
        self.has_staged || self.has_unstaged || self.has_untracked
    }
}

/// What [`crate::guard::WorkingTreeGuard::capture`] set aside.
///
/// Consumed exactly once by `restore`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StashRecord {
    pub stashed: bool,
    /// Paths that were staged before stashing, in `git diff --cached` order.
    pub staged_file_paths: Vec<String>,
    /// Commit id of the stash entry, used to locate it again.
    pub stash_commit: Option<String>,
    pub message: String,
}

impl StashRecord {
    /// A record for a clean tree: nothing was stashed.
    pub fn clean() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Sync strategy & outcome
// ---------------------------------------------------------------------------

/// How the current branch is brought up to date with its base.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStrategy {
    #[default]
    Rebase,
    Merge,
}

impl std::fmt::Display for SyncStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rebase => write!(f, "rebase"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for SyncStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rebase" => Ok(Self::Rebase),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown strategy '{}': use 'rebase' or 'merge'", other)),
        }
    }
}

/// Terminal value of one sync attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub conflicted: bool,
    pub message: String,
    /// True when a stash created by this sync was left for a manual `git stash pop`.
    pub stash_pending: bool,
}

impl SyncOutcome {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            conflicted: false,
            message: message.into(),
            stash_pending: false,
        }
    }

    pub fn conflicted(message: impl Into<String>) -> Self {
        Self {
            success: false,
            conflicted: true,
            message: message.into(),
            stash_pending: false,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            conflicted: false,
            message: message.into(),
            stash_pending: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branch_ref_accepts_common_names() {
        for name in ["main", "feature/login", "release-1.2", "user/jdoe/fix_42"] {
            assert!(BranchRef::new(name).is_ok(), "{} should be valid", name);
        }
    }

    #[test]
    fn test_branch_ref_rejects_invalid_names() {
        for name in [
            "", "@", "has space", "a..b", "a@{1}", "-lead", "/lead", "trail/", "x.lock",
            "dot.", "a/.hidden", "star*", "col:on", "a//b", "tilde~1",
        ] {
            assert!(
                matches!(BranchRef::new(name), Err(GitError::InvalidRef { .. })),
                "{:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_branch_ref_on_remote() {
        let main = BranchRef::new("main").unwrap();
        assert_eq!(main.on_remote("origin"), "origin/main");
        assert_eq!(main.to_string(), "main");
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("rebase".parse::<SyncStrategy>().unwrap(), SyncStrategy::Rebase);
        assert_eq!("MERGE".parse::<SyncStrategy>().unwrap(), SyncStrategy::Merge);
        assert!("squash".parse::<SyncStrategy>().is_err());
    }

    #[test]
    fn test_working_tree_dirty() {
        assert!(!WorkingTreeStatus::default().is_dirty());
        let status = WorkingTreeStatus {
            has_untracked: true,
            ..Default::default()
        };
        assert!(status.is_dirty());
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome = SyncOutcome::conflicted("resolve manually");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["conflicted"], true);
        assert_eq!(json["stash_pending"], false);
    }
}
