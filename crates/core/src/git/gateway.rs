//! Capability interface over the version-control tool.
//!
//! The engine only ever talks to the repository through [`VcsGateway`], so
//! the orchestrator and resolver can be driven against a scripted fake in
//! tests and against [`super::GitCli`] in production.

use std::path::Path;

use crate::errors::GitError;
use crate::models::{BranchRef, WorkingTreeStatus};

/// Result of popping a stash entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashPop {
    /// Applied and dropped. `index_restored` is false when the plain
    /// fallback was used and staged paths must be re-staged by hand.
    Applied { index_restored: bool },
    /// Applied with conflicts; the entry is still in the stash list.
    Conflicted,
}

/// Classified result of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed,
    /// The remote has commits the local branch does not.
    NonFastForward(String),
    /// A `--force-with-lease` push whose expected remote value was stale.
    StaleLease(String),
}

/// Options for a single push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOptions {
    pub set_upstream: bool,
    pub force_with_lease: bool,
}

/// Position within an in-progress rebase (`current` of `total` commits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebaseProgress {
    pub current: usize,
    pub total: usize,
}

/// Atomic queries and commands against one repository.
///
/// All methods block until the underlying command finishes.
pub trait VcsGateway {
    /// Root of the working tree; conflicted paths are relative to it.
    fn root(&self) -> &Path;

    /// Current branch, or `fallback` when HEAD has no commits and no branch.
    /// A detached HEAD is [`GitError::DetachedHead`].
    fn current_branch(&self, fallback: &BranchRef) -> Result<BranchRef, GitError>;

    fn fetch(&self, remote: &str) -> Result<(), GitError>;

    /// Commits reachable from `a` and not `b`, and from `b` and not `a`.
    fn ahead_behind(&self, a: &str, b: &str) -> Result<(usize, usize), GitError>;

    /// Resolve a revision to its full commit id.
    fn rev_parse(&self, rev: &str) -> Result<String, GitError>;

    /// `None` when `rev` does not resolve.
    fn try_rev_parse(&self, rev: &str) -> Result<Option<String>, GitError>;

    /// Move `branch` from `expected_old` to `new`, failing if it moved meanwhile.
    fn update_branch(&self, branch: &BranchRef, new: &str, expected_old: &str)
        -> Result<(), GitError>;

    fn status(&self) -> Result<WorkingTreeStatus, GitError>;

    /// Paths currently staged, relative to the root.
    fn staged_files(&self) -> Result<Vec<String>, GitError>;

    /// Paths unmerged on both sides (`UU`, `AA` or `DD`): the ones with
    /// conflict markers to edit.
    fn conflicted_files(&self) -> Result<Vec<String>, GitError>;

    /// Every unmerged path. A superset of [`Self::conflicted_files`] that also
    /// holds modify/delete conflicts, which need a manual decision.
    fn unmerged_files(&self) -> Result<Vec<String>, GitError>;

    fn is_tracked(&self, path: &str) -> Result<bool, GitError>;

    fn add(&self, paths: &[String]) -> Result<(), GitError>;

    fn commit(&self, message: &str) -> Result<(), GitError>;

    /// Stash everything including untracked files. Returns the new stash
    /// commit id, or `None` when there was nothing to stash.
    fn stash_push(&self, message: &str) -> Result<Option<String>, GitError>;

    /// `stash@{n}` for a stash commit id, `None` if it is no longer listed.
    fn find_stash(&self, stash_commit: &str) -> Result<Option<String>, GitError>;

    /// Pop the stash entry whose commit id is `stash_commit`, trying an
    /// index-preserving pop first when `prefer_index` is set.
    fn stash_pop(&self, stash_commit: &str, prefer_index: bool) -> Result<StashPop, GitError>;

    fn rebase(&self, onto: &str) -> Result<(), GitError>;
    fn merge(&self, from: &str) -> Result<(), GitError>;
    fn rebase_abort(&self) -> Result<(), GitError>;
    fn merge_abort(&self) -> Result<(), GitError>;
    fn rebase_continue(&self) -> Result<(), GitError>;
    fn merge_continue(&self) -> Result<(), GitError>;

    /// `Some` while a rebase is stopped part-way.
    fn rebase_progress(&self) -> Result<Option<RebaseProgress>, GitError>;

    fn merge_in_progress(&self) -> Result<bool, GitError>;

    fn push(&self, remote: &str, branch: &BranchRef, options: PushOptions)
        -> Result<PushOutcome, GitError>;

    /// One-line summaries of commits in `to` and not in `from`.
    fn log_range(&self, from: &str, to: &str) -> Result<Vec<String>, GitError>;

    /// `git diff --stat` between two revisions.
    fn diff_stat(&self, from: &str, to: &str) -> Result<String, GitError>;
}
