//! Setting uncommitted work aside around tree-mutating operations.
//!
//! [`WorkingTreeGuard::capture`] stashes a dirty tree and records which paths
//! were staged; [`WorkingTreeGuard::restore`] pops that exact stash entry and
//! puts the staged set back. Every capture is paired with one restore on
//! every exit path of the operation that triggered it.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::errors::GitError;
use crate::git::{StashPop, VcsGateway};
use crate::models::StashRecord;

/// Result of [`WorkingTreeGuard::restore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreOutcome {
    /// The capture found a clean tree; there was nothing to pop.
    NothingToRestore,
    Restored {
        /// True when the index-preserving pop succeeded.
        index_preserved: bool,
        /// Paths re-staged by hand after a plain pop.
        restaged: Vec<String>,
        /// Previously staged paths that no longer exist as tracked files.
        skipped: Vec<String>,
    },
    /// The pop applied with conflicts. The stash entry was kept.
    ConflictsRemain,
}

impl RestoreOutcome {
    pub fn success(&self) -> bool {
        !matches!(self, Self::ConflictsRemain)
    }

    pub fn conflicts_remain(&self) -> bool {
        matches!(self, Self::ConflictsRemain)
    }
}

/// Stash manager bound to one repository.
pub struct WorkingTreeGuard<'a, G: VcsGateway + ?Sized> {
    gateway: &'a G,
}

impl<'a, G: VcsGateway + ?Sized> WorkingTreeGuard<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// Stash staged, unstaged and untracked changes if there are any.
    ///
    /// A clean tree yields `StashRecord { stashed: false, .. }` without
    /// touching the repository.
    #[instrument(skip(self))]
    pub fn capture(&self) -> Result<StashRecord, GitError> {
        let status = self.gateway.status()?;
        if !status.is_dirty() {
            debug!("working tree clean, nothing to capture");
            return Ok(StashRecord::clean());
        }

        let staged = self.gateway.staged_files()?;
        let message = format!(
            "branchsync: auto-stash {} {}",
            Uuid::new_v4(),
            Utc::now().to_rfc3339()
        );

        match self.gateway.stash_push(&message)? {
            Some(commit) => {
                info!(staged = staged.len(), stash = %commit, "captured local changes");
                Ok(StashRecord {
                    stashed: true,
                    staged_file_paths: staged,
                    stash_commit: Some(commit),
                    message,
                })
            }
            None => {
                debug!("status was dirty but stash recorded nothing");
                Ok(StashRecord::clean())
            }
        }
    }

    /// Pop the stash recorded by `capture`, consuming the record.
    #[instrument(skip(self, record), fields(stashed = record.stashed))]
    pub fn restore(&self, record: StashRecord) -> Result<RestoreOutcome, GitError> {
        if !record.stashed {
            return Ok(RestoreOutcome::NothingToRestore);
        }
        let commit = record
            .stash_commit
            .as_deref()
            .ok_or_else(|| GitError::StashNotFound(record.message.clone()))?;

        match self.gateway.stash_pop(commit, true)? {
            StashPop::Applied {
                index_restored: true,
            } => {
                info!("restored local changes with index");
                Ok(RestoreOutcome::Restored {
                    index_preserved: true,
                    restaged: Vec::new(),
                    skipped: Vec::new(),
                })
            }
            StashPop::Applied {
                index_restored: false,
            } => {
                let (restaged, skipped) = self.restage(&record.staged_file_paths)?;
                info!(
                    restaged = restaged.len(),
                    skipped = skipped.len(),
                    "restored local changes, re-staged by hand"
                );
                Ok(RestoreOutcome::Restored {
                    index_preserved: false,
                    restaged,
                    skipped,
                })
            }
            StashPop::Conflicted => {
                warn!(stash = %commit, "restoring local changes produced conflicts");
                Ok(RestoreOutcome::ConflictsRemain)
            }
        }
    }

    /// Re-stage the paths that still exist and are tracked.
    fn restage(&self, paths: &[String]) -> Result<(Vec<String>, Vec<String>), GitError> {
        let mut restage = Vec::new();
        let mut skipped = Vec::new();
        for path in paths {
            let exists = self.gateway.root().join(path).exists();
            if exists && self.gateway.is_tracked(path)? {
                restage.push(path.clone());
            } else {
                debug!(path = %path, "previously staged path cannot be re-staged");
                skipped.push(path.clone());
            }
        }
        self.gateway.add(&restage)?;
        Ok((restage, skipped))
    }

    /// Exact commands an operator can run to get the stash back by hand.
    pub fn recovery_command(&self, record: &StashRecord) -> String {
        let entry = record
            .stash_commit
            .as_deref()
            .and_then(|commit| self.gateway.find_stash(commit).ok().flatten());
        match entry {
            Some(entry) => format!("git stash pop --index {}", entry),
            None => format!(
                "git stash list  # look for \"{}\", then: git stash pop --index stash@{{N}}",
                record.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGateway;

    fn dirty_gateway() -> FakeGateway {
        let gateway = FakeGateway::on_branch("feature");
        {
            let mut state = gateway.state.borrow_mut();
            state.dirty = true;
            state.staged = vec!["a.txt".into()];
        }
        gateway
    }

    #[test]
    fn test_capture_clean_tree_is_noop() {
        let gateway = FakeGateway::on_branch("feature");
        let guard = WorkingTreeGuard::new(&gateway);

        let record = guard.capture().unwrap();
        assert!(!record.stashed);
        assert!(gateway.calls().is_empty());
        assert_eq!(
            guard.restore(record).unwrap(),
            RestoreOutcome::NothingToRestore
        );
        assert!(!gateway.called("stash pop"));
    }

    #[test]
    fn test_capture_and_restore_with_index() {
        let gateway = dirty_gateway();
        let guard = WorkingTreeGuard::new(&gateway);

        let record = guard.capture().unwrap();
        assert!(record.stashed);
        assert_eq!(record.staged_file_paths, vec!["a.txt".to_string()]);
        assert!(record.message.starts_with("branchsync: auto-stash "));
        assert!(!gateway.state.borrow().dirty);

        let outcome = guard.restore(record).unwrap();
        assert!(matches!(
            outcome,
            RestoreOutcome::Restored {
                index_preserved: true,
                ..
            }
        ));
        assert!(gateway.state.borrow().stashes.is_empty());
    }

    #[test]
    fn test_restore_restages_after_plain_pop() {
        let gateway = dirty_gateway();
        {
            let mut state = gateway.state.borrow_mut();
            state.pop_without_index = true;
            state.staged.push("gone.txt".into());
        }
        std::fs::write(gateway.root_path().join("a.txt"), "staged\n").unwrap();
        let guard = WorkingTreeGuard::new(&gateway);

        let record = guard.capture().unwrap();
        let outcome = guard.restore(record).unwrap();
        assert_eq!(
            outcome,
            RestoreOutcome::Restored {
                index_preserved: false,
                restaged: vec!["a.txt".into()],
                skipped: vec!["gone.txt".into()],
            }
        );
        assert!(gateway.called("add a.txt"));
    }

    #[test]
    fn test_conflicting_pop_keeps_stash() {
        let gateway = dirty_gateway();
        gateway.state.borrow_mut().pop_conflicts = true;
        let guard = WorkingTreeGuard::new(&gateway);

        let record = guard.capture().unwrap();
        let hint = guard.recovery_command(&record);
        assert_eq!(hint, "git stash pop --index stash@{0}");

        let outcome = guard.restore(record).unwrap();
        assert!(outcome.conflicts_remain());
        assert!(!outcome.success());
        assert_eq!(gateway.state.borrow().stashes.len(), 1);
    }

    #[test]
    fn test_restore_missing_stash_is_error() {
        let gateway = dirty_gateway();
        let guard = WorkingTreeGuard::new(&gateway);

        let record = guard.capture().unwrap();
        gateway.state.borrow_mut().stashes.clear();
        let hint = guard.recovery_command(&record);
        assert!(hint.starts_with("git stash list"));
        assert!(matches!(
            guard.restore(record),
            Err(GitError::StashNotFound(_))
        ));
    }
}
