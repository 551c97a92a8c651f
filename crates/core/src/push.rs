//! Pushing with bounded recovery from rejections.
//!
//! A non-fast-forward rejection is reconciled by syncing onto the remote
//! branch and retrying exactly once. A stale force-with-lease rejection is
//! never reconciled: the operator either confirms overwriting the remote
//! again, with the lease refreshed, or the push stops.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::errors::PushError;
use crate::git::{PushOptions, PushOutcome, VcsGateway};
use crate::models::{BranchRef, SyncStrategy};
use crate::sync_engine::SyncOrchestrator;

/// What a successful push took.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub branch: String,
    pub remote: String,
    /// Push commands issued, the final successful one included.
    pub attempts: usize,
    /// A sync onto the remote branch ran before the retry.
    pub synced: bool,
    /// The remote branch was overwritten after a stale lease.
    pub forced: bool,
}

/// Push driver with the single sync-and-retry cycle.
pub struct PushRecoveryController<'a, G: VcsGateway + ?Sized> {
    sync: SyncOrchestrator<'a, G>,
    strategy: SyncStrategy,
    auto_sync: bool,
    force_with_lease: bool,
}

impl<'a, G: VcsGateway + ?Sized> PushRecoveryController<'a, G> {
    pub fn new(sync: SyncOrchestrator<'a, G>, strategy: SyncStrategy) -> Self {
        Self {
            sync,
            strategy,
            auto_sync: true,
            force_with_lease: false,
        }
    }

    /// When off, a non-fast-forward rejection is reported instead of synced.
    pub fn with_auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    pub fn with_force_with_lease(mut self, force_with_lease: bool) -> Self {
        self.force_with_lease = force_with_lease;
        self
    }

    /// Push `branch`, recovering from at most one rejection.
    #[instrument(skip(self), fields(branch = %branch))]
    pub fn recover_and_retry(
        &mut self,
        branch: &BranchRef,
        set_upstream: bool,
        auto_yes: bool,
    ) -> Result<PushReport, PushError> {
        let options = PushOptions {
            set_upstream,
            force_with_lease: self.force_with_lease,
        };
        let remote = self.sync.options().remote.clone();
        let mut report = PushReport {
            branch: branch.to_string(),
            remote: remote.clone(),
            attempts: 1,
            synced: false,
            forced: false,
        };

        match self.sync.gateway().push(&remote, branch, options)? {
            PushOutcome::Pushed => {
                self.sync.reporter().success(&format!("pushed '{}' to {}", branch, remote));
                Ok(report)
            }
            PushOutcome::NonFastForward(detail) => {
                warn!(detail = %detail, "push rejected: remote has new commits");
                self.recover_non_fast_forward(branch, options, auto_yes, &mut report)?;
                Ok(report)
            }
            PushOutcome::StaleLease(detail) => {
                warn!(detail = %detail, "push rejected: stale lease");
                self.recover_stale_lease(branch, options, auto_yes, &mut report)?;
                Ok(report)
            }
        }
    }

    fn recover_non_fast_forward(
        &mut self,
        branch: &BranchRef,
        options: PushOptions,
        auto_yes: bool,
        report: &mut PushReport,
    ) -> Result<(), PushError> {
        if !self.auto_sync {
            return Err(PushError::Declined {
                branch: branch.to_string(),
                reason: "remote has commits you do not have and automatic sync is off".into(),
            });
        }

        let gateway = self.sync.gateway();
        let reporter = self.sync.reporter();
        let remote = report.remote.clone();
        let remote_ref = branch.on_remote(&remote);
        gateway.fetch(&remote)?;

        if gateway.try_rev_parse(&remote_ref)?.is_some() {
            let commits = gateway.log_range(branch.as_str(), &remote_ref)?;
            reporter.warn(&format!(
                "{} has {} commit(s) not in your branch:",
                remote_ref,
                commits.len()
            ));
            for commit in &commits {
                reporter.info(&format!("  {}", commit));
            }
        }

        let accepted = auto_yes
            || self.sync.ask(
                &format!("Sync '{}' with {} and retry the push?", branch, remote_ref),
                true,
            );
        if !accepted {
            return Err(PushError::Declined {
                branch: branch.to_string(),
                reason: "sync before retry was declined".into(),
            });
        }

        let outcome = self.sync.sync_onto_remote(branch, self.strategy)?;
        if !outcome.success {
            return Err(PushError::SyncIncomplete(outcome.message));
        }
        report.synced = true;

        report.attempts += 1;
        match gateway.push(&remote, branch, options)? {
            PushOutcome::Pushed => {
                info!(attempts = report.attempts, "push succeeded after sync");
                reporter.success(&format!("pushed '{}' to {} after syncing", branch, remote));
                Ok(())
            }
            PushOutcome::NonFastForward(detail) | PushOutcome::StaleLease(detail) => {
                Err(PushError::RetryExhausted {
                    branch: branch.to_string(),
                    detail,
                })
            }
        }
    }

    fn recover_stale_lease(
        &mut self,
        branch: &BranchRef,
        options: PushOptions,
        auto_yes: bool,
        report: &mut PushReport,
    ) -> Result<(), PushError> {
        let gateway = self.sync.gateway();
        let reporter = self.sync.reporter();
        let remote = report.remote.clone();
        let remote_ref = branch.on_remote(&remote);
        gateway.fetch(&remote)?;

        let retry = match gateway.try_rev_parse(&remote_ref)? {
            None => {
                reporter.warn(&format!(
                    "{} no longer exists; pushing without a lease",
                    remote_ref
                ));
                PushOptions {
                    set_upstream: true,
                    force_with_lease: false,
                }
            }
            Some(_) => {
                let stat = gateway.diff_stat(branch.as_str(), &remote_ref)?;
                reporter.warn(&format!(
                    "{} changed since you last fetched it. Differences from your branch:\n{}",
                    remote_ref, stat
                ));
                if auto_yes {
                    return Err(PushError::Declined {
                        branch: branch.to_string(),
                        reason: "remote moved; not overwriting it without confirmation".into(),
                    });
                }
                let force = self.sync.ask(
                    &format!("Force-push '{}' and overwrite {}?", branch, remote_ref),
                    false,
                );
                if !force {
                    return Err(PushError::Declined {
                        branch: branch.to_string(),
                        reason: "force-push declined".into(),
                    });
                }
                report.forced = true;
                PushOptions {
                    force_with_lease: true,
                    ..options
                }
            }
        };

        report.attempts += 1;
        match gateway.push(&remote, branch, retry)? {
            PushOutcome::Pushed => {
                reporter.success(&format!("pushed '{}' to {}", branch, remote));
                Ok(())
            }
            PushOutcome::NonFastForward(detail) | PushOutcome::StaleLease(detail) => {
                Err(PushError::RetryExhausted {
                    branch: branch.to_string(),
                    detail,
                })
            }
        }
    }
}
