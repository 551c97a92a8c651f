//! Bringing the current branch up to date with its base.
//!
//! The [`SyncOrchestrator`] is the heart of branchsync. It implements a state
//! machine that drives one sync:
//!
//! 1. Set uncommitted work aside with the [`WorkingTreeGuard`].
//! 2. Fetch the remote and fast-forward the local base branch if that is safe.
//! 3. Rebase onto (or merge from) the remote base ref.
//! 4. On conflicts, abort, hand off to the operator, or run the
//!    [`ConflictResolver`] and continue, once per conflicted commit.
//! 5. Restore the stash once the rebase or merge has reached a terminal state.
//!
//! Conflicts are an expected outcome and come back as a [`SyncOutcome`]; only
//! environment failures come back as [`SyncError`]. Every exit path, errors
//! included, goes through restoration before returning.

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::conflict::{ConflictResolver, PromptStrategy, ResolutionReport, ResolutionStrategy};
use crate::errors::{GitError, SyncError};
use crate::git::VcsGateway;
use crate::guard::{RestoreOutcome, WorkingTreeGuard};
use crate::interact::{is_cancelled, CancelFlag, Prompter, Reporter};
use crate::models::{BranchRef, StashRecord, SyncOutcome, SyncStrategy};

// ---------------------------------------------------------------------------
// Sync state machine
// ---------------------------------------------------------------------------

/// States of one sync.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Guarding,
    Fetching,
    Applying,
    Succeeded,
    Conflicted,
    Resolving,
    Continuing,
    StillConflicted,
    Aborted,
    Restoring,
    Done,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Guarding => write!(f, "guarding"),
            Self::Fetching => write!(f, "fetching"),
            Self::Applying => write!(f, "applying"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Conflicted => write!(f, "conflicted"),
            Self::Resolving => write!(f, "resolving"),
            Self::Continuing => write!(f, "continuing"),
            Self::StillConflicted => write!(f, "still_conflicted"),
            Self::Aborted => write!(f, "aborted"),
            Self::Restoring => write!(f, "restoring"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Per-invocation behaviour of the orchestrator.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub remote: String,
    /// Prompt the operator on conflicts and before stashing.
    pub interactive: bool,
    /// Accept confirmations without asking.
    pub auto_yes: bool,
    /// Branch assumed when HEAD is unborn.
    pub default_branch: BranchRef,
}

/// What the operator chose when a rebase or merge stopped on conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConflictAction {
    Resolve,
    Abort,
    ExitManually,
}

impl ConflictAction {
    const ALL: [ConflictAction; 3] = [Self::Resolve, Self::Abort, Self::ExitManually];

    fn label(&self) -> &'static str {
        match self {
            Self::Resolve => "Resolve interactively",
            Self::Abort => "Abort and restore",
            Self::ExitManually => "Exit to resolve manually",
        }
    }
}

/// Where the underlying rebase or merge ended up.
enum Settled {
    /// Completed or fully aborted; the stash can be popped.
    Terminal(SyncOutcome),
    /// Left in progress for the operator; the stash stays put.
    InProgress(SyncOutcome),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives one sync against a [`VcsGateway`].
pub struct SyncOrchestrator<'a, G: VcsGateway + ?Sized> {
    gateway: &'a G,
    prompter: &'a mut dyn Prompter,
    reporter: &'a dyn Reporter,
    options: SyncOptions,
    cancel: Option<CancelFlag>,
    /// Per-block decisions; the interactive prompt when unset.
    strategy: Option<Box<dyn ResolutionStrategy + 'a>>,
    state: SyncState,
    /// Set once this run has issued its own rebase or merge.
    started: bool,
}

impl<'a, G: VcsGateway + ?Sized> SyncOrchestrator<'a, G> {
    pub fn new(
        gateway: &'a G,
        prompter: &'a mut dyn Prompter,
        reporter: &'a dyn Reporter,
        options: SyncOptions,
    ) -> Self {
        Self {
            gateway,
            prompter,
            reporter,
            options,
            cancel: None,
            strategy: None,
            state: SyncState::Idle,
            started: false,
        }
    }

    /// Observe an operator interrupt between steps.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Decide conflict blocks with `strategy` instead of prompting per block.
    pub fn with_resolution_strategy(mut self, strategy: Box<dyn ResolutionStrategy + 'a>) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn gateway(&self) -> &'a G {
        self.gateway
    }

    pub fn reporter(&self) -> &'a dyn Reporter {
        self.reporter
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    fn transition(&mut self, to: SyncState) {
        debug!(from = %self.state, to = %to, "sync state transition");
        self.state = to;
    }

    /// Refuse to start while a rebase or merge begun elsewhere is in progress.
    fn ensure_no_operation_in_progress(&self) -> Result<(), SyncError> {
        let operation = if self.gateway.rebase_progress()?.is_some() {
            "rebase"
        } else if self.gateway.merge_in_progress()? {
            "merge"
        } else {
            return Ok(());
        };
        warn!(operation, "refusing to sync during an operation in progress");
        Err(SyncError::OperationInProgress(operation.to_string()))
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        match &self.cancel {
            Some(flag) if is_cancelled(flag) => Err(SyncError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Ask a yes/no question. Always `false` when not interactive; a failed
    /// prompt counts as `false`.
    pub fn ask(&mut self, question: &str, default: bool) -> bool {
        if !self.options.interactive {
            return false;
        }
        match self.prompter.confirm(question, default) {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "prompt failed, treating as no");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// Sync the current branch with `base` on the configured remote.
    ///
    /// Being on `base` already is a successful no-op that touches nothing.
    #[instrument(skip(self), fields(base = %base, strategy = %strategy))]
    pub fn sync(
        &mut self,
        base: &BranchRef,
        strategy: SyncStrategy,
    ) -> Result<SyncOutcome, SyncError> {
        self.state = SyncState::Idle;
        self.ensure_no_operation_in_progress()?;
        let current = self.gateway.current_branch(&self.options.default_branch)?;
        if &current == base {
            info!(branch = %current, "already on base branch, nothing to sync");
            return Ok(SyncOutcome::succeeded(format!(
                "already on base branch '{}'",
                base
            )));
        }
        self.check_cancelled()?;

        let target = base.on_remote(&self.options.remote);
        self.reporter.info(&format!(
            "syncing '{}' with {} ({})",
            current, target, strategy
        ));
        self.run(strategy, &target, Some(base))
    }

    /// Replay the local branch onto its own remote counterpart.
    ///
    /// Used by push recovery after a non-fast-forward rejection; the local
    /// base fast-forward is skipped.
    #[instrument(skip(self), fields(branch = %branch, strategy = %strategy))]
    pub fn sync_onto_remote(
        &mut self,
        branch: &BranchRef,
        strategy: SyncStrategy,
    ) -> Result<SyncOutcome, SyncError> {
        self.state = SyncState::Idle;
        self.ensure_no_operation_in_progress()?;
        self.check_cancelled()?;
        let target = branch.on_remote(&self.options.remote);
        self.reporter
            .info(&format!("bringing '{}' up to date with {}", branch, target));
        self.run(strategy, &target, None)
    }

    // -----------------------------------------------------------------------
    // Guarded run
    // -----------------------------------------------------------------------

    fn run(
        &mut self,
        strategy: SyncStrategy,
        target: &str,
        fast_forward: Option<&BranchRef>,
    ) -> Result<SyncOutcome, SyncError> {
        self.started = false;
        self.transition(SyncState::Guarding);
        let status = self.gateway.status()?;
        if status.is_dirty() && self.options.interactive && !self.options.auto_yes {
            let proceed = self.ask("Uncommitted changes found. Stash them and continue?", true);
            if !proceed {
                self.transition(SyncState::Done);
                return Ok(SyncOutcome::failed(
                    "sync cancelled; uncommitted changes were left untouched",
                ));
            }
        }

        let guard = WorkingTreeGuard::new(self.gateway);
        let record = guard
            .capture()
            .map_err(|e| SyncError::StashFailed(e.to_string()))?;
        if record.stashed {
            self.reporter.info("stashed uncommitted changes");
        }

        let result = self.apply_and_settle(strategy, target, fast_forward);
        self.finish(result, record, strategy)
    }

    /// Restore according to where the rebase or merge ended up.
    fn finish(
        &mut self,
        result: Result<Settled, SyncError>,
        record: StashRecord,
        strategy: SyncStrategy,
    ) -> Result<SyncOutcome, SyncError> {
        match result {
            Ok(Settled::Terminal(mut outcome)) => {
                self.transition(SyncState::Restoring);
                self.restore_into(record, &mut outcome);
                self.transition(SyncState::Done);
                Ok(outcome)
            }
            Ok(Settled::InProgress(mut outcome)) => {
                if record.stashed {
                    let hint = WorkingTreeGuard::new(self.gateway).recovery_command(&record);
                    outcome.stash_pending = true;
                    outcome.message.push_str(&format!(
                        "\nyour uncommitted changes are still stashed; once the {} is finished run:\n  {}",
                        strategy, hint
                    ));
                }
                self.transition(SyncState::Done);
                Ok(outcome)
            }
            Err(e) => {
                warn!(error = %e, state = %self.state, "sync failed, restoring");
                if self.started {
                    self.abort_in_progress();
                }
                self.transition(SyncState::Restoring);
                let mut scratch = SyncOutcome::failed(e.to_string());
                self.restore_into(record, &mut scratch);
                self.transition(SyncState::Done);
                Err(e)
            }
        }
    }

    /// Pop the stash, reporting but never hiding a failed restore.
    fn restore_into(&self, record: StashRecord, outcome: &mut SyncOutcome) {
        if !record.stashed {
            return;
        }
        let guard = WorkingTreeGuard::new(self.gateway);
        let hint = guard.recovery_command(&record);
        match guard.restore(record) {
            Ok(RestoreOutcome::ConflictsRemain) => {
                self.reporter.error(&format!(
                    "restoring your changes conflicted; they are still stashed. Resolve, then drop it with: {}",
                    hint.replace("pop --index", "drop")
                ));
                outcome.stash_pending = true;
                outcome
                    .message
                    .push_str("\nrestoring local changes conflicted; the stash was kept");
            }
            Ok(RestoreOutcome::Restored { skipped, .. }) => {
                if !skipped.is_empty() {
                    self.reporter.warn(&format!(
                        "could not re-stage: {}",
                        skipped.join(", ")
                    ));
                }
                self.reporter.info("restored uncommitted changes");
            }
            Ok(RestoreOutcome::NothingToRestore) => {}
            Err(e) => {
                self.reporter.error(&format!(
                    "failed to restore your changes ({}); they are still stashed. Recover with: {}",
                    e, hint
                ));
                outcome.stash_pending = true;
                outcome
                    .message
                    .push_str(&format!("\nlocal changes are still stashed: {}", hint));
            }
        }
    }

    /// Best-effort abort of the rebase or merge this run left in progress.
    fn abort_in_progress(&self) {
        match self.gateway.rebase_progress() {
            Ok(Some(_)) => {
                if let Err(e) = self.gateway.rebase_abort() {
                    warn!(error = %e, "failed to abort rebase");
                }
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not inspect rebase state"),
        }
        match self.gateway.merge_in_progress() {
            Ok(true) => {
                if let Err(e) = self.gateway.merge_abort() {
                    warn!(error = %e, "failed to abort merge");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not inspect merge state"),
        }
    }

    // -----------------------------------------------------------------------
    // Fetch & apply
    // -----------------------------------------------------------------------

    fn apply_and_settle(
        &mut self,
        strategy: SyncStrategy,
        target: &str,
        fast_forward: Option<&BranchRef>,
    ) -> Result<Settled, SyncError> {
        self.check_cancelled()?;
        self.transition(SyncState::Fetching);
        let remote = self.options.remote.clone();
        self.gateway
            .fetch(&remote)
            .map_err(|e| SyncError::FetchFailed {
                remote: remote.clone(),
                detail: failure_detail(&e),
            })?;
        if let Some(base) = fast_forward {
            self.fast_forward_base(base, target);
        }

        self.check_cancelled()?;
        self.transition(SyncState::Applying);
        self.started = true;
        let applied = match strategy {
            SyncStrategy::Rebase => self.gateway.rebase(target),
            SyncStrategy::Merge => self.gateway.merge(target),
        };

        match applied {
            Ok(()) => {
                self.transition(SyncState::Succeeded);
                self.reporter
                    .success(&format!("{} onto {} complete", strategy, target));
                Ok(Settled::Terminal(SyncOutcome::succeeded(format!(
                    "{} onto {} complete",
                    strategy, target
                ))))
            }
            Err(e) => {
                let files = self.gateway.unmerged_files()?;
                if files.is_empty() {
                    return Err(SyncError::ApplyFailed {
                        operation: strategy.to_string(),
                        target: target.to_string(),
                        detail: failure_detail(&e),
                    });
                }
                self.handle_conflicts(strategy, target, files)
            }
        }
    }

    /// Move the local base branch up to its remote if it is strictly behind.
    ///
    /// Advisory only: nothing here fails the sync.
    fn fast_forward_base(&self, base: &BranchRef, target: &str) {
        let local_ref = format!("refs/heads/{}", base);
        let local = match self.gateway.try_rev_parse(&local_ref) {
            Ok(Some(id)) => id,
            Ok(None) => {
                debug!(branch = %base, "no local base branch to fast-forward");
                return;
            }
            Err(e) => {
                warn!(error = %e, "could not resolve local base branch");
                return;
            }
        };

        match self.gateway.ahead_behind(&local, target) {
            Ok((0, 0)) => debug!(branch = %base, "local base branch up to date"),
            Ok((0, behind)) => {
                let result = self
                    .gateway
                    .rev_parse(target)
                    .and_then(|new| self.gateway.update_branch(base, &new, &local));
                match result {
                    Ok(()) => info!(branch = %base, behind, "fast-forwarded local base branch"),
                    Err(e) => warn!(error = %e, branch = %base, "could not fast-forward local base branch"),
                }
            }
            Ok((ahead, 0)) => {
                debug!(branch = %base, ahead, "local base branch ahead of remote, leaving it")
            }
            Ok((ahead, behind)) => {
                debug!(branch = %base, ahead, behind, "local base branch diverged");
                self.reporter.warn(&format!(
                    "local '{}' has diverged from {} ({} ahead, {} behind); not updating it",
                    base, target, ahead, behind
                ));
            }
            Err(e) => warn!(error = %e, "could not compare local and remote base branch"),
        }
    }

    // -----------------------------------------------------------------------
    // Conflicts
    // -----------------------------------------------------------------------

    /// Maximum conflict rounds: the commits the rebase still has to replay.
    fn round_limit(&self, strategy: SyncStrategy) -> Result<usize, GitError> {
        match strategy {
            SyncStrategy::Merge => Ok(1),
            SyncStrategy::Rebase => Ok(self
                .gateway
                .rebase_progress()?
                .map(|p| p.total.saturating_sub(p.current) + 1)
                .unwrap_or(1)),
        }
    }

    fn handle_conflicts(
        &mut self,
        strategy: SyncStrategy,
        target: &str,
        mut files: Vec<String>,
    ) -> Result<Settled, SyncError> {
        let limit = self.round_limit(strategy)?;
        let mut round = 0;

        loop {
            round += 1;
            if round > limit {
                return Err(SyncError::RoundLimitExceeded(limit));
            }
            self.transition(SyncState::Conflicted);
            info!(round, limit, files = files.len(), "conflicts detected");
            self.reporter.warn(&format!(
                "conflicts in {} file(s): {}",
                files.len(),
                files.join(", ")
            ));
            self.check_cancelled()?;

            if !self.options.interactive {
                self.abort_op(strategy)?;
                self.transition(SyncState::Aborted);
                return Ok(Settled::Terminal(SyncOutcome::conflicted(format!(
                    "conflicts detected, resolve manually:\n{}",
                    manual_steps(strategy, target, false)
                ))));
            }

            match self.choose_action()? {
                ConflictAction::Abort => {
                    self.abort_op(strategy)?;
                    self.transition(SyncState::Aborted);
                    return Ok(Settled::Terminal(SyncOutcome::conflicted(format!(
                        "{} aborted at your request; branch left as it was",
                        strategy
                    ))));
                }
                ConflictAction::ExitManually => {
                    return Ok(Settled::InProgress(SyncOutcome::conflicted(format!(
                        "needs manual resolution:\n{}",
                        manual_steps(strategy, target, true)
                    ))));
                }
                ConflictAction::Resolve => {}
            }

            self.transition(SyncState::Resolving);
            let report = self.resolve()?;
            if report.aborted {
                self.check_cancelled()?;
                self.abort_op(strategy)?;
                self.transition(SyncState::Aborted);
                return Ok(Settled::Terminal(SyncOutcome::conflicted(format!(
                    "conflict resolution aborted; {} aborted",
                    strategy
                ))));
            }
            if !report.is_complete() {
                self.transition(SyncState::StillConflicted);
                return Ok(Settled::InProgress(SyncOutcome::conflicted(format!(
                    "partial resolution, continue manually. Unresolved: {}\n{}",
                    report.files_skipped.join(", "),
                    manual_steps(strategy, target, true)
                ))));
            }
            let manual = self.gateway.unmerged_files()?;
            if !manual.is_empty() {
                self.transition(SyncState::StillConflicted);
                self.reporter.warn(&format!(
                    "no conflict markers to edit in: {} (modified on one side, deleted on the other?)",
                    manual.join(", ")
                ));
                return Ok(Settled::InProgress(SyncOutcome::conflicted(format!(
                    "needs manual resolution: {}\n  git add <file> or git rm <file> to choose a side\n{}",
                    manual.join(", "),
                    manual_steps(strategy, target, true)
                ))));
            }

            self.check_cancelled()?;
            self.transition(SyncState::Continuing);
            let continued = match strategy {
                SyncStrategy::Rebase => self.gateway.rebase_continue(),
                SyncStrategy::Merge => self.gateway.merge_continue(),
            };
            match continued {
                Ok(()) => {
                    self.transition(SyncState::Succeeded);
                    self.reporter.success(&format!(
                        "{} onto {} complete after resolving conflicts",
                        strategy, target
                    ));
                    return Ok(Settled::Terminal(SyncOutcome::succeeded(format!(
                        "{} onto {} complete after resolving conflicts",
                        strategy, target
                    ))));
                }
                Err(e) => {
                    files = self.gateway.unmerged_files()?;
                    if files.is_empty() {
                        return Err(SyncError::ApplyFailed {
                            operation: format!("{} --continue", strategy),
                            target: target.to_string(),
                            detail: failure_detail(&e),
                        });
                    }
                    self.transition(SyncState::StillConflicted);
                    debug!(round, "continue stopped on the next commit's conflicts");
                }
            }
        }
    }

    fn choose_action(&mut self) -> Result<ConflictAction, SyncError> {
        let labels: Vec<&str> = ConflictAction::ALL.iter().map(|a| a.label()).collect();
        match self
            .prompter
            .select("Conflicts found. What would you like to do?", &labels, 0)
        {
            Ok(i) => Ok(ConflictAction::ALL
                .get(i)
                .copied()
                .unwrap_or(ConflictAction::Abort)),
            Err(e) => {
                self.check_cancelled()?;
                warn!(error = %e, "prompt failed, aborting");
                Ok(ConflictAction::Abort)
            }
        }
    }

    fn resolve(&mut self) -> Result<ResolutionReport, SyncError> {
        let mut resolver = ConflictResolver::new(self.gateway, self.reporter);
        if let Some(flag) = &self.cancel {
            resolver = resolver.with_cancel(flag.clone());
        }
        let report = match self.strategy.as_mut() {
            Some(strategy) => resolver.resolve_all(strategy.as_mut())?,
            None => {
                let mut prompt = PromptStrategy::new(&mut *self.prompter, self.reporter);
                resolver.resolve_all(&mut prompt)?
            }
        };
        Ok(report)
    }

    fn abort_op(&self, strategy: SyncStrategy) -> Result<(), GitError> {
        info!(%strategy, "aborting");
        match strategy {
            SyncStrategy::Rebase => self.gateway.rebase_abort(),
            SyncStrategy::Merge => self.gateway.merge_abort(),
        }
    }
}

/// Stderr when git produced some, otherwise the error itself.
fn failure_detail(e: &GitError) -> String {
    match e.stderr().trim() {
        "" => e.to_string(),
        stderr => stderr.to_string(),
    }
}

/// The exact commands to finish (or redo) a sync by hand.
fn manual_steps(strategy: SyncStrategy, target: &str, in_progress: bool) -> String {
    let mut steps = Vec::new();
    if !in_progress {
        match strategy {
            SyncStrategy::Rebase => steps.push(format!("git rebase {}", target)),
            SyncStrategy::Merge => steps.push(format!("git merge {}", target)),
        }
    }
    steps.push("git status                 # list conflicted files".to_string());
    steps.push("# edit each file, then: git add <file>".to_string());
    match strategy {
        SyncStrategy::Rebase => {
            steps.push("git rebase --continue      # or: git rebase --abort".to_string())
        }
        SyncStrategy::Merge => {
            steps.push("git merge --continue       # or: git merge --abort".to_string())
        }
    }
    steps
        .iter()
        .map(|s| format!("  {}", s))
        .collect::<Vec<_>>()
        .join("\n")
}
