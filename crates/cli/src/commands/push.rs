//! `branchsync push`: push the current branch, recovering from one rejection.

use anyhow::{Context, Result};

use branchsync_core::errors::GitError;
use branchsync_core::git::VcsGateway;
use branchsync_core::push::PushRecoveryController;
use branchsync_core::sync_engine::SyncOrchestrator;

use super::{AppContext, Finished};
use crate::terminal::TerminalPrompter;

#[derive(Debug, Clone, Copy)]
pub struct PushArgs {
    pub set_upstream: bool,
    pub force_with_lease: bool,
    pub yes: bool,
}

pub fn run(ctx: &AppContext, args: PushArgs) -> Result<Finished> {
    let gateway = ctx.open_repo()?;
    let branch = match gateway.current_branch(&ctx.config.default_branch()?) {
        Ok(branch) => branch,
        Err(GitError::DetachedHead) => {
            anyhow::bail!("HEAD is detached; check out the branch you want to push")
        }
        Err(e) => return Err(e).context("failed to determine current branch"),
    };
    let options = ctx.sync_options(ctx.interactive(false), args.yes)?;

    let reporter = ctx.reporter();
    let mut prompter = TerminalPrompter;
    let sync = SyncOrchestrator::new(&gateway, &mut prompter, &reporter, options)
        .with_cancel(ctx.cancel.clone());
    let mut push = PushRecoveryController::new(sync, ctx.config.sync.strategy)
        .with_auto_sync(ctx.config.push.auto_sync)
        .with_force_with_lease(args.force_with_lease || ctx.config.push.force_with_lease);

    let report = push
        .recover_and_retry(&branch, args.set_upstream, args.yes)
        .context("push failed")?;

    Finished::new(true, &report)
}
