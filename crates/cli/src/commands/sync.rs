//! `branchsync sync`: bring the current branch up to date with its base.

use anyhow::{Context, Result};

use branchsync_core::interact::Reporter;
use branchsync_core::models::{BranchRef, SyncStrategy};
use branchsync_core::sync_engine::SyncOrchestrator;

use super::{AppContext, Finished};
use crate::terminal::TerminalPrompter;

#[derive(Debug, Clone)]
pub struct SyncArgs {
    pub base: Option<BranchRef>,
    pub strategy: Option<SyncStrategy>,
    pub yes: bool,
    pub no_interactive: bool,
}

pub fn run(ctx: &AppContext, args: SyncArgs) -> Result<Finished> {
    let gateway = ctx.open_repo()?;
    let base = match args.base {
        Some(base) => base,
        None => ctx.config.base_branch()?,
    };
    let strategy = args.strategy.unwrap_or(ctx.config.sync.strategy);
    let options = ctx.sync_options(ctx.interactive(args.no_interactive), args.yes)?;

    let reporter = ctx.reporter();
    let mut prompter = TerminalPrompter;
    let mut sync = SyncOrchestrator::new(&gateway, &mut prompter, &reporter, options)
        .with_cancel(ctx.cancel.clone());

    let outcome = sync.sync(&base, strategy).context("sync failed")?;

    if outcome.success {
        reporter.success(&outcome.message);
    } else {
        reporter.warn(&outcome.message);
    }

    Finished::new(outcome.success, &outcome)
}
