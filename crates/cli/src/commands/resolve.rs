//! `branchsync resolve`: resolve the conflicts of a rebase or merge left in
//! progress, then offer to continue it.

use anyhow::{Context, Result};
use tracing::info;

use branchsync_core::conflict::{ConflictResolver, PromptStrategy, ResolutionReport};
use branchsync_core::git::{GitCli, VcsGateway};
use branchsync_core::interact::{Prompter, Reporter};
use branchsync_core::models::SyncStrategy;

use super::{AppContext, Finished};
use crate::terminal::{ConsoleReporter, TerminalPrompter};

pub fn run(ctx: &AppContext) -> Result<Finished> {
    let gateway = ctx.open_repo()?;
    let reporter = ctx.reporter();

    let unmerged = gateway.unmerged_files()?;
    if unmerged.is_empty() {
        reporter.success("no conflicted files");
        return Finished::new(true, &ResolutionReport::default());
    }
    let textual = gateway.conflicted_files()?;
    let manual: Vec<String> = unmerged
        .into_iter()
        .filter(|path| !textual.contains(path))
        .collect();
    if !ctx.interactive(false) {
        anyhow::bail!("resolving conflicts needs an interactive terminal");
    }

    let operation = in_progress(&gateway)?;
    let mut prompter = TerminalPrompter;
    let mut report = {
        let mut strategy = PromptStrategy::new(&mut prompter, &reporter);
        ConflictResolver::new(&gateway, &reporter)
            .with_cancel(ctx.cancel.clone())
            .resolve_all(&mut strategy)
            .context("conflict resolution failed")?
    };
    if !manual.is_empty() {
        reporter.warn(&format!(
            "no conflict markers in {}; choose a side with `git add` or `git rm`",
            manual.join(", ")
        ));
        report.files_skipped.extend(manual);
    }

    if report.aborted {
        reporter.warn("resolution aborted; resolved files so far are staged");
    } else if !report.is_complete() {
        reporter.warn(&format!(
            "still unresolved: {}",
            report.files_skipped.join(", ")
        ));
    } else if let Some(strategy) = operation {
        offer_continue(&gateway, &mut prompter, &reporter, strategy)?;
    }

    Finished::new(report.is_complete(), &report)
}

/// The operation that produced the conflicts, if one is still in progress.
fn in_progress(gateway: &GitCli) -> Result<Option<SyncStrategy>> {
    if gateway.rebase_progress()?.is_some() {
        Ok(Some(SyncStrategy::Rebase))
    } else if gateway.merge_in_progress()? {
        Ok(Some(SyncStrategy::Merge))
    } else {
        Ok(None)
    }
}

fn offer_continue(
    gateway: &GitCli,
    prompter: &mut TerminalPrompter,
    reporter: &ConsoleReporter,
    strategy: SyncStrategy,
) -> Result<()> {
    let question = format!("All conflicts resolved. Run `git {} --continue`?", strategy);
    if !prompter.confirm(&question, true).unwrap_or(false) {
        reporter.info(&format!("when ready: git {} --continue", strategy));
        return Ok(());
    }

    let continued = match strategy {
        SyncStrategy::Rebase => gateway.rebase_continue(),
        SyncStrategy::Merge => gateway.merge_continue(),
    };
    match continued {
        Ok(()) => {
            info!(%strategy, "continued after resolving conflicts");
            reporter.success(&format!("{} continued", strategy));
            Ok(())
        }
        Err(e) => {
            if gateway.conflicted_files()?.is_empty() {
                return Err(e).context(format!("git {} --continue failed", strategy));
            }
            reporter.warn("the next commit has conflicts too; run `branchsync resolve` again");
            Ok(())
        }
    }
}
