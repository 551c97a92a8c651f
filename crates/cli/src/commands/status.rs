//! `branchsync status`: where the current branch stands against its base.

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use serde::Serialize;

use branchsync_core::errors::GitError;
use branchsync_core::git::{GitCli, VcsGateway};
use branchsync_core::models::BranchRef;

use super::{AppContext, Finished};
use crate::style;
use crate::terminal::Verbosity;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub branch: String,
    pub base: String,
    pub remote_base: String,
    /// Commits on the branch and not on the remote base. `None` when the
    /// remote base has never been fetched.
    pub ahead: Option<usize>,
    pub behind: Option<usize>,
    pub staged: bool,
    pub unstaged: bool,
    pub untracked: bool,
    pub conflicted_files: Vec<String>,
    /// `rebase`, `merge` or nothing.
    pub in_progress: Option<String>,
}

pub fn run(ctx: &AppContext, base: Option<BranchRef>) -> Result<Finished> {
    let gateway = ctx.open_repo()?;
    let base = match base {
        Some(base) => base,
        None => ctx.config.base_branch()?,
    };
    let report = gather(&gateway, &ctx.config.sync.remote, &base, &ctx.config.default_branch()?)
        .context("failed to read repository status")?;

    if ctx.verbosity != Verbosity::Json {
        print_table(&report);
    }
    Finished::new(true, &report)
}

fn gather(
    gateway: &GitCli,
    remote: &str,
    base: &BranchRef,
    fallback: &BranchRef,
) -> Result<StatusReport> {
    let branch = match gateway.current_branch(fallback) {
        Ok(branch) => branch.to_string(),
        Err(GitError::DetachedHead) => "(detached HEAD)".to_string(),
        Err(e) => return Err(e.into()),
    };
    let remote_base = base.on_remote(remote);

    let (ahead, behind) = match gateway.try_rev_parse(&remote_base)? {
        Some(_) if gateway.try_rev_parse("HEAD")?.is_some() => {
            let (ahead, behind) = gateway.ahead_behind("HEAD", &remote_base)?;
            (Some(ahead), Some(behind))
        }
        _ => (None, None),
    };

    let tree = gateway.status()?;
    let in_progress = if gateway.rebase_progress()?.is_some() {
        Some("rebase".to_string())
    } else if gateway.merge_in_progress()? {
        Some("merge".to_string())
    } else {
        None
    };

    Ok(StatusReport {
        branch,
        base: base.to_string(),
        remote_base,
        ahead,
        behind,
        staged: tree.has_staged,
        unstaged: tree.has_unstaged,
        untracked: tree.has_untracked,
        conflicted_files: gateway.unmerged_files()?,
        in_progress,
    })
}

fn count(n: Option<usize>) -> String {
    n.map(|n| n.to_string()).unwrap_or_else(|| "-".into())
}

fn print_table(report: &StatusReport) {
    println!("{}", style::header("Branch status"));

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Field", "Value"]);

    table.add_row(vec![Cell::new("Branch"), Cell::new(&report.branch)]);
    table.add_row(vec![Cell::new("Base"), Cell::new(&report.remote_base)]);
    table.add_row(vec![Cell::new("Ahead"), Cell::new(count(report.ahead))]);
    table.add_row(vec![Cell::new("Behind"), Cell::new(count(report.behind))]);
    table.add_row(vec![Cell::new("Staged changes"), Cell::new(style::flag(report.staged))]);
    table.add_row(vec![
        Cell::new("Unstaged changes"),
        Cell::new(style::flag(report.unstaged)),
    ]);
    table.add_row(vec![
        Cell::new("Untracked files"),
        Cell::new(style::flag(report.untracked)),
    ]);
    table.add_row(vec![
        Cell::new("In progress"),
        Cell::new(report.in_progress.as_deref().unwrap_or("-")),
    ]);
    println!("{table}");

    if report.ahead.is_none() {
        println!(
            "{}",
            style::dim(&format!("{} has not been fetched yet", report.remote_base))
        );
    }
    if !report.conflicted_files.is_empty() {
        println!("{}", style::warn("Conflicted files:"));
        for path in &report.conflicted_files {
            println!("  {}", path);
        }
        println!("{}", style::dim("run `branchsync resolve` to work through them"));
    }
}
