//! [`VcsGateway`] implementation backed by the `git` CLI.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex_lite::Regex;
use tracing::{debug, info, instrument, warn};

use super::gateway::{PushOptions, PushOutcome, RebaseProgress, StashPop, VcsGateway};
use super::runner::{GitRunner, OutputMode};
use crate::errors::GitError;
use crate::models::{BranchRef, WorkingTreeStatus};

/// High-level git client for one working tree.
#[derive(Debug, Clone)]
pub struct GitCli {
    runner: GitRunner,
    live_output: bool,
}

impl GitCli {
    /// Open the working tree containing `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GitError> {
        let path = path.as_ref();
        let locate = GitRunner::new(path);
        let top = locate
            .stdout(&["rev-parse", "--show-toplevel"])
            .map_err(|e| match e {
                GitError::CommandFailed { .. } => {
                    GitError::RepositoryNotFound(path.display().to_string())
                }
                other => other,
            })?;
        info!(root = %top, "opened git repository");
        Ok(Self {
            runner: GitRunner::new(PathBuf::from(top)),
            live_output: false,
        })
    }

    /// Stream network command output (fetch progress) to the terminal.
    pub fn with_live_output(mut self, live: bool) -> Self {
        self.live_output = live;
        self
    }

    fn stash_entry(&self, stash_commit: &str) -> Result<String, GitError> {
        self.find_stash(stash_commit)?
            .ok_or_else(|| GitError::StashNotFound(stash_commit.to_string()))
    }

    fn porcelain_entries(&self) -> Result<Vec<(String, String)>, GitError> {
        let out = self
            .runner
            .run(&["status", "--porcelain=v1", "-z"], OutputMode::Capture)?;
        Ok(parse_porcelain_z(&out.stdout))
    }

    fn git_path_exists(&self, name: &str) -> Result<Option<PathBuf>, GitError> {
        let rel = self.runner.stdout(&["rev-parse", "--git-path", name])?;
        let path = self.runner.root().join(rel);
        Ok(path.exists().then_some(path))
    }
}

/// Parse `git status --porcelain=v1 -z` into `(XY, path)` pairs.
fn parse_porcelain_z(raw: &str) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    while let Some(field) = fields.next() {
        if field.len() < 4 {
            continue;
        }
        let (code, path) = field.split_at(2);
        // Renames and copies carry the original path as an extra field.
        if code.starts_with('R') || code.starts_with('C') {
            fields.next();
        }
        entries.push((code.to_string(), path[1..].to_string()));
    }
    entries
}

fn status_from_entries(entries: &[(String, String)]) -> WorkingTreeStatus {
    let mut status = WorkingTreeStatus::default();
    for (code, _) in entries {
        let mut chars = code.chars();
        let x = chars.next().unwrap_or(' ');
        let y = chars.next().unwrap_or(' ');
        if x == '?' {
            status.has_untracked = true;
            continue;
        }
        if x != ' ' && x != '!' {
            status.has_staged = true;
        }
        if y != ' ' && y != '!' {
            status.has_unstaged = true;
        }
    }
    status
}

fn is_both_unmerged(code: &str) -> bool {
    matches!(code, "UU" | "AA" | "DD")
}

/// Any unmerged entry, including modify/delete (`UD`, `DU`) and
/// add-by-one-side (`AU`, `UA`).
fn is_unmerged(code: &str) -> bool {
    code.contains('U') || matches!(code, "AA" | "DD")
}

fn stale_lease_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[rejected\].*\(stale info\)").expect("static regex is valid"))
}

fn non_fast_forward_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[rejected\].*\((non-fast-forward|fetch first)\)|tip of your current branch is behind")
            .expect("static regex is valid")
    })
}

/// Classify a failed push from its stderr. `None` means an unrelated error.
pub fn classify_push_rejection(stderr: &str) -> Option<PushOutcome> {
    if stale_lease_re().is_match(stderr) {
        Some(PushOutcome::StaleLease(stderr.trim().to_string()))
    } else if non_fast_forward_re().is_match(stderr) {
        Some(PushOutcome::NonFastForward(stderr.trim().to_string()))
    } else {
        None
    }
}

fn read_counter(dir: &Path, name: &str) -> usize {
    std::fs::read_to_string(dir.join(name))
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

impl VcsGateway for GitCli {
    fn root(&self) -> &Path {
        self.runner.root()
    }

    fn current_branch(&self, fallback: &BranchRef) -> Result<BranchRef, GitError> {
        let out = self
            .runner
            .run_raw(&["symbolic-ref", "--quiet", "--short", "HEAD"], OutputMode::Capture)?;
        let name = out.stdout.trim();
        if out.success() && !name.is_empty() {
            return BranchRef::new(name);
        }
        if self.try_rev_parse("HEAD")?.is_some() {
            return Err(GitError::DetachedHead);
        }
        debug!(fallback = %fallback, "HEAD has no commits, using fallback");
        Ok(fallback.clone())
    }

    #[instrument(skip(self))]
    fn fetch(&self, remote: &str) -> Result<(), GitError> {
        let mode = if self.live_output {
            OutputMode::Stream
        } else {
            OutputMode::Capture
        };
        self.runner.run(&["fetch", "--prune", remote], mode)?;
        debug!("fetch completed");
        Ok(())
    }

    fn ahead_behind(&self, a: &str, b: &str) -> Result<(usize, usize), GitError> {
        let range = format!("{}...{}", a, b);
        let out = self
            .runner
            .stdout(&["rev-list", "--left-right", "--count", &range])?;
        let mut counts = out.split_whitespace().map(str::parse::<usize>);
        match (counts.next(), counts.next()) {
            (Some(Ok(ahead)), Some(Ok(behind))) => Ok((ahead, behind)),
            _ => Err(GitError::UnexpectedOutput {
                command: format!("rev-list --left-right --count {}", range),
                output: out,
            }),
        }
    }

    fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        let revspec = format!("{}^{{commit}}", rev);
        self.runner.stdout(&["rev-parse", "--verify", "--quiet", &revspec])
    }

    fn try_rev_parse(&self, rev: &str) -> Result<Option<String>, GitError> {
        let out = self
            .runner
            .run_raw(&["rev-parse", "--verify", "--quiet", rev], OutputMode::Capture)?;
        Ok(out.success().then(|| out.stdout.trim().to_string()))
    }

    #[instrument(skip(self))]
    fn update_branch(
        &self,
        branch: &BranchRef,
        new: &str,
        expected_old: &str,
    ) -> Result<(), GitError> {
        let refname = format!("refs/heads/{}", branch);
        self.runner
            .run(&["update-ref", &refname, new, expected_old], OutputMode::Capture)?;
        info!(%branch, "fast-forwarded local branch");
        Ok(())
    }

    fn status(&self) -> Result<WorkingTreeStatus, GitError> {
        Ok(status_from_entries(&self.porcelain_entries()?))
    }

    fn staged_files(&self) -> Result<Vec<String>, GitError> {
        let out = self
            .runner
            .run(&["diff", "--cached", "--name-only", "-z"], OutputMode::Capture)?;
        Ok(out
            .stdout
            .split('\0')
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn conflicted_files(&self) -> Result<Vec<String>, GitError> {
        Ok(self
            .porcelain_entries()?
            .into_iter()
            .filter(|(code, _)| is_both_unmerged(code))
            .map(|(_, path)| path)
            .collect())
    }

    fn unmerged_files(&self) -> Result<Vec<String>, GitError> {
        Ok(self
            .porcelain_entries()?
            .into_iter()
            .filter(|(code, _)| is_unmerged(code))
            .map(|(_, path)| path)
            .collect())
    }

    fn is_tracked(&self, path: &str) -> Result<bool, GitError> {
        let out = self.runner.run_raw(
            &["ls-files", "--error-unmatch", "--", path],
            OutputMode::Capture,
        )?;
        Ok(out.success())
    }

    fn add(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.runner.run(&args, OutputMode::Capture)?;
        debug!(count = paths.len(), "staged paths");
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        self.runner
            .run(&["commit", "--no-verify", "-m", message], OutputMode::Capture)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn stash_push(&self, message: &str) -> Result<Option<String>, GitError> {
        let before = self.try_rev_parse("refs/stash")?;
        self.runner.run(
            &["stash", "push", "--include-untracked", "-m", message],
            OutputMode::Capture,
        )?;
        let after = self.try_rev_parse("refs/stash")?;
        if after.is_some() && after != before {
            info!(stash = ?after, "stashed local changes");
            Ok(after)
        } else {
            debug!("nothing to stash");
            Ok(None)
        }
    }

    fn find_stash(&self, stash_commit: &str) -> Result<Option<String>, GitError> {
        let listing = self.runner.stdout(&["stash", "list", "--format=%gd %H"])?;
        Ok(listing
            .lines()
            .filter_map(|line| line.split_once(' '))
            .find(|(_, sha)| *sha == stash_commit)
            .map(|(entry, _)| entry.to_string()))
    }

    #[instrument(skip(self))]
    fn stash_pop(&self, stash_commit: &str, prefer_index: bool) -> Result<StashPop, GitError> {
        if prefer_index {
            let entry = self.stash_entry(stash_commit)?;
            let out = self
                .runner
                .run_raw(&["stash", "pop", "--index", &entry], OutputMode::Capture)?;
            if out.success() {
                return Ok(StashPop::Applied {
                    index_restored: true,
                });
            }
            if !self.unmerged_files()?.is_empty() {
                warn!("stash pop --index left conflicts");
                return Ok(StashPop::Conflicted);
            }
            debug!(stderr = %out.stderr.trim(), "index-preserving pop failed, falling back");
        }

        let entry = self.stash_entry(stash_commit)?;
        let out = self
            .runner
            .run_raw(&["stash", "pop", &entry], OutputMode::Capture)?;
        if out.success() {
            return Ok(StashPop::Applied {
                index_restored: false,
            });
        }
        if !self.conflicted_files()?.is_empty() {
            warn!("stash pop left conflicts");
            return Ok(StashPop::Conflicted);
        }
        Err(GitError::CommandFailed {
            command: format!("stash pop {}", entry),
            exit_code: out.exit_code,
            stderr: out.stderr.trim().to_string(),
        })
    }

    #[instrument(skip(self))]
    fn rebase(&self, onto: &str) -> Result<(), GitError> {
        self.runner
            .run(&["rebase", "--no-autostash", onto], OutputMode::Capture)?;
        Ok(())
    }

    #[instrument(skip(self))]
    fn merge(&self, from: &str) -> Result<(), GitError> {
        self.runner
            .run(&["merge", "--no-edit", from], OutputMode::Capture)?;
        Ok(())
    }

    fn rebase_abort(&self) -> Result<(), GitError> {
        self.runner.run(&["rebase", "--abort"], OutputMode::Capture)?;
        info!("rebase aborted");
        Ok(())
    }

    fn merge_abort(&self) -> Result<(), GitError> {
        self.runner.run(&["merge", "--abort"], OutputMode::Capture)?;
        info!("merge aborted");
        Ok(())
    }

    fn rebase_continue(&self) -> Result<(), GitError> {
        self.runner
            .run(&["rebase", "--continue"], OutputMode::Capture)?;
        Ok(())
    }

    fn merge_continue(&self) -> Result<(), GitError> {
        self.runner
            .run(&["merge", "--continue"], OutputMode::Capture)?;
        Ok(())
    }

    fn rebase_progress(&self) -> Result<Option<RebaseProgress>, GitError> {
        if let Some(dir) = self.git_path_exists("rebase-merge")? {
            return Ok(Some(RebaseProgress {
                current: read_counter(&dir, "msgnum"),
                total: read_counter(&dir, "end"),
            }));
        }
        if let Some(dir) = self.git_path_exists("rebase-apply")? {
            return Ok(Some(RebaseProgress {
                current: read_counter(&dir, "next"),
                total: read_counter(&dir, "last"),
            }));
        }
        Ok(None)
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        Ok(self.try_rev_parse("MERGE_HEAD")?.is_some())
    }

    #[instrument(skip(self))]
    fn push(
        &self,
        remote: &str,
        branch: &BranchRef,
        options: PushOptions,
    ) -> Result<PushOutcome, GitError> {
        let mut args = vec!["push"];
        if options.set_upstream {
            args.push("--set-upstream");
        }
        if options.force_with_lease {
            args.push("--force-with-lease");
        }
        args.push(remote);
        args.push(branch.as_str());

        let out = self.runner.run_raw(&args, OutputMode::Capture)?;
        if out.success() {
            info!(%branch, "push completed");
            return Ok(PushOutcome::Pushed);
        }
        match classify_push_rejection(&out.stderr) {
            Some(rejection) => {
                warn!(%branch, "push rejected");
                Ok(rejection)
            }
            None => Err(GitError::CommandFailed {
                command: args.join(" "),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_string(),
            }),
        }
    }

    fn log_range(&self, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        let range = format!("{}..{}", from, to);
        let out = self.runner.stdout(&["log", "--oneline", &range])?;
        Ok(out.lines().map(str::to_string).collect())
    }

    fn diff_stat(&self, from: &str, to: &str) -> Result<String, GitError> {
        self.runner.stdout(&["diff", "--stat", from, to])
    }
}
