//! Scripted in-memory doubles for unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use proptest::strategy::Strategy;

use crate::errors::GitError;
use crate::git::{PushOptions, PushOutcome, RebaseProgress, StashPop, VcsGateway};
use crate::interact::{PromptError, Prompter, Reporter};
use crate::models::{BranchRef, WorkingTreeStatus};

/// Conflicted files (path, content) written when a scripted step runs. An
/// empty content is a modify/delete conflict: unmerged, but no file is written.
pub type ConflictStep = Vec<(&'static str, &'static str)>;

#[derive(Debug, Default)]
pub struct FakeState {
    pub branch: String,
    pub detached: bool,
    pub dirty: bool,
    pub staged: Vec<String>,
    pub untracked: Vec<String>,
    pub stashes: Vec<String>,
    pub pop_conflicts: bool,
    pub pop_without_index: bool,
    pub fetch_fails: bool,
    pub apply_fails: bool,
    /// One entry per rebase/merge/continue call; empty means it succeeds.
    pub steps: VecDeque<ConflictStep>,
    pub conflicted: Vec<String>,
    /// Unmerged paths without conflict markers (modify/delete).
    pub unmerged_only: Vec<String>,
    pub in_progress: Option<&'static str>,
    pub rebase_total: usize,
    pub rebase_current: usize,
    pub refs: HashMap<String, String>,
    pub ahead_behind: (usize, usize),
    pub push_results: VecDeque<PushOutcome>,
    pub calls: Vec<String>,
}

/// A [`VcsGateway`] whose repository is a handful of fields.
///
/// Conflicted files are real files under a temp dir so the resolver can read
/// and rewrite them.
pub struct FakeGateway {
    root: tempfile::TempDir,
    pub state: RefCell<FakeState>,
}

impl FakeGateway {
    pub fn on_branch(branch: &str) -> Self {
        let state = FakeState {
            branch: branch.to_string(),
            ..Default::default()
        };
        Self {
            root: tempfile::tempdir().expect("tempdir"),
            state: RefCell::new(state),
        }
    }

    pub fn root_path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.borrow().calls.clone()
    }

    pub fn called(&self, call: &str) -> bool {
        self.state.borrow().calls.iter().any(|c| c == call)
    }

    fn record(&self, call: impl Into<String>) {
        self.state.borrow_mut().calls.push(call.into());
    }

    fn failure(command: &str, stderr: &str) -> GitError {
        GitError::CommandFailed {
            command: command.to_string(),
            exit_code: 1,
            stderr: stderr.to_string(),
        }
    }

    /// Run the next scripted step for an apply or continue command.
    fn step(&self, command: &str, kind: &'static str) -> Result<(), GitError> {
        let mut state = self.state.borrow_mut();
        if state.apply_fails {
            return Err(Self::failure(command, "fatal: invalid upstream"));
        }
        state.in_progress = Some(kind);
        if kind == "rebase" && state.rebase_total > 0 {
            state.rebase_current += 1;
        }
        let step = state.steps.pop_front().unwrap_or_default();
        if step.is_empty() {
            state.in_progress = None;
            state.conflicted.clear();
            state.unmerged_only.clear();
            return Ok(());
        }
        for (path, content) in step {
            if content.is_empty() {
                state.unmerged_only.push(path.to_string());
                continue;
            }
            std::fs::write(self.root.path().join(path), content).expect("write conflict file");
            state.conflicted.push(path.to_string());
        }
        Err(Self::failure(command, "CONFLICT (content): Merge conflict"))
    }
}

impl VcsGateway for FakeGateway {
    fn root(&self) -> &Path {
        self.root.path()
    }

    fn current_branch(&self, fallback: &BranchRef) -> Result<BranchRef, GitError> {
        let state = self.state.borrow();
        if state.detached {
            return Err(GitError::DetachedHead);
        }
        let branch = state.branch.clone();
        if branch.is_empty() {
            Ok(fallback.clone())
        } else {
            BranchRef::new(branch)
        }
    }

    fn fetch(&self, remote: &str) -> Result<(), GitError> {
        self.record(format!("fetch {}", remote));
        if self.state.borrow().fetch_fails {
            return Err(Self::failure("fetch", "fatal: could not read from remote"));
        }
        Ok(())
    }

    fn ahead_behind(&self, _a: &str, _b: &str) -> Result<(usize, usize), GitError> {
        Ok(self.state.borrow().ahead_behind)
    }

    fn rev_parse(&self, rev: &str) -> Result<String, GitError> {
        self.try_rev_parse(rev)?
            .ok_or_else(|| Self::failure("rev-parse", "fatal: bad revision"))
    }

    fn try_rev_parse(&self, rev: &str) -> Result<Option<String>, GitError> {
        Ok(self.state.borrow().refs.get(rev).cloned())
    }

    fn update_branch(
        &self,
        branch: &BranchRef,
        new: &str,
        _expected_old: &str,
    ) -> Result<(), GitError> {
        self.record(format!("update-ref {} {}", branch, new));
        self.state
            .borrow_mut()
            .refs
            .insert(format!("refs/heads/{}", branch), new.to_string());
        Ok(())
    }

    fn status(&self) -> Result<WorkingTreeStatus, GitError> {
        let state = self.state.borrow();
        Ok(WorkingTreeStatus {
            has_staged: state.dirty && !state.staged.is_empty(),
            has_unstaged: state.dirty,
            has_untracked: state.dirty && !state.untracked.is_empty(),
        })
    }

    fn staged_files(&self) -> Result<Vec<String>, GitError> {
        Ok(self.state.borrow().staged.clone())
    }

    fn conflicted_files(&self) -> Result<Vec<String>, GitError> {
        Ok(self.state.borrow().conflicted.clone())
    }

    fn unmerged_files(&self) -> Result<Vec<String>, GitError> {
        let state = self.state.borrow();
        Ok(state
            .conflicted
            .iter()
            .chain(&state.unmerged_only)
            .cloned()
            .collect())
    }

    fn is_tracked(&self, path: &str) -> Result<bool, GitError> {
        Ok(!self.state.borrow().untracked.iter().any(|p| p == path))
    }

    fn add(&self, paths: &[String]) -> Result<(), GitError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.record(format!("add {}", paths.join(" ")));
        let mut state = self.state.borrow_mut();
        state.conflicted.retain(|p| !paths.contains(p));
        state.unmerged_only.retain(|p| !paths.contains(p));
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<(), GitError> {
        self.record(format!("commit {}", message));
        Ok(())
    }

    fn stash_push(&self, message: &str) -> Result<Option<String>, GitError> {
        self.record("stash push");
        let mut state = self.state.borrow_mut();
        if !state.dirty {
            return Ok(None);
        }
        let commit = format!("stash{}-{}", state.stashes.len(), message.len());
        state.stashes.insert(0, commit.clone());
        state.dirty = false;
        Ok(Some(commit))
    }

    fn find_stash(&self, stash_commit: &str) -> Result<Option<String>, GitError> {
        Ok(self
            .state
            .borrow()
            .stashes
            .iter()
            .position(|c| c == stash_commit)
            .map(|i| format!("stash@{{{}}}", i)))
    }

    fn stash_pop(&self, stash_commit: &str, _prefer_index: bool) -> Result<StashPop, GitError> {
        self.record("stash pop");
        let mut state = self.state.borrow_mut();
        let Some(pos) = state.stashes.iter().position(|c| c == stash_commit) else {
            return Err(GitError::StashNotFound(stash_commit.to_string()));
        };
        if state.pop_conflicts {
            return Ok(StashPop::Conflicted);
        }
        state.stashes.remove(pos);
        state.dirty = true;
        Ok(StashPop::Applied {
            index_restored: !state.pop_without_index,
        })
    }

    fn rebase(&self, onto: &str) -> Result<(), GitError> {
        self.record(format!("rebase {}", onto));
        self.step("rebase", "rebase")
    }

    fn merge(&self, from: &str) -> Result<(), GitError> {
        self.record(format!("merge {}", from));
        self.step("merge", "merge")
    }

    fn rebase_abort(&self) -> Result<(), GitError> {
        self.record("rebase --abort");
        let mut state = self.state.borrow_mut();
        state.in_progress = None;
        state.conflicted.clear();
        state.unmerged_only.clear();
        Ok(())
    }

    fn merge_abort(&self) -> Result<(), GitError> {
        self.record("merge --abort");
        let mut state = self.state.borrow_mut();
        state.in_progress = None;
        state.conflicted.clear();
        state.unmerged_only.clear();
        Ok(())
    }

    fn rebase_continue(&self) -> Result<(), GitError> {
        self.record("rebase --continue");
        self.step("rebase --continue", "rebase")
    }

    fn merge_continue(&self) -> Result<(), GitError> {
        self.record("merge --continue");
        self.step("merge --continue", "merge")
    }

    fn rebase_progress(&self) -> Result<Option<RebaseProgress>, GitError> {
        let state = self.state.borrow();
        Ok((state.in_progress == Some("rebase")).then(|| RebaseProgress {
            current: state.rebase_current.max(1),
            total: state.rebase_total.max(1),
        }))
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        Ok(self.state.borrow().in_progress == Some("merge"))
    }

    fn push(
        &self,
        remote: &str,
        branch: &BranchRef,
        options: PushOptions,
    ) -> Result<PushOutcome, GitError> {
        let mut call = format!("push {} {}", remote, branch);
        if options.set_upstream {
            call.push_str(" --set-upstream");
        }
        if options.force_with_lease {
            call.push_str(" --force-with-lease");
        }
        self.record(call);
        Ok(self
            .state
            .borrow_mut()
            .push_results
            .pop_front()
            .unwrap_or(PushOutcome::Pushed))
    }

    fn log_range(&self, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        self.record(format!("log {}..{}", from, to));
        Ok(vec!["abc1234 change only on the remote".to_string()])
    }

    fn diff_stat(&self, from: &str, to: &str) -> Result<String, GitError> {
        self.record(format!("diff --stat {} {}", from, to));
        Ok(" src/lib.rs | 2 +-\n 1 file changed".to_string())
    }
}

/// One generated conflict block: (current, incoming, diff3 ancestor).
pub type GeneratedBlock = (String, String, Option<String>);

/// A line that can never be read as a conflict marker: it starts with an
/// alphanumeric, though marker characters may follow.
fn plain_line() -> impl proptest::strategy::Strategy<Value = String> {
    proptest::string::string_regex("[a-z0-9][a-z0-9 ]{0,8}[=<>|]{0,7}[a-z0-9 ]{0,6}")
        .expect("valid line regex")
        .prop_map(|line| line + "\n")
}

fn plain_text(max_lines: usize) -> impl proptest::strategy::Strategy<Value = String> {
    proptest::collection::vec(plain_line(), 0..=max_lines).prop_map(|lines| lines.concat())
}

/// File content holding 0 to 5 conflict blocks, with the blocks that were
/// written into it.
pub fn conflicted_file() -> impl proptest::strategy::Strategy<Value = (String, Vec<GeneratedBlock>)> {
    let block = (
        plain_text(2),
        plain_text(3),
        plain_text(3),
        proptest::option::of(plain_text(2)),
    );
    (proptest::collection::vec(block, 0..=5), plain_text(2)).prop_map(|(parts, tail)| {
        let mut content = String::new();
        let mut blocks = Vec::with_capacity(parts.len());
        for (before, current, incoming, ancestor) in parts {
            content.push_str(&before);
            content.push_str("<<<<<<< HEAD\n");
            content.push_str(&current);
            if let Some(base) = &ancestor {
                content.push_str("||||||| merged common ancestors\n");
                content.push_str(base);
            }
            content.push_str("=======\n");
            content.push_str(&incoming);
            content.push_str(">>>>>>> feature\n");
            blocks.push((current, incoming, ancestor));
        }
        content.push_str(&tail);
        (content, blocks)
    })
}

/// Scripted prompt answer.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Confirm(bool),
    Select(usize),
}

/// A [`Prompter`] that replays answers in order and records questions.
///
/// Running out of answers, or a mismatched answer kind, is reported as an
/// interrupted prompt.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    pub answers: VecDeque<Answer>,
    pub questions: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            questions: Vec::new(),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&mut self, question: &str, _default: bool) -> Result<bool, PromptError> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(Answer::Confirm(yes)) => Ok(yes),
            _ => Err(PromptError::Interrupted),
        }
    }

    fn select(
        &mut self,
        question: &str,
        _items: &[&str],
        _default: usize,
    ) -> Result<usize, PromptError> {
        self.questions.push(question.to_string());
        match self.answers.pop_front() {
            Some(Answer::Select(i)) => Ok(i),
            _ => Err(PromptError::Interrupted),
        }
    }
}

/// A [`Reporter`] that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub lines: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.borrow().iter().any(|l| l.contains(needle))
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, msg: &str) {
        self.lines.borrow_mut().push(format!("info: {}", msg));
    }

    fn success(&self, msg: &str) {
        self.lines.borrow_mut().push(format!("ok: {}", msg));
    }

    fn warn(&self, msg: &str) {
        self.lines.borrow_mut().push(format!("warn: {}", msg));
    }

    fn error(&self, msg: &str) {
        self.lines.borrow_mut().push(format!("error: {}", msg));
    }
}
