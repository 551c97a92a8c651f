//! Block-by-block resolution of conflicted files.
//!
//! The [`ConflictResolver`] walks every file the gateway reports as
//! conflicted, asks a [`ResolutionStrategy`] what to do with each block, and
//! writes and stages files whose blocks were all resolved. Interactive and
//! scripted callers share the same pass; only the strategy differs.

use std::borrow::Cow;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::parser::{self, split_lines, ConflictBlock};
use crate::errors::ConflictError;
use crate::git::VcsGateway;
use crate::interact::{is_cancelled, CancelFlag, Prompter, Reporter};

/// What to do with one conflict block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionChoice {
    KeepCurrent,
    KeepIncoming,
    KeepBoth,
    Skip,
    AbortAll,
}

impl ResolutionChoice {
    /// Menu order used by interactive prompts.
    pub const ALL: [ResolutionChoice; 5] = [
        Self::KeepCurrent,
        Self::KeepIncoming,
        Self::KeepBoth,
        Self::Skip,
        Self::AbortAll,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::KeepCurrent => "Keep current (ours)",
            Self::KeepIncoming => "Keep incoming (theirs)",
            Self::KeepBoth => "Keep both (current, then incoming)",
            Self::Skip => "Skip (leave markers for manual editing)",
            Self::AbortAll => "Abort all",
        }
    }

    /// Replacement text for `block`, or `None` when the block is left as-is.
    fn replacement(&self, block: &ConflictBlock) -> Option<String> {
        match self {
            Self::KeepCurrent => Some(block.current.clone()),
            Self::KeepIncoming => Some(block.incoming.clone()),
            Self::KeepBoth => Some(format!("{}{}", block.current, block.incoming)),
            Self::Skip | Self::AbortAll => None,
        }
    }
}

/// Snapshot of one conflicted file, taken once per resolution pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConflictSet {
    pub file_path: String,
    pub original_content: String,
    pub conflicts: Vec<ConflictBlock>,
}

impl FileConflictSet {
    pub fn from_content(file_path: impl Into<String>, content: String) -> Self {
        let conflicts = parser::parse(&content);
        Self {
            file_path: file_path.into(),
            original_content: content,
            conflicts,
        }
    }
}

/// Everything a strategy sees when deciding one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    pub file_path: &'a str,
    /// 1-indexed position of this block within the file.
    pub index: usize,
    pub total: usize,
    pub block: &'a ConflictBlock,
}

/// Per-block decision step.
pub trait ResolutionStrategy {
    fn choose(&mut self, ctx: &BlockContext<'_>) -> ResolutionChoice;
}

impl<F> ResolutionStrategy for F
where
    F: FnMut(&BlockContext<'_>) -> ResolutionChoice,
{
    fn choose(&mut self, ctx: &BlockContext<'_>) -> ResolutionChoice {
        self(ctx)
    }
}

/// Result of deciding every block of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResolution {
    /// Every block resolved; the new content has no markers left from this pass.
    Resolved(String),
    /// At least one block skipped. `content` has the other blocks applied;
    /// `changed` is false when nothing but skips were chosen.
    Partial { content: String, changed: bool },
    /// The operator asked to abort the whole pass.
    Aborted,
}

/// Ask `strategy` about each block of `set` and apply the answers.
///
/// Blocks are presented in source order and applied last-to-first, so an
/// applied replacement never shifts the line span of a block still pending.
pub fn resolve_file(
    set: &FileConflictSet,
    strategy: &mut dyn ResolutionStrategy,
    cancel: Option<&CancelFlag>,
) -> FileResolution {
    let total = set.conflicts.len();
    let mut choices = Vec::with_capacity(total);

    for (i, block) in set.conflicts.iter().enumerate() {
        if cancel.is_some_and(is_cancelled) {
            return FileResolution::Aborted;
        }
        let ctx = BlockContext {
            file_path: &set.file_path,
            index: i + 1,
            total,
            block,
        };
        let choice = strategy.choose(&ctx);
        debug!(file = %set.file_path, block = i + 1, ?choice, "block decided");
        if choice == ResolutionChoice::AbortAll {
            return FileResolution::Aborted;
        }
        choices.push(choice);
    }

    let mut lines: Vec<Cow<'_, str>> = split_lines(&set.original_content)
        .into_iter()
        .map(Cow::Borrowed)
        .collect();
    let mut skipped = false;
    let mut changed = false;

    for (block, choice) in set.conflicts.iter().zip(&choices).rev() {
        match choice.replacement(block) {
            Some(text) => {
                lines.splice(
                    block.start_line - 1..block.end_line,
                    std::iter::once(Cow::Owned(text)),
                );
                changed = true;
            }
            None => skipped = true,
        }
    }

    let content: String = lines.concat();
    if skipped {
        FileResolution::Partial { content, changed }
    } else {
        FileResolution::Resolved(content)
    }
}

/// Outcome of one resolution pass over all conflicted files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub files_resolved: Vec<String>,
    pub files_skipped: Vec<String>,
    pub aborted: bool,
}

impl ResolutionReport {
    /// True when every file was resolved and staged.
    pub fn is_complete(&self) -> bool {
        self.files_skipped.is_empty() && !self.aborted
    }
}

/// Drives a resolution pass against the repository.
pub struct ConflictResolver<'a, G: VcsGateway + ?Sized> {
    gateway: &'a G,
    reporter: &'a dyn Reporter,
    cancel: Option<CancelFlag>,
}

impl<'a, G: VcsGateway + ?Sized> ConflictResolver<'a, G> {
    pub fn new(gateway: &'a G, reporter: &'a dyn Reporter) -> Self {
        Self {
            gateway,
            reporter,
            cancel: None,
        }
    }

    /// Treat a raised flag as an abort before the next block.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Read and parse one conflicted file. `None` if it no longer exists.
    pub fn load(&self, path: &str) -> Result<Option<FileConflictSet>, ConflictError> {
        let full = self.gateway.root().join(path);
        match std::fs::read_to_string(&full) {
            Ok(content) => Ok(Some(FileConflictSet::from_content(path, content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                debug!(path, "conflicted file is not UTF-8");
                Ok(Some(FileConflictSet::from_content(path, String::new())))
            }
            Err(e) => Err(ConflictError::FileIo {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Resolve every currently conflicted file.
    pub fn resolve_all(
        &self,
        strategy: &mut dyn ResolutionStrategy,
    ) -> Result<ResolutionReport, ConflictError> {
        let files = self.gateway.conflicted_files()?;
        info!(count = files.len(), "resolving conflicted files");

        // Every file is snapshotted before the first question is asked.
        let mut sets = Vec::with_capacity(files.len());
        let mut report = ResolutionReport::default();
        for path in files {
            match self.load(&path)? {
                Some(set) if set.conflicts.is_empty() => {
                    self.reporter.warn(&format!(
                        "{}: no conflict markers found (binary or already edited), resolve it manually",
                        path
                    ));
                    report.files_skipped.push(path);
                }
                Some(set) => sets.push(set),
                None => {
                    self.reporter
                        .warn(&format!("{}: missing from the working tree, skipping", path));
                    report.files_skipped.push(path);
                }
            }
        }

        for set in &sets {
            self.reporter.info(&format!(
                "{}: {} conflict(s)",
                set.file_path,
                set.conflicts.len()
            ));
            match resolve_file(set, strategy, self.cancel.as_ref()) {
                FileResolution::Aborted => {
                    warn!(file = %set.file_path, "resolution aborted");
                    report.aborted = true;
                    return Ok(report);
                }
                FileResolution::Resolved(content) => {
                    self.write(&set.file_path, &content)?;
                    self.gateway.add(std::slice::from_ref(&set.file_path))?;
                    self.reporter
                        .success(&format!("{}: resolved and staged", set.file_path));
                    report.files_resolved.push(set.file_path.clone());
                }
                FileResolution::Partial { content, changed } => {
                    if changed {
                        self.write(&set.file_path, &content)?;
                    }
                    self.reporter.warn(&format!(
                        "{}: skipped block(s) left in place, file not staged",
                        set.file_path
                    ));
                    report.files_skipped.push(set.file_path.clone());
                }
            }
        }

        info!(
            resolved = report.files_resolved.len(),
            skipped = report.files_skipped.len(),
            "resolution pass complete"
        );
        Ok(report)
    }

    fn write(&self, path: &str, content: &str) -> Result<(), ConflictError> {
        let full = self.gateway.root().join(path);
        std::fs::write(&full, content).map_err(|e| ConflictError::FileIo {
            path: path.to_string(),
            source: e,
        })
    }
}

/// Interactive strategy: previews each block and asks the operator.
///
/// A prompt that fails (closed terminal, Ctrl+C) counts as `AbortAll`.
pub struct PromptStrategy<'p> {
    prompter: &'p mut dyn Prompter,
    reporter: &'p dyn Reporter,
}

impl<'p> PromptStrategy<'p> {
    pub fn new(prompter: &'p mut dyn Prompter, reporter: &'p dyn Reporter) -> Self {
        Self { prompter, reporter }
    }
}

impl ResolutionStrategy for PromptStrategy<'_> {
    fn choose(&mut self, ctx: &BlockContext<'_>) -> ResolutionChoice {
        self.reporter.info(&block_preview(ctx));
        let labels: Vec<&str> = ResolutionChoice::ALL.iter().map(|c| c.label()).collect();
        let question = format!(
            "{} (conflict {}/{}): how should this be resolved?",
            ctx.file_path, ctx.index, ctx.total
        );
        match self.prompter.select(&question, &labels, 0) {
            Ok(i) => ResolutionChoice::ALL
                .get(i)
                .copied()
                .unwrap_or(ResolutionChoice::AbortAll),
            Err(e) => {
                warn!(error = %e, "prompt failed, aborting resolution");
                ResolutionChoice::AbortAll
            }
        }
    }
}

/// Human-readable rendering of one block with a current→incoming diff.
pub fn block_preview(ctx: &BlockContext<'_>) -> String {
    let block = ctx.block;
    let mut out = format!(
        "── {} · conflict {}/{} · lines {}-{} ──\n",
        ctx.file_path, ctx.index, ctx.total, block.start_line, block.end_line
    );
    out.push_str("current:\n");
    push_indented(&mut out, &block.current);
    if let Some(base) = &block.ancestor {
        out.push_str("ancestor:\n");
        push_indented(&mut out, base);
    }
    out.push_str("incoming:\n");
    push_indented(&mut out, &block.incoming);

    let patch = diffy::create_patch(&block.current, &block.incoming);
    out.push_str("diff current → incoming:\n");
    let rendered = patch.to_string();
    for line in rendered
        .lines()
        .skip_while(|l| l.starts_with("---") || l.starts_with("+++"))
    {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn push_indented(out: &mut String, text: &str) {
    if text.is_empty() {
        out.push_str("    (empty)\n");
        return;
    }
    for line in text.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_BLOCKS: &str = "\
header
<<<<<<< HEAD
ours one
=======
theirs one
>>>>>>> feature
between
<<<<<<< HEAD
ours two
=======
theirs two
>>>>>>> feature
footer
";

    fn set() -> FileConflictSet {
        FileConflictSet::from_content("src/lib.rs", TWO_BLOCKS.to_string())
    }

    fn always(choice: ResolutionChoice) -> impl FnMut(&BlockContext<'_>) -> ResolutionChoice {
        move |_| choice
    }

    #[test]
    fn test_keep_current_everywhere() {
        let result = resolve_file(&set(), &mut always(ResolutionChoice::KeepCurrent), None);
        assert_eq!(
            result,
            FileResolution::Resolved("header\nours one\nbetween\nours two\nfooter\n".into())
        );
    }

    #[test]
    fn test_keep_incoming_and_both() {
        let mut seen = Vec::new();
        let mut strategy = |ctx: &BlockContext<'_>| {
            seen.push(ctx.index);
            if ctx.index == 1 {
                ResolutionChoice::KeepIncoming
            } else {
                ResolutionChoice::KeepBoth
            }
        };
        let result = resolve_file(&set(), &mut strategy, None);
        assert_eq!(
            result,
            FileResolution::Resolved(
                "header\ntheirs one\nbetween\nours two\ntheirs two\nfooter\n".into()
            )
        );
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn test_keep_current_reduces_block_count() {
        let original = set();
        let mut first_only = |ctx: &BlockContext<'_>| {
            if ctx.index == 1 {
                ResolutionChoice::KeepCurrent
            } else {
                ResolutionChoice::Skip
            }
        };
        let FileResolution::Partial { content, changed } =
            resolve_file(&original, &mut first_only, None)
        else {
            panic!("expected partial resolution");
        };
        assert!(changed);
        let remaining = parser::parse(&content);
        assert_eq!(remaining.len(), original.conflicts.len() - 1);
        assert!(content.starts_with("header\nours one\nbetween\n"));
    }

    #[test]
    fn test_skip_preserves_marker_bytes() {
        let original = set();
        let mut second_skipped = |ctx: &BlockContext<'_>| {
            if ctx.index == 2 {
                ResolutionChoice::Skip
            } else {
                ResolutionChoice::KeepIncoming
            }
        };
        let FileResolution::Partial { content, .. } =
            resolve_file(&original, &mut second_skipped, None)
        else {
            panic!("expected partial resolution");
        };
        let skipped_span = "<<<<<<< HEAD\nours two\n=======\ntheirs two\n>>>>>>> feature\n";
        assert!(content.contains(skipped_span));
    }

    #[test]
    fn test_all_skipped_is_unchanged() {
        let result = resolve_file(&set(), &mut always(ResolutionChoice::Skip), None);
        assert_eq!(
            result,
            FileResolution::Partial {
                content: TWO_BLOCKS.to_string(),
                changed: false
            }
        );
    }

    #[test]
    fn test_abort_all_stops_immediately() {
        let mut asked = 0;
        let mut strategy = |_: &BlockContext<'_>| {
            asked += 1;
            ResolutionChoice::AbortAll
        };
        assert_eq!(resolve_file(&set(), &mut strategy, None), FileResolution::Aborted);
        assert_eq!(asked, 1);
    }

    #[test]
    fn test_cancel_flag_aborts() {
        let flag = crate::interact::new_cancel_flag();
        flag.store(true, std::sync::atomic::Ordering::SeqCst);
        let result = resolve_file(&set(), &mut always(ResolutionChoice::KeepCurrent), Some(&flag));
        assert_eq!(result, FileResolution::Aborted);
    }

    #[test]
    fn test_report_completeness() {
        let mut report = ResolutionReport::default();
        assert!(report.is_complete());
        report.files_skipped.push("a".into());
        assert!(!report.is_complete());
        let aborted = ResolutionReport {
            aborted: true,
            ..Default::default()
        };
        assert!(!aborted.is_complete());
    }

    #[test]
    fn test_block_preview_mentions_both_sides() {
        let set = set();
        let ctx = BlockContext {
            file_path: &set.file_path,
            index: 1,
            total: 2,
            block: &set.conflicts[0],
        };
        let preview = block_preview(&ctx);
        assert!(preview.contains("conflict 1/2"));
        assert!(preview.contains("ours one"));
        assert!(preview.contains("+theirs one"));
    }

    mod properties {
        use super::*;
        use crate::conflict::parse;
        use crate::testing::conflicted_file;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn keep_current_on_one_block_leaves_the_rest(
                (content, expected) in conflicted_file().prop_filter("needs a block", |(_, b)| !b.is_empty())
            ) {
                let set = FileConflictSet::from_content("gen.txt", content);
                let mut first = true;
                let mut strategy = |_: &BlockContext<'_>| {
                    if std::mem::replace(&mut first, false) {
                        ResolutionChoice::KeepCurrent
                    } else {
                        ResolutionChoice::Skip
                    }
                };

                let content = match resolve_file(&set, &mut strategy, None) {
                    FileResolution::Resolved(content) => {
                        prop_assert_eq!(expected.len(), 1);
                        content
                    }
                    FileResolution::Partial { content, changed } => {
                        prop_assert!(changed);
                        content
                    }
                    FileResolution::Aborted => {
                        return Err(TestCaseError::fail("unexpected abort"));
                    }
                };

                let remaining = parse(&content);
                prop_assert_eq!(remaining.len(), expected.len() - 1);
                for (block, (current, incoming, _)) in remaining.iter().zip(&expected[1..]) {
                    prop_assert_eq!(&block.current, current);
                    prop_assert_eq!(&block.incoming, incoming);
                }
                prop_assert!(content.contains(expected[0].0.as_str()));
            }
        }
    }
}
