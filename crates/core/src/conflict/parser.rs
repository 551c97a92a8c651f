//! Conflict-marker parsing.
//!
//! Turns file content written by a conflicted rebase or merge into
//! [`ConflictBlock`]s. Each side's text is kept byte-for-byte, including line
//! terminators, so replacing a block's span with one side reproduces that
//! side exactly.

use serde::Serialize;

const START_MARKER: &str = "<<<<<<<";
const ANCESTOR_MARKER: &str = "|||||||";
const SEPARATOR_MARKER: &str = "=======";
const END_MARKER: &str = ">>>>>>>";

/// One conflicted region of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictBlock {
    /// 1-indexed line of the start marker.
    pub start_line: usize,
    /// 1-indexed line of the end marker (inclusive).
    pub end_line: usize,
    pub current: String,
    pub incoming: String,
    /// Common-ancestor text from a diff3-style `|||||||` section.
    pub ancestor: Option<String>,
}

impl ConflictBlock {
    /// Number of lines spanned, marker lines included.
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

/// Split content into lines that keep their terminators.
pub fn split_lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

/// A marker is the 7-character run alone or followed by whitespace and a label.
fn is_marker(line: &str, marker: &str) -> bool {
    let line = line.trim_end_matches(['\n', '\r']);
    match line.strip_prefix(marker) {
        Some(rest) => rest.is_empty() || rest.starts_with(' ') || rest.starts_with('\t'),
        None => false,
    }
}

enum Section {
    Outside,
    Current,
    Ancestor,
    Incoming,
}

/// Parse every complete conflict block in `content`, in source order.
///
/// An unterminated block is ignored. A start marker seen inside an open
/// block restarts the block at the new marker.
pub fn parse(content: &str) -> Vec<ConflictBlock> {
    let mut blocks = Vec::new();
    let mut section = Section::Outside;
    let mut start_line = 0;
    let mut current = String::new();
    let mut ancestor: Option<String> = None;
    let mut incoming = String::new();

    for (idx, line) in split_lines(content).into_iter().enumerate() {
        let line_no = idx + 1;

        if is_marker(line, START_MARKER) {
            section = Section::Current;
            start_line = line_no;
            current.clear();
            incoming.clear();
            ancestor = None;
            continue;
        }

        match section {
            Section::Outside => {}
            Section::Current => {
                if is_marker(line, ANCESTOR_MARKER) {
                    section = Section::Ancestor;
                    ancestor = Some(String::new());
                } else if is_marker(line, SEPARATOR_MARKER) {
                    section = Section::Incoming;
                } else {
                    current.push_str(line);
                }
            }
            Section::Ancestor => {
                if is_marker(line, SEPARATOR_MARKER) {
                    section = Section::Incoming;
                } else if let Some(base) = ancestor.as_mut() {
                    base.push_str(line);
                }
            }
            Section::Incoming => {
                if is_marker(line, END_MARKER) {
                    blocks.push(ConflictBlock {
                        start_line,
                        end_line: line_no,
                        current: std::mem::take(&mut current),
                        incoming: std::mem::take(&mut incoming),
                        ancestor: ancestor.take(),
                    });
                    section = Section::Outside;
                } else {
                    incoming.push_str(line);
                }
            }
        }
    }

    blocks
}

/// True when `content` contains at least one complete conflict block.
pub fn has_conflicts(content: &str) -> bool {
    !parse(content).is_empty()
}
