//! Conflict-marker parsing and resolution.
//!
//! 1. **Parsing** -- turning marker-delimited file content into blocks.
//! 2. **Resolution** -- deciding each block, rewriting and re-staging files.

pub mod parser;
pub mod resolver;

pub use parser::{parse, ConflictBlock};
pub use resolver::{
    BlockContext, ConflictResolver, FileConflictSet, PromptStrategy, ResolutionChoice,
    ResolutionReport, ResolutionStrategy,
};
