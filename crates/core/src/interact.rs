//! Operator-facing surfaces the engine calls into.
//!
//! The engine never reads a terminal or formats output itself. Prompts go
//! through a [`Prompter`], progress lines through a [`Reporter`], and an
//! operator interrupt is observed through a shared [`CancelFlag`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

/// Shared flag set when the operator interrupts the process.
pub type CancelFlag = Arc<AtomicBool>;

pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(flag: &CancelFlag) -> bool {
    flag.load(Ordering::SeqCst)
}

/// A prompt could not produce an answer.
///
/// Callers treat this the same as the operator choosing to abort.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt interrupted")]
    Interrupted,

    #[error("prompt I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Yes/no and choice prompts.
pub trait Prompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool, PromptError>;

    /// Returns the index into `items` of the chosen entry.
    fn select(&mut self, question: &str, items: &[&str], default: usize)
        -> Result<usize, PromptError>;
}

/// Structured progress lines for the operator.
pub trait Reporter {
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Reporter that only emits tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, msg: &str) {
        info!("{}", msg);
    }

    fn success(&self, msg: &str) {
        info!(success = true, "{}", msg);
    }

    fn warn(&self, msg: &str) {
        warn!("{}", msg);
    }

    fn error(&self, msg: &str) {
        error!("{}", msg);
    }
}
