//! Terminal implementations of the engine's prompt and output surfaces.

use dialoguer::{Confirm, Select};

use branchsync_core::interact::{PromptError, Prompter, Reporter};

use crate::style;

/// How much free text reaches the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Normal,
    /// Informational lines suppressed.
    Quiet,
    /// No free text at all; a single JSON result is printed at the end.
    Json,
}

impl Verbosity {
    pub fn from_flags(quiet: bool, json: bool) -> Self {
        if json {
            Self::Json
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }
}

/// Prompts on the controlling terminal via `dialoguer`.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

fn prompt_error(e: dialoguer::Error) -> PromptError {
    match e {
        dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
            PromptError::Interrupted
        }
        dialoguer::Error::IO(io) => PromptError::Io(io),
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool, PromptError> {
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }

    fn select(
        &mut self,
        question: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, PromptError> {
        Select::new()
            .with_prompt(question)
            .items(items)
            .default(default)
            .interact()
            .map_err(prompt_error)
    }
}

/// Styled status lines on stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    verbosity: Verbosity,
}

impl ConsoleReporter {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    fn shows(&self, informational: bool) -> bool {
        match self.verbosity {
            Verbosity::Normal => true,
            Verbosity::Quiet => !informational,
            Verbosity::Json => false,
        }
    }
}

impl Reporter for ConsoleReporter {
    fn info(&self, msg: &str) {
        if self.shows(true) {
            println!("{}", msg);
        }
    }

    fn success(&self, msg: &str) {
        if self.shows(false) {
            println!("{}", style::success(msg));
        }
    }

    fn warn(&self, msg: &str) {
        if self.shows(false) {
            println!("{}", style::warn(msg));
        }
    }

    fn error(&self, msg: &str) {
        if self.shows(false) {
            eprintln!("{}", style::error(msg));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Json);
    }

    #[test]
    fn test_quiet_hides_only_info() {
        let quiet = ConsoleReporter::new(Verbosity::Quiet);
        assert!(!quiet.shows(true));
        assert!(quiet.shows(false));
        let json = ConsoleReporter::new(Verbosity::Json);
        assert!(!json.shows(false));
    }
}
