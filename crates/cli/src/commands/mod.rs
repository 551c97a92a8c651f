//! Subcommands that operate on the repository in the current directory.
//!
//! Each runs on a blocking thread and returns a [`Finished`] value that the
//! caller turns into an exit code (and, in JSON mode, the only stdout line).

pub mod conflicts;
pub mod push;
pub mod resolve;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use serde::Serialize;

use branchsync_core::config::AppConfig;
use branchsync_core::git::GitCli;
use branchsync_core::interact::CancelFlag;
use branchsync_core::sync_engine::SyncOptions;

use crate::terminal::{ConsoleReporter, Verbosity};

/// Everything a subcommand needs besides its own arguments.
#[derive(Debug, Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub verbosity: Verbosity,
    pub cancel: CancelFlag,
}

impl AppContext {
    pub fn reporter(&self) -> ConsoleReporter {
        ConsoleReporter::new(self.verbosity)
    }

    /// Open the repository containing the current directory.
    pub fn open_repo(&self) -> Result<GitCli> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let gateway = GitCli::open(&cwd).context("failed to open git repository")?;
        Ok(gateway.with_live_output(self.verbosity == Verbosity::Normal))
    }

    /// Prompts are only shown on a terminal and never in JSON mode.
    pub fn interactive(&self, disabled: bool) -> bool {
        !disabled && self.verbosity != Verbosity::Json && console::Term::stderr().is_term()
    }

    pub fn sync_options(&self, interactive: bool, auto_yes: bool) -> Result<SyncOptions> {
        Ok(SyncOptions {
            remote: self.config.sync.remote.clone(),
            interactive,
            auto_yes,
            default_branch: self.config.default_branch()?,
        })
    }
}

/// Result of a subcommand.
#[derive(Debug)]
pub struct Finished {
    pub success: bool,
    pub json: serde_json::Value,
}

impl Finished {
    pub fn new<T: Serialize>(success: bool, value: &T) -> Result<Self> {
        Ok(Self {
            success,
            json: serde_json::to_value(value).context("failed to serialize result")?,
        })
    }
}
