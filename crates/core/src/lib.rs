//! branchsync core library.
//!
//! This crate keeps a feature branch in step with its base branch without
//! losing uncommitted work: the git gateway, the working-tree guard, conflict
//! parsing and resolution, the sync orchestrator and push recovery.

pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod guard;
pub mod interact;
pub mod models;
pub mod push;
pub mod sync_engine;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience.
pub use config::AppConfig;
pub use git::GitCli;
pub use guard::WorkingTreeGuard;
pub use push::{PushRecoveryController, PushReport};
pub use sync_engine::{SyncOptions, SyncOrchestrator};
