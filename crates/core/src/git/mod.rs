//! Git operations for branchsync.

pub mod client;
pub mod gateway;
pub mod runner;

pub use client::GitCli;
pub use gateway::{PushOptions, PushOutcome, RebaseProgress, StashPop, VcsGateway};
pub use runner::{CommandOutput, GitRunner, OutputMode};
