//! Blocking runner for the `git` CLI.
//!
//! Every invocation disables the pager and terminal credential prompts so a
//! command can never stall waiting on input the engine does not provide.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::debug;

use crate::errors::GitError;

/// Whether a command's output is captured or shown to the operator live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Capture,
    Stream,
}

/// Result of one `git` invocation. Streamed commands have empty output fields.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs `git` in a fixed working directory.
#[derive(Debug, Clone)]
pub struct GitRunner {
    root: PathBuf,
    binary: String,
}

impl GitRunner {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            binary: "git".into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run a command and return its output whatever the exit status.
    pub fn run_raw(&self, args: &[&str], mode: OutputMode) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new(&self.binary);
        cmd.current_dir(&self.root)
            .args(args)
            .env("GIT_PAGER", "cat")
            .env("PAGER", "cat")
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .stdin(Stdio::null());

        debug!(cmd = %format!("git {}", args.join(" ")), "running git command");

        let spawn_err = |e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::NotFound {
                GitError::BinaryNotFound(self.binary.clone())
            } else {
                GitError::IoError(e)
            }
        };

        match mode {
            OutputMode::Capture => {
                let output = cmd
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .output()
                    .map_err(spawn_err)?;
                Ok(CommandOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code().unwrap_or(-1),
                })
            }
            OutputMode::Stream => {
                let status = cmd
                    .stdout(Stdio::inherit())
                    .stderr(Stdio::inherit())
                    .status()
                    .map_err(spawn_err)?;
                Ok(CommandOutput {
                    exit_code: status.code().unwrap_or(-1),
                    ..Default::default()
                })
            }
        }
    }

    /// Run a command, turning a non-zero exit into [`GitError::CommandFailed`].
    pub fn run(&self, args: &[&str], mode: OutputMode) -> Result<CommandOutput, GitError> {
        let output = self.run_raw(args, mode)?;
        if !output.success() {
            debug!(exit_code = output.exit_code, stderr = %output.stderr.trim(), "git command failed");
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a captured command and return trimmed stdout.
    pub fn stdout(&self, args: &[&str]) -> Result<String, GitError> {
        Ok(self.run(args, OutputMode::Capture)?.stdout.trim_end().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_maps_to_binary_not_found() {
        let mut runner = GitRunner::new(".");
        runner.binary = "definitely-not-a-real-git-binary".into();
        let err = runner.run(&["--version"], OutputMode::Capture).unwrap_err();
        assert!(matches!(err, GitError::BinaryNotFound(_)));
    }

    #[test]
    fn test_failure_is_returned_to_the_caller() {
        let dir = tempfile::TempDir::new().unwrap();
        let runner = GitRunner::new(dir.path());
        match runner.run(&["rev-parse", "--show-toplevel"], OutputMode::Capture) {
            Err(GitError::CommandFailed {
                command,
                exit_code,
                stderr,
            }) => {
                assert_eq!(command, "rev-parse --show-toplevel");
                assert_ne!(exit_code, 0);
                assert!(!stderr.is_empty());
            }
            Err(GitError::BinaryNotFound(_)) => eprintln!("SKIPPED: git not found in PATH"),
            other => panic!("expected a failed command, got {:?}", other),
        }
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput::default();
        assert!(ok.success());
        let failed = CommandOutput {
            exit_code: 128,
            ..Default::default()
        };
        assert!(!failed.success());
    }
}
