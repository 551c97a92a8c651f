//! Configuration for branchsync.
//!
//! A small TOML file with three sections: `[sync]`, `[push]` and `[output]`.
//! Every field has a default, so a missing default config file is not an
//! error.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;
use crate::models::{BranchRef, SyncStrategy};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base branch and strategy used by `sync`.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Push and push-recovery behaviour.
    #[serde(default)]
    pub push: PushConfig,

    /// Operator-facing output.
    #[serde(default)]
    pub output: OutputConfig,
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

/// Settings for synchronising with the base branch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Remote that holds the base branch.
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch that feature work is synchronised against.
    #[serde(default = "default_branch")]
    pub base_branch: String,

    /// `rebase` or `merge`.
    #[serde(default)]
    pub strategy: SyncStrategy,

    /// Branch name assumed when HEAD is unborn or detached.
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            base_branch: default_branch(),
            strategy: SyncStrategy::default(),
            default_branch: default_branch(),
        }
    }
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "main".into()
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

/// Push recovery options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushConfig {
    /// Offer a sync-then-retry when a push is rejected as non-fast-forward.
    #[serde(default = "default_true")]
    pub auto_sync: bool,

    /// Push with `--force-with-lease` unless overridden on the command line.
    #[serde(default)]
    pub force_with_lease: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            auto_sync: true,
            force_with_lease: false,
        }
    }
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Suppress informational lines.
    #[serde(default)]
    pub quiet: bool,

    /// Emit only a final JSON result on stdout.
    #[serde(default)]
    pub json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            quiet: false,
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "warn".into()
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// `~/.config/branchsync/config.toml` (platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("branchsync").join("config.toml"))
    }

    /// Load an [`AppConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Load `explicit` if given (it must exist), otherwise the default path
    /// if it exists, otherwise built-in defaults. The result is validated.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load_from_file(path)?,
                None => {
                    debug!("no configuration file, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync.remote.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "sync.remote".into(),
                detail: "remote must not be empty".into(),
            });
        }
        BranchRef::new(self.sync.base_branch.as_str()).map_err(|e| ConfigError::InvalidValue {
            field: "sync.base_branch".into(),
            detail: e.to_string(),
        })?;
        BranchRef::new(self.sync.default_branch.as_str()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "sync.default_branch".into(),
                detail: e.to_string(),
            }
        })?;
        if !LOG_LEVELS.contains(&self.output.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "output.log_level".into(),
                detail: format!("must be one of {}", LOG_LEVELS.join(", ")),
            });
        }
        Ok(())
    }

    /// The configured base branch. Only valid after [`Self::validate`].
    pub fn base_branch(&self) -> Result<BranchRef, ConfigError> {
        BranchRef::new(self.sync.base_branch.as_str()).map_err(|e| ConfigError::InvalidValue {
            field: "sync.base_branch".into(),
            detail: e.to_string(),
        })
    }

    /// The unborn-HEAD fallback branch. Only valid after [`Self::validate`].
    pub fn default_branch(&self) -> Result<BranchRef, ConfigError> {
        BranchRef::new(self.sync.default_branch.as_str()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "sync.default_branch".into(),
                detail: e.to_string(),
            }
        })
    }

    /// Generate a default TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# branchsync configuration

[sync]
remote = "origin"
base_branch = "main"
strategy = "rebase"        # rebase | merge
default_branch = "main"    # used when HEAD has no commits yet

[push]
auto_sync = true           # offer sync-then-retry on non-fast-forward rejections
force_with_lease = false

[output]
log_level = "warn"         # trace | debug | info | warn | error
quiet = false
json = false
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toml() -> &'static str {
        r#"
[sync]
remote = "upstream"
base_branch = "develop"
strategy = "merge"

[push]
auto_sync = false
force_with_lease = true

[output]
log_level = "debug"
quiet = true
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.sync.remote, "upstream");
        assert_eq!(config.sync.base_branch, "develop");
        assert_eq!(config.sync.strategy, SyncStrategy::Merge);
        assert_eq!(config.sync.default_branch, "main");
        assert!(!config.push.auto_sync);
        assert!(config.push.force_with_lease);
        assert!(config.output.quiet);
        assert!(!config.output.json);
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.sync.remote, "origin");
        assert_eq!(config.sync.base_branch, "main");
        assert_eq!(config.sync.strategy, SyncStrategy::Rebase);
        assert!(config.push.auto_sync);
        assert_eq!(config.output.log_level, "warn");
        assert_eq!(config.base_branch().unwrap().as_str(), "main");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, sample_toml()).unwrap();

        let config = AppConfig::load_or_default(Some(&path)).expect("load failed");
        assert_eq!(config.output.log_level, "debug");
    }

    #[test]
    fn test_explicit_file_not_found() {
        let result = AppConfig::load_or_default(Some(Path::new("/nonexistent/branchsync.toml")));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sync\nremote = ").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: Result<AppConfig, _> = toml::from_str("[sync]\nstrategy = \"squash\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_empty_remote() {
        let mut config = AppConfig::default();
        config.sync.remote = "  ".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "sync.remote"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_branch() {
        let mut config = AppConfig::default();
        config.sync.base_branch = "bad..name".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "sync.base_branch"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.output.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_template_is_valid() {
        let config: AppConfig = toml::from_str(AppConfig::default_template())
            .expect("default template should be valid TOML");
        config.validate().unwrap();
    }
}
