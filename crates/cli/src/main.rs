//! `branchsync`: keep a feature branch in step with its base branch.
//!
//! The engine runs on a blocking thread while the async runtime watches for
//! SIGINT/SIGTERM; an interrupt raises the cancel flag and the engine unwinds
//! through its restore path before the process exits.

mod commands;
mod signals;
mod style;
mod terminal;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use branchsync_core::config::AppConfig;
use branchsync_core::interact::new_cancel_flag;
use branchsync_core::models::{BranchRef, SyncStrategy};

use commands::push::PushArgs;
use commands::sync::SyncArgs;
use commands::{AppContext, Finished};
use terminal::Verbosity;

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "branchsync",
    version,
    about = "Sync feature branches with their base without losing local work"
)]
struct Cli {
    /// Path to the TOML configuration file [default: ~/.config/branchsync/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Only print warnings, errors and results.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print a single JSON result on stdout and nothing else.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Rebase or merge the current branch onto the remote base branch.
    Sync {
        /// Base branch [default: sync.base_branch].
        #[arg(long)]
        base: Option<BranchRef>,

        /// rebase or merge [default: sync.strategy].
        #[arg(long)]
        strategy: Option<SyncStrategy>,

        /// Stash without asking.
        #[arg(short, long)]
        yes: bool,

        /// Never prompt; conflicts abort and restore.
        #[arg(long)]
        no_interactive: bool,
    },

    /// Push the current branch, syncing and retrying once if rejected.
    Push {
        #[arg(short = 'u', long)]
        set_upstream: bool,

        #[arg(long)]
        force_with_lease: bool,

        /// Sync and retry without asking. A stale lease is never overridden.
        #[arg(short, long)]
        yes: bool,
    },

    /// Resolve conflicts of a rebase or merge left in progress.
    Resolve,

    /// Show the current branch against its base.
    Status {
        #[arg(long)]
        base: Option<BranchRef>,
    },

    /// List the conflict blocks in a file.
    Conflicts {
        file: PathBuf,
    },

    /// Write a default configuration file.
    Init {
        /// Output path [default: ~/.config/branchsync/config.toml].
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Check a configuration file.
    Validate,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output, force } => {
            init_tracing("warn");
            return exit(cmd_init(output, force));
        }
        Commands::Validate => {
            init_tracing("warn");
            return exit(cmd_validate(cli.config.as_deref()));
        }
        _ => {}
    }

    let config = match AppConfig::load_or_default(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            let e = anyhow::Error::new(e).context("failed to load configuration");
            return report_error(cli.json, &e);
        }
    };
    init_tracing(&config.output.log_level);

    let verbosity = Verbosity::from_flags(
        cli.quiet || config.output.quiet,
        cli.json || config.output.json,
    );
    let ctx = AppContext {
        config,
        verbosity,
        cancel: new_cancel_flag(),
    };

    match run(ctx, cli.command).await {
        Ok(finished) => {
            if verbosity == Verbosity::Json {
                println!(
                    "{}",
                    serde_json::json!({ "success": finished.success, "result": finished.json })
                );
            }
            if finished.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => report_error(verbosity == Verbosity::Json, &e),
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn exit(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report_error(false, &e),
    }
}

fn report_error(json: bool, e: &anyhow::Error) -> ExitCode {
    if json {
        println!(
            "{}",
            serde_json::json!({ "success": false, "error": format!("{:#}", e) })
        );
    } else {
        eprintln!("Error: {:#}", e);
    }
    ExitCode::FAILURE
}

/// Run a repository command on a blocking thread with interrupts trapped.
async fn run(ctx: AppContext, command: Commands) -> Result<Finished> {
    signals::install_cancel_handler(ctx.cancel.clone())?;

    tokio::task::spawn_blocking(move || match command {
        Commands::Sync {
            base,
            strategy,
            yes,
            no_interactive,
        } => commands::sync::run(
            &ctx,
            SyncArgs {
                base,
                strategy,
                yes,
                no_interactive,
            },
        ),
        Commands::Push {
            set_upstream,
            force_with_lease,
            yes,
        } => commands::push::run(
            &ctx,
            PushArgs {
                set_upstream,
                force_with_lease,
                yes,
            },
        ),
        Commands::Resolve => commands::resolve::run(&ctx),
        Commands::Status { base } => commands::status::run(&ctx, base),
        Commands::Conflicts { file } => commands::conflicts::run(&ctx, &file),
        Commands::Init { .. } | Commands::Validate => {
            anyhow::bail!("configuration commands do not run against a repository")
        }
    })
    .await
    .context("command thread failed")?
}

// ---------------------------------------------------------------------------
// Configuration commands
// ---------------------------------------------------------------------------

fn config_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
    explicit
        .or_else(AppConfig::default_path)
        .context("could not determine a configuration directory; pass --output")
}

fn cmd_init(output: Option<PathBuf>, force: bool) -> Result<()> {
    let output = config_path(output)?;
    if output.exists() && !force {
        anyhow::bail!(
            "file already exists: {}. Use --force to overwrite it.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&output, AppConfig::default_template())
        .context("failed to write config file")?;

    println!("{}", style::success(&format!("configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Set sync.base_branch and sync.remote for your repository");
    println!("  2. Validate with: branchsync validate --config {}", output.display());
    println!("  3. From a feature branch, run: branchsync sync");
    Ok(())
}

fn cmd_validate(explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => config_path(None)?,
    };
    println!("Validating configuration: {}", path.display());
    println!();

    let config = AppConfig::load_from_file(&path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    if let Err(e) = config.validate() {
        println!("  [FAIL] {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All fields are valid");

    println!();
    println!("Configuration summary:");
    println!("  Remote        : {}", config.sync.remote);
    println!("  Base branch   : {}", config.sync.base_branch);
    println!("  Strategy      : {}", config.sync.strategy);
    println!("  Push auto-sync: {}", if config.push.auto_sync { "on" } else { "off" });
    println!(
        "  Lease by default: {}",
        if config.push.force_with_lease { "yes" } else { "no" }
    );
    println!("  Log level     : {}", config.output.log_level);
    Ok(())
}
