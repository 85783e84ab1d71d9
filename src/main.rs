//! Binary entry point for keepsake.
//!
//! This binary provides the CLI interface for pruning dated backup archives.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use keepsake::cli::{self, OutputFormat};
use keepsake::config::{CONFIG_PATH_ENV, KeepsakeConfig};
use keepsake::observability::{self, InitOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

/// Keepsake - retention and pruning for dated project backups.
#[derive(Parser)]
#[command(name = "keepsake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file (JSON, or TOML with a .toml extension).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Per-run overrides of the configured project and retention counts.
#[derive(Args, Debug, Default)]
struct TargetArgs {
    /// Project name.
    #[arg(short, long)]
    project: Option<String>,

    /// Backup base directory containing one directory per project.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Number of most recent backups to keep.
    #[arg(long)]
    daily: Option<u32>,

    /// Number of most recent Sunday backups to keep.
    #[arg(long)]
    weekly: Option<u32>,

    /// Number of months whose newest backup is kept.
    #[arg(long)]
    monthly: Option<u32>,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Delete backups no retention rule keeps.
    Prune {
        #[command(flatten)]
        target: TargetArgs,

        /// Show what would be deleted without deleting anything.
        #[arg(long)]
        dry_run: bool,

        /// Report format: table or json.
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Show the keep/delete decision and the rules behind it for every backup.
    Plan {
        #[command(flatten)]
        target: TargetArgs,

        /// Output format: table or json.
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Manage configuration.
    Config {
        /// Show the effective configuration.
        #[arg(long)]
        show: bool,
    },

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "keepsake", &mut io::stdout());
        return ExitCode::SUCCESS;
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config.with_env_overrides(),
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };
    let config = match &cli.command {
        Commands::Prune { target, .. } | Commands::Plan { target, .. } => {
            apply_target(config, target)
        },
        Commands::Config { .. } | Commands::Completions { .. } => config,
    };

    if !matches!(cli.command, Commands::Config { .. }) {
        if let Err(e) = observability::init_from_config(
            &config,
            InitOptions {
                verbose: cli.verbose,
                console_only: matches!(cli.command, Commands::Plan { .. }),
            },
        ) {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    }

    match run_command(cli.command, &config) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Run failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(command: Commands, config: &KeepsakeConfig) -> Result<ExitCode> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Prune {
            dry_run, format, ..
        } => {
            let format: OutputFormat = format.parse()?;
            info!(
                project = config.project_name.as_deref().unwrap_or_default(),
                dry_run, "Starting backup retention run"
            );
            let result = cli::cmd_prune(config, dry_run, format, &mut out)
                .context("prune failed")?;
            info!("{}", result.summary());
            Ok(if result.has_failures() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        },

        Commands::Plan { format, .. } => {
            cli::cmd_plan(config, format.parse()?, &mut out).context("plan failed")?;
            Ok(ExitCode::SUCCESS)
        },

        Commands::Config { show } => {
            if show {
                cli::cmd_config(config, &mut out)?;
            } else {
                writeln!(out, "Use --show to print the effective configuration")?;
            }
            Ok(ExitCode::SUCCESS)
        },

        Commands::Completions { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// Applies command-line overrides, which win over file and environment.
fn apply_target(mut config: KeepsakeConfig, target: &TargetArgs) -> KeepsakeConfig {
    if let Some(project) = &target.project {
        config = config.with_project_name(project.clone());
    }
    if let Some(dir) = &target.base_dir {
        config = config.with_backup_base_dir(dir.clone());
    }
    if let Some(daily) = target.daily {
        config.retention = config.retention.with_daily(daily);
    }
    if let Some(weekly) = target.weekly {
        config.retention = config.retention.with_weekly(weekly);
    }
    if let Some(monthly) = target.monthly {
        config.retention = config.retention.with_monthly(monthly);
    }
    config
}

/// Loads configuration: `--config`, then `KEEPSAKE_CONFIG_PATH`, then the
/// default location.
fn load_config(path: Option<&Path>) -> Result<KeepsakeConfig> {
    if let Some(config_path) = path {
        return KeepsakeConfig::load_from_file(config_path)
            .with_context(|| format!("loading {}", config_path.display()));
    }

    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        if !config_path.trim().is_empty() {
            return KeepsakeConfig::load_from_file(Path::new(&config_path))
                .with_context(|| format!("loading {config_path} from {CONFIG_PATH_ENV}"));
        }
    }

    KeepsakeConfig::load_default().context("loading the default configuration")
}
