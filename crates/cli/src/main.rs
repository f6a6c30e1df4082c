//! Scrub CLI - scrub command

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod cmd;
mod locks;
mod progress;
mod settings;
mod util;

/// Scrub - remove leaked secrets and oversized blobs from Git history
#[derive(Parser)]
#[command(name = "scrub")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Repository to operate on (default: current directory)
    #[arg(short = 'C', long = "repo", global = true, default_value = ".")]
    repo: PathBuf,

    /// Settings file (default: .scrub.toml in the work tree)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by `run` and `plan`, overriding the settings file
#[derive(Args, Debug, Default, Clone)]
pub struct RewriteArgs {
    /// Scanner report (gitleaks JSON or neutral findings JSON)
    #[arg(long)]
    pub findings: Option<PathBuf>,

    /// Prune blobs larger than this (bytes, or with K/M/G suffix)
    #[arg(long, value_name = "SIZE")]
    pub strip_blobs_bigger_than: Option<String>,

    /// Comma-separated refs whose blobs are never pruned
    #[arg(long, value_name = "REFS")]
    pub protect: Option<String>,

    /// Protect blobs reachable from every ref
    #[arg(long)]
    pub protect_all: bool,

    /// What replaces a pruned blob: omit or placeholder
    #[arg(long, value_name = "MODE")]
    pub drop_mode: Option<String>,

    /// Extra marker to redact from commit and tag messages (repeatable)
    #[arg(long = "redact-message", value_name = "TEXT")]
    pub message_literals: Vec<String>,

    /// Keep old tips under refs/scrub/original/
    #[arg(long)]
    pub backup_refs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Rewrite history, resuming an interrupted run if there is one
    Run {
        #[command(flatten)]
        rewrite: RewriteArgs,

        /// Discard any interrupted run and start over
        #[arg(long)]
        fresh: bool,

        /// Do not draw a progress bar
        #[arg(long)]
        no_progress: bool,
    },
    /// Show what a rewrite would change without writing anything
    Plan {
        #[command(flatten)]
        rewrite: RewriteArgs,

        /// Maximum number of introducing commits to list (default: 20)
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Show journal progress of the last or current run
    Status,
    /// Print the audit log of the last run
    Audit {
        /// Emit one JSON object per line
        #[arg(long)]
        json: bool,

        /// Only show the first N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Print statistics of the last run
    Stats {
        /// Print the raw stats.json document
        #[arg(long)]
        json: bool,
    },
    /// Show effective settings
    Config {
        /// Print the settings file path
        #[arg(long)]
        path: bool,

        /// Print an example settings file
        #[arg(long)]
        example: bool,
    },
}

/// Global options every command needs
pub struct Context {
    pub repo: PathBuf,
    pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    let ctx = Context {
        repo: cli.repo,
        config: cli.config,
    };

    match cli.command {
        Commands::Run {
            rewrite,
            fresh,
            no_progress,
        } => cmd::run::run(&ctx, rewrite, fresh, !no_progress).await,
        Commands::Plan { rewrite, limit } => cmd::plan::run(&ctx, rewrite, limit).await.map(|_| ExitCode::SUCCESS),
        Commands::Status => cmd::status::run(&ctx).await.map(|_| ExitCode::SUCCESS),
        Commands::Audit { json, limit } => cmd::audit::run(&ctx, json, limit).await.map(|_| ExitCode::SUCCESS),
        Commands::Stats { json } => cmd::stats::run(&ctx, json).await.map(|_| ExitCode::SUCCESS),
        Commands::Config { path, example } => {
            let result = if example {
                cmd::config::run_example().await
            } else if path {
                cmd::config::run_path(&ctx).await
            } else {
                cmd::config::run_show(&ctx).await
            };
            result.map(|_| ExitCode::SUCCESS)
        }
    }
}

/// Install the global subscriber
///
/// `RUST_LOG` wins over `-v`. The returned guard flushes the file writer on
/// drop and must live until exit.
fn init_logging(
    verbose: u8,
    log_file: Option<&std::path::Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);

            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter())
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}
