//! sitesync: content sync and incremental static build.
//!
//! # Usage
//!
//! ```text
//! sitesync [--config <file>] sync [--dry-run]
//! sitesync [--config <file>] build [--full]
//! sitesync [--config <file>] run [--full]
//! sitesync [--config <file>] cache restore|save|clean|stats [--json]
//! sitesync [--config <file>] status [--json]
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the `info` default); stdout
//! carries summaries and `--json` output.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{
    build::{BuildArgs, RunArgs},
    cache::CacheCommand,
    status::StatusArgs,
    sync::SyncArgs,
};
use sitesync_core::SiteConfig;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "sitesync",
    version,
    about = "Sync a CMS content API into a local snapshot and build the static site",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ./sitesync.yaml, then the user config dir).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch all content, diff it against the last build and store the snapshot.
    Sync(SyncArgs),

    /// Render changed routes from the stored snapshot.
    Build(BuildArgs),

    /// Sync and build in one process.
    Run(RunArgs),

    /// Manage the build cache.
    Cache {
        #[command(subcommand)]
        command: CacheCommand,
    },

    /// Show manifest, snapshot and cache state.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = SiteConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Sync(args) => args.run(&config).await,
        Commands::Build(args) => args.run(&config).await,
        Commands::Run(args) => args.run(&config).await,
        Commands::Cache { command } => commands::cache::run(command, &config),
        Commands::Status(args) => args.run(&config),
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
