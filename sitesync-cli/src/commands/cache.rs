//! `sitesync cache`: restore, save, clean or inspect the build cache.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;

use sitesync_build::{BuildCache, CacheReport};
use sitesync_core::SiteConfig;

use super::format_bytes;

#[derive(Args, Debug, Default)]
pub struct CacheArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Copy cached pages into the output directory.
    Restore(CacheArgs),
    /// Copy the output directory (and compiled assets) into the cache.
    Save(CacheArgs),
    /// Delete the cache.
    Clean(CacheArgs),
    /// Show cache size and entry counts.
    Stats(CacheArgs),
}

#[derive(Serialize)]
struct CopyJson<'a> {
    action: &'a str,
    #[serde(flatten)]
    report: CacheReport,
}

pub fn run(command: CacheCommand, config: &SiteConfig) -> Result<()> {
    let cache = BuildCache::from_config(config);
    match command {
        CacheCommand::Restore(args) => {
            let report = cache.restore().context("cache restore failed")?;
            print_copy("restore", report, &args)
        }
        CacheCommand::Save(args) => {
            let report = cache.save().context("cache save failed")?;
            print_copy("save", report, &args)
        }
        CacheCommand::Clean(args) => {
            let removed = cache.clean().context("cache clean failed")?;
            if args.json {
                println!("{}", serde_json::json!({ "action": "clean", "removed": removed }));
            } else if removed {
                println!("{} removed {}", "✓".green().bold(), cache.root().display());
            } else {
                println!("Nothing to clean at {}", cache.root().display());
            }
            Ok(())
        }
        CacheCommand::Stats(args) => {
            let stats = cache.stats().context("failed to read cache")?;
            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).context("failed to serialize cache stats")?
                );
            } else if !stats.exists {
                println!("No build cache at {}", stats.root.display());
            } else {
                println!(
                    "{}: {} pages, {} assets, {}",
                    stats.root.display(),
                    stats.pages,
                    stats.assets,
                    format_bytes(stats.total_bytes)
                );
            }
            Ok(())
        }
    }
}

fn print_copy(action: &str, report: CacheReport, args: &CacheArgs) -> Result<()> {
    if args.json {
        let payload = CopyJson { action, report };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize cache report")?
        );
        return Ok(());
    }
    println!(
        "{} cache {action}: {} copied, {} unchanged ({})",
        "✓".green().bold(),
        report.copied,
        report.unchanged,
        format_bytes(report.bytes_copied)
    );
    Ok(())
}
