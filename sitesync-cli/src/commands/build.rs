//! `sitesync build` and `sitesync run`.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sitesync_build::{pipeline, BuildSummary};
use sitesync_core::SiteConfig;

use super::sync::print_sync;

/// Arguments for `sitesync build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Render every route, ignoring the diff.
    #[arg(long)]
    pub full: bool,
}

impl BuildArgs {
    pub async fn run(self, config: &SiteConfig) -> Result<()> {
        let summary = pipeline::build(config, self.full)
            .await
            .context("build failed")?;
        print_build(&summary);
        Ok(())
    }
}

/// Arguments for `sitesync run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Render every route, ignoring the diff.
    #[arg(long)]
    pub full: bool,
}

impl RunArgs {
    pub async fn run(self, config: &SiteConfig) -> Result<()> {
        let summary = pipeline::run(config, self.full)
            .await
            .context("sync + build failed")?;
        print_sync(&summary.sync);
        print_build(&summary.build);
        Ok(())
    }
}

pub(crate) fn print_build(summary: &BuildSummary) {
    let mode = match &summary.reason {
        Some(reason) => format!("full build ({reason})"),
        None => format!("partial build ({} changed routes)", summary.changed_routes),
    };
    let mark = if summary.failed.is_empty() {
        "✓".green().bold()
    } else {
        "✗".red().bold()
    };
    println!(
        "{mark} {mode}: rendered {} of {} routes ({} written, {} unchanged, {} failed)",
        summary.selected,
        summary.routes_total,
        summary.written,
        summary.unchanged,
        summary.failed.len(),
    );
    if summary.evicted > 0 {
        println!("  evicted {} stale documents", summary.evicted);
    }
    println!(
        "  cache: {} restored, {} saved · sitemap: {} urls",
        summary.cache_restored.copied, summary.cache_saved.copied, summary.sitemap_entries
    );
    for failure in &summary.failed {
        println!("  {} {}: {}", "✗".red(), failure.route, failure.error);
    }
}
