//! `sitesync sync`: fetch, diff and store the snapshot.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use sitesync_build::{pipeline, SyncSummary};
use sitesync_core::SiteConfig;

use super::format_bytes;

/// Arguments for `sitesync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Fetch and diff, but write neither the snapshot nor the pending manifest.
    #[arg(long)]
    pub dry_run: bool,
}

impl SyncArgs {
    pub async fn run(self, config: &SiteConfig) -> Result<()> {
        let summary = pipeline::sync(config, self.dry_run)
            .await
            .context("sync failed")?;
        print_sync(&summary);
        Ok(())
    }
}

pub(crate) fn print_sync(summary: &SyncSummary) {
    let prefix = if summary.dry_run { "[dry-run] " } else { "" };
    let counts = &summary.counts;
    println!(
        "{prefix}{} fetched {} posts, {} categories, {} tags, {} authors ({} media)",
        "✓".green().bold(),
        counts.posts,
        counts.categories,
        counts.tags,
        counts.authors,
        summary.media,
    );
    println!(
        "  requests: {} ({} retries, {} cooldowns)",
        summary.fetch.requests, summary.fetch.retries, summary.fetch.cooldowns
    );
    if !summary.fetch.resumed.is_empty() {
        println!("  resumed from checkpoint: {}", summary.fetch.resumed.join(", "));
    }

    let changes = &summary.changes;
    match &changes.reason {
        Some(reason) => println!("  {} full rebuild required: {reason}", "!".yellow().bold()),
        None => println!(
            "  changes: {} added, {} modified, {} deleted → {} routes",
            changes.added,
            changes.modified,
            changes.deleted,
            changes.changed_routes.len()
        ),
    }
    if let Some(index) = &summary.chunks {
        println!(
            "  snapshot: {} chunks, {}",
            index.chunks.len(),
            format_bytes(index.total_bytes())
        );
    }
}
