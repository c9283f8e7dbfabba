//! `sitesync status`: manifest, snapshot and cache visibility.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use sitesync_build::{pipeline::ManifestStatus, status, StatusReport};
use sitesync_core::SiteConfig;

use super::format_bytes;

/// Arguments for `sitesync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, config: &SiteConfig) -> Result<()> {
        let report = status(config).context("failed to read build state")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report, Utc::now());
        Ok(())
    }
}

#[derive(Tabled)]
struct ManifestRow {
    #[tabled(rename = "manifest")]
    which: &'static str,
    #[tabled(rename = "version")]
    version: String,
    #[tabled(rename = "generated")]
    generated: String,
    #[tabled(rename = "posts")]
    posts: usize,
    #[tabled(rename = "categories")]
    categories: usize,
    #[tabled(rename = "tags")]
    tags: usize,
    #[tabled(rename = "authors")]
    authors: usize,
    #[tabled(rename = "changed routes")]
    changed_routes: String,
}

impl ManifestRow {
    fn new(which: &'static str, m: &ManifestStatus, now: DateTime<Utc>) -> Self {
        let version = if m.current_version {
            m.version.to_string()
        } else {
            format!("{} (outdated)", m.version)
        };
        let changed_routes = if m.full_rebuild_required {
            "all".to_string()
        } else {
            m.changed_routes.to_string()
        };
        Self {
            which,
            version,
            generated: m
                .generated_at
                .map(|at| format_age(at, now))
                .unwrap_or_else(|| "unknown".to_string()),
            posts: m.counts.posts,
            categories: m.counts.categories,
            tags: m.counts.tags,
            authors: m.counts.authors,
            changed_routes,
        }
    }
}

fn print_table(report: &StatusReport, now: DateTime<Utc>) {
    println!(
        "sitesync v{} | state: {}",
        env!("CARGO_PKG_VERSION"),
        report.state_dir.display()
    );

    let mut rows = Vec::new();
    if let Some(m) = &report.manifest {
        rows.push(ManifestRow::new("committed", m, now));
    }
    if let Some(m) = &report.pending {
        rows.push(ManifestRow::new("pending", m, now));
    }
    if rows.is_empty() {
        println!("{} no manifest yet; the next build is a full rebuild", "■".bright_black().bold());
    } else {
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    match &report.snapshot {
        Some(index) => println!(
            "snapshot: {} posts in {} chunks ({})",
            index.total_posts,
            index.chunks.len(),
            format_bytes(index.total_bytes())
        ),
        None => println!("snapshot: none"),
    }

    let cache = &report.cache;
    if cache.exists {
        println!(
            "cache: {} pages, {} assets, {} at {}",
            cache.pages,
            cache.assets,
            format_bytes(cache.total_bytes),
            cache.root.display()
        );
    } else {
        println!("cache: empty");
    }

    if report.pending.is_some() {
        println!("{} pending changes; run 'sitesync build' to apply them.", "■".yellow().bold());
    }
}

/// Coarse relative age such as `5m ago` or `3d ago`.
fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds();
    if secs < 0 {
        return "just now".to_string();
    }
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3_599 => format!("{}m ago", secs / 60),
        3_600..=86_399 => format!("{}h ago", secs / 3_600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn age_buckets() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(30), now), "30s ago");
        assert_eq!(format_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(format_age(now - Duration::hours(2), now), "2h ago");
        assert_eq!(format_age(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_age(now + Duration::seconds(10), now), "just now");
    }
}
