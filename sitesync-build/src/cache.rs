//! Build cache synchronizer.
//!
//! `<cache>/pages/` mirrors the output directory and `<cache>/assets/` the
//! optional compiled-assets directory. Entries are keyed by their path
//! relative to those roots and replaced whole (temp file + rename) only when
//! their SHA-256 differs, so `restore` followed by `save` leaves the cache
//! byte-identical.

use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use sitesync_core::routes::output_file_for;
use sitesync_core::SiteConfig;

use crate::error::{io_err, BuildError};
use crate::writer::{copy_atomic, file_digest, remove_if_exists};

pub const PAGES_DIR: &str = "pages";
pub const ASSETS_DIR: &str = "assets";

/// Files touched by one mirror pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheReport {
    pub copied: usize,
    pub unchanged: usize,
    pub bytes_copied: u64,
}

impl CacheReport {
    fn absorb(&mut self, other: CacheReport) {
        self.copied += other.copied;
        self.unchanged += other.unchanged;
        self.bytes_copied += other.bytes_copied;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub root: PathBuf,
    pub exists: bool,
    pub pages: usize,
    pub assets: usize,
    pub total_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct BuildCache {
    root: PathBuf,
    output_dir: PathBuf,
    assets_dir: Option<PathBuf>,
}

impl BuildCache {
    pub fn new(root: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_dir: output_dir.into(),
            assets_dir: None,
        }
    }

    pub fn with_assets(mut self, assets_dir: impl Into<PathBuf>) -> Self {
        self.assets_dir = Some(assets_dir.into());
        self
    }

    pub fn from_config(config: &SiteConfig) -> Self {
        let cache = Self::new(&config.cache_dir, &config.output_dir);
        match &config.assets_dir {
            Some(assets) => cache.with_assets(assets),
            None => cache,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.root.join(PAGES_DIR)
    }

    pub fn assets_cache_dir(&self) -> PathBuf {
        self.root.join(ASSETS_DIR)
    }

    /// Copy cached pages into the output directory. A missing cache is a
    /// first build, not an error.
    pub fn restore(&self) -> Result<CacheReport, BuildError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| io_err(&self.output_dir, e))?;
        let pages = self.pages_dir();
        if !pages.is_dir() {
            tracing::info!(cache = %self.root.display(), "no build cache to restore");
            return Ok(CacheReport::default());
        }
        let report = mirror(&pages, &self.output_dir)?;
        tracing::info!(
            copied = report.copied,
            unchanged = report.unchanged,
            "build cache restored"
        );
        Ok(report)
    }

    /// Copy the output directory (and compiled assets, when configured and
    /// present) into the cache.
    pub fn save(&self) -> Result<CacheReport, BuildError> {
        let mut report = CacheReport::default();
        if self.output_dir.is_dir() {
            report.absorb(mirror(&self.output_dir, &self.pages_dir())?);
        } else {
            tracing::warn!(output = %self.output_dir.display(), "output directory missing, nothing to cache");
        }
        if let Some(assets) = self.assets_dir.as_deref().filter(|dir| dir.is_dir()) {
            report.absorb(mirror(assets, &self.assets_cache_dir())?);
        }
        tracing::info!(
            copied = report.copied,
            unchanged = report.unchanged,
            bytes = report.bytes_copied,
            "build cache saved"
        );
        Ok(report)
    }

    /// Delete the cache outright. Returns whether there was anything to delete.
    pub fn clean(&self) -> Result<bool, BuildError> {
        if !self.root.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&self.root).map_err(|e| io_err(&self.root, e))?;
        tracing::info!(cache = %self.root.display(), "build cache removed");
        Ok(true)
    }

    pub fn stats(&self) -> Result<CacheStats, BuildError> {
        let mut stats = CacheStats {
            root: self.root.clone(),
            exists: self.root.is_dir(),
            ..CacheStats::default()
        };
        if !stats.exists {
            return Ok(stats);
        }
        for (dir, count) in [
            (self.pages_dir(), &mut stats.pages),
            (self.assets_cache_dir(), &mut stats.assets),
        ] {
            if !dir.is_dir() {
                continue;
            }
            for file in files_under(&dir)? {
                let meta = std::fs::metadata(&file).map_err(|e| io_err(&file, e))?;
                *count += 1;
                stats.total_bytes += meta.len();
            }
        }
        Ok(stats)
    }

    /// Remove the documents for `routes` from both the output directory and
    /// the cache. Returns the number of files removed.
    pub fn evict<'a>(&self, routes: impl IntoIterator<Item = &'a String>) -> Result<usize, BuildError> {
        let pages = self.pages_dir();
        let mut removed = 0;
        for route in routes {
            for root in [self.output_dir.as_path(), pages.as_path()] {
                let file = output_file_for(root, route);
                if remove_if_exists(&file)? {
                    removed += 1;
                    prune_empty_parent(&file, root);
                }
            }
            tracing::debug!(route = %route, "evicted");
        }
        Ok(removed)
    }
}

/// Hash-gated copy of every file under `src` to the same relative path
/// under `dst`.
fn mirror(src: &Path, dst: &Path) -> Result<CacheReport, BuildError> {
    let mut report = CacheReport::default();
    for file in files_under(src)? {
        let Ok(relative) = file.strip_prefix(src) else {
            continue;
        };
        let target = dst.join(relative);
        let digest = file_digest(&file)?;
        if digest.is_some() && digest == file_digest(&target)? {
            report.unchanged += 1;
            continue;
        }
        copy_atomic(&file, &target)?;
        report.copied += 1;
        report.bytes_copied += std::fs::metadata(&target)
            .map_err(|e| io_err(&target, e))?
            .len();
    }
    Ok(report)
}

/// Regular files under `dir` in a stable order, skipping in-flight temp files.
fn files_under(dir: &Path) -> Result<Vec<PathBuf>, BuildError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf());
            io_err(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().ends_with(".sitesync.tmp") {
            continue;
        }
        files.push(entry.into_path());
    }
    Ok(files)
}

/// Drop now-empty route directories up to (not including) `root`.
fn prune_empty_parent(file: &Path, root: &Path) {
    let mut dir = file.parent();
    while let Some(current) = dir {
        if current == root || std::fs::remove_dir(current).is_err() {
            break;
        }
        dir = current.parent();
    }
}
