//! Sync and build pipelines.
//!
//! Each pipeline is a declared list of stages ([`SYNC_STAGES`],
//! [`BUILD_STAGES`]) driven in order over one run context; a stage error
//! aborts the run. Per-route render failures do not: they are collected in
//! [`BuildSummary::failed`] and the affected records are left out of the
//! committed manifest so the next build retries them.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::Instrument;

use sitesync_core::normalize::normalize_all;
use sitesync_core::{derive_routes, ContentKind, ContentSnapshot, Route, RouteSource, SiteConfig};
use sitesync_fetch::{fetch_endpoints, resolve_media, FetchedContent, Fetcher, SyncState};
use sitesync_render::Prerenderer;

use crate::cache::{BuildCache, CacheReport, CacheStats};
use crate::chunks::{self, ChunkIndex};
use crate::detector::{diff, ChangeSet, DiffOptions, RebuildReason};
use crate::error::BuildError;
use crate::hasher::{fingerprint_snapshot, FingerprintSet};
use crate::manifest::{self, Manifest, ManifestCounts};
use crate::sitemap::{self, ROBOTS_FILE, SITEMAP_FILE};
use crate::writer::write_document;

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Fetch,
    Normalize,
    ResolveMedia,
    Diff,
    StoreSnapshot,
}

/// Taxonomies and posts are fetched together; media lookup needs the
/// normalized posts; the diff needs the media-complete snapshot.
pub const SYNC_STAGES: [SyncStage; 5] = [
    SyncStage::Fetch,
    SyncStage::Normalize,
    SyncStage::ResolveMedia,
    SyncStage::Diff,
    SyncStage::StoreSnapshot,
];

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncStage::Fetch => "fetch",
            SyncStage::Normalize => "normalize",
            SyncStage::ResolveMedia => "resolve-media",
            SyncStage::Diff => "diff",
            SyncStage::StoreSnapshot => "store-snapshot",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    LoadSnapshot,
    Diff,
    RestoreCache,
    Render,
    SaveCache,
    Sitemap,
    CommitManifest,
}

pub const BUILD_STAGES: [BuildStage; 7] = [
    BuildStage::LoadSnapshot,
    BuildStage::Diff,
    BuildStage::RestoreCache,
    BuildStage::Render,
    BuildStage::SaveCache,
    BuildStage::Sitemap,
    BuildStage::CommitManifest,
];

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStage::LoadSnapshot => "load-snapshot",
            BuildStage::Diff => "diff",
            BuildStage::RestoreCache => "restore-cache",
            BuildStage::Render => "render",
            BuildStage::SaveCache => "save-cache",
            BuildStage::Sitemap => "sitemap",
            BuildStage::CommitManifest => "commit-manifest",
        })
    }
}

// ---------------------------------------------------------------------------
// Summaries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    pub counts: ManifestCounts,
    pub media: usize,
    pub fetch: SyncState,
    pub changes: ChangeSet,
    pub chunks: Option<ChunkIndex>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteFailure {
    pub route: String,
    pub error: String,
    #[serde(skip)]
    pub source: Option<RouteSource>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub full_rebuild: bool,
    pub reason: Option<RebuildReason>,
    pub changed_routes: usize,
    pub routes_total: usize,
    /// Routes handed to the renderer.
    pub selected: usize,
    pub written: usize,
    pub unchanged: usize,
    pub evicted: usize,
    pub failed: Vec<RouteFailure>,
    pub cache_restored: CacheReport,
    pub cache_saved: CacheReport,
    pub sitemap_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub sync: SyncSummary,
    pub build: BuildSummary,
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Fetch, diff and store the snapshot plus a pending manifest.
pub async fn sync(config: &SiteConfig, dry_run: bool) -> Result<SyncSummary, BuildError> {
    let fetcher = Arc::new(Fetcher::from_config(config)?);
    sync_with(config, fetcher, dry_run).await
}

pub async fn sync_with(
    config: &SiteConfig,
    fetcher: Arc<Fetcher>,
    dry_run: bool,
) -> Result<SyncSummary, BuildError> {
    Ok(drive_sync(config, fetcher, dry_run).await?.summary())
}

/// Build from the stored snapshot. `full` ignores the diff.
pub async fn build(config: &SiteConfig, full: bool) -> Result<BuildSummary, BuildError> {
    let prerenderer = Arc::new(Prerenderer::from_config(config)?);
    build_with(config, prerenderer, full).await
}

pub async fn build_with(
    config: &SiteConfig,
    prerenderer: Arc<Prerenderer>,
    full: bool,
) -> Result<BuildSummary, BuildError> {
    drive_build(BuildRun::new(config, prerenderer, full, None)).await
}

/// Sync then build in one process, sharing the in-memory snapshot.
pub async fn run(config: &SiteConfig, full: bool) -> Result<RunSummary, BuildError> {
    let fetcher = Arc::new(Fetcher::from_config(config)?);
    let prerenderer = Arc::new(Prerenderer::from_config(config)?);
    run_with(config, fetcher, prerenderer, full).await
}

pub async fn run_with(
    config: &SiteConfig,
    fetcher: Arc<Fetcher>,
    prerenderer: Arc<Prerenderer>,
    full: bool,
) -> Result<RunSummary, BuildError> {
    let synced = drive_sync(config, fetcher, false).await?;
    let sync = synced.summary();
    let snapshot = Arc::new(synced.snapshot);
    let build = drive_build(BuildRun::new(config, prerenderer, full, Some(snapshot))).await?;
    Ok(RunSummary { sync, build })
}

// ---------------------------------------------------------------------------
// Sync
// ---------------------------------------------------------------------------

struct SyncRun<'a> {
    config: &'a SiteConfig,
    fetcher: Arc<Fetcher>,
    dry_run: bool,
    raw: FetchedContent,
    snapshot: ContentSnapshot,
    fingerprints: FingerprintSet,
    changes: ChangeSet,
    chunks: Option<ChunkIndex>,
    state: SyncState,
}

async fn drive_sync(
    config: &SiteConfig,
    fetcher: Arc<Fetcher>,
    dry_run: bool,
) -> Result<SyncRun<'_>, BuildError> {
    let mut run = SyncRun {
        config,
        fetcher,
        dry_run,
        raw: FetchedContent::default(),
        snapshot: ContentSnapshot::empty(Utc::now()),
        fingerprints: FingerprintSet::default(),
        changes: ChangeSet::default(),
        chunks: None,
        state: SyncState::default(),
    };
    for stage in SYNC_STAGES {
        let started = Instant::now();
        run.step(stage)
            .instrument(tracing::info_span!("sync", %stage))
            .await?;
        tracing::debug!(%stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage complete");
    }
    Ok(run)
}

impl SyncRun<'_> {
    async fn step(&mut self, stage: SyncStage) -> Result<(), BuildError> {
        match stage {
            SyncStage::Fetch => {
                let mut fetched = fetch_endpoints(Arc::clone(&self.fetcher), ContentKind::all()).await?;
                self.state.merge(std::mem::take(&mut fetched.state));
                self.raw = fetched;
            }
            SyncStage::Normalize => {
                let fetched_at = self.state.last_fetch_at.unwrap_or_else(Utc::now);
                let mut snapshot = ContentSnapshot::empty(fetched_at);
                for (kind, items) in std::mem::take(&mut self.raw.raw) {
                    let records = normalize_all(kind, &items);
                    if records.len() < items.len() {
                        tracing::warn!(
                            endpoint = kind.endpoint(),
                            skipped = items.len() - records.len(),
                            "items without id or slug skipped"
                        );
                    }
                    *snapshot.records_mut(kind) = records;
                }
                self.snapshot = snapshot;
            }
            SyncStage::ResolveMedia => {
                let ids: Vec<u64> = self
                    .snapshot
                    .posts
                    .iter()
                    .filter_map(|p| p.featured_media)
                    .collect();
                let (media, state) =
                    resolve_media(Arc::clone(&self.fetcher), ids, self.config.media_batch_size).await;
                self.snapshot.media = media;
                self.state.merge(state);
            }
            SyncStage::Diff => {
                let old = manifest::load_at(&self.config.state_dir)?;
                self.fingerprints = fingerprint_snapshot(&self.snapshot);
                self.changes = diff(
                    old.as_ref(),
                    &self.fingerprints,
                    &self.snapshot,
                    &DiffOptions::from_config(self.config),
                );
                log_changes(&self.changes);
            }
            SyncStage::StoreSnapshot => {
                if self.dry_run {
                    tracing::info!("[dry-run] snapshot and pending manifest not written");
                    return Ok(());
                }
                let state_dir = &self.config.state_dir;
                self.chunks = Some(chunks::save_snapshot(state_dir, &self.snapshot, self.config.chunk_size)?);
                let pending = Manifest::new(self.fingerprints.clone(), &self.changes, Utc::now());
                manifest::save_pending_at(state_dir, &pending)?;
            }
        }
        Ok(())
    }

    fn summary(&self) -> SyncSummary {
        SyncSummary {
            counts: ManifestCounts::of(&self.fingerprints),
            media: self.snapshot.media.len(),
            fetch: self.state.clone(),
            changes: self.changes.clone(),
            chunks: self.chunks.clone(),
            dry_run: self.dry_run,
        }
    }
}

fn log_changes(changes: &ChangeSet) {
    match &changes.reason {
        Some(reason) => tracing::info!(%reason, "full rebuild required"),
        None => tracing::info!(
            added = changes.added,
            modified = changes.modified,
            deleted = changes.deleted,
            routes = changes.changed_routes.len(),
            "content diff"
        ),
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

struct BuildRun<'a> {
    config: &'a SiteConfig,
    prerenderer: Arc<Prerenderer>,
    full: bool,
    cache: BuildCache,
    snapshot: Option<Arc<ContentSnapshot>>,
    fingerprints: FingerprintSet,
    changes: ChangeSet,
    routes: Vec<Route>,
    summary: BuildSummary,
}

async fn drive_build(mut run: BuildRun<'_>) -> Result<BuildSummary, BuildError> {
    for stage in BUILD_STAGES {
        let started = Instant::now();
        run.step(stage)
            .instrument(tracing::info_span!("build", %stage))
            .await?;
        tracing::debug!(%stage, elapsed_ms = started.elapsed().as_millis() as u64, "stage complete");
    }
    let mut summary = run.summary;
    summary.failed.sort_by(|a, b| a.route.cmp(&b.route));
    Ok(summary)
}

impl<'a> BuildRun<'a> {
    fn new(
        config: &'a SiteConfig,
        prerenderer: Arc<Prerenderer>,
        full: bool,
        snapshot: Option<Arc<ContentSnapshot>>,
    ) -> Self {
        Self {
            config,
            prerenderer,
            full,
            cache: BuildCache::from_config(config),
            snapshot,
            fingerprints: FingerprintSet::default(),
            changes: ChangeSet::default(),
            routes: Vec::new(),
            summary: BuildSummary::default(),
        }
    }

    fn snapshot(&self) -> Result<Arc<ContentSnapshot>, BuildError> {
        self.snapshot.clone().ok_or_else(|| BuildError::MissingSnapshot {
            path: chunks::content_dir(&self.config.state_dir),
        })
    }

    async fn step(&mut self, stage: BuildStage) -> Result<(), BuildError> {
        let config = self.config;
        let output = &config.output_dir;
        match stage {
            BuildStage::LoadSnapshot => {
                if self.snapshot.is_some() {
                    tracing::debug!("using in-memory snapshot");
                } else {
                    let snapshot = chunks::load_snapshot(&self.config.state_dir)?;
                    tracing::info!(records = snapshot.total_records(), "snapshot loaded");
                    self.snapshot = Some(Arc::new(snapshot));
                }
            }
            BuildStage::Diff => {
                let snapshot = self.snapshot()?;
                let old = manifest::load_at(&self.config.state_dir)?;
                self.fingerprints = fingerprint_snapshot(&snapshot);
                let mut changes = diff(
                    old.as_ref(),
                    &self.fingerprints,
                    &snapshot,
                    &DiffOptions::from_config(self.config),
                );
                if self.full {
                    changes = changes.forced();
                }
                log_changes(&changes);
                self.summary.full_rebuild = changes.full_rebuild_required;
                self.summary.reason = changes.reason.clone();
                self.summary.changed_routes = changes.changed_routes.len();
                self.changes = changes;
            }
            BuildStage::RestoreCache => {
                self.summary.cache_restored = self.cache.restore()?;
                self.summary.evicted = self.cache.evict(&self.changes.deleted_routes)?;
            }
            BuildStage::Render => self.render().await?,
            BuildStage::SaveCache => {
                self.summary.cache_saved = self.cache.save()?;
            }
            BuildStage::Sitemap => {
                let snapshot = self.snapshot()?;
                let live: Vec<Route> = self
                    .routes
                    .iter()
                    .filter(|r| r.output_file(output).is_file())
                    .cloned()
                    .collect();
                let xml = sitemap::emit(&live, &snapshot, &self.config.site);
                write_document(&output.join(SITEMAP_FILE), &xml)?;
                let robots = sitemap::robots(&self.config.site, &self.config.robots_disallow);
                write_document(&output.join(ROBOTS_FILE), &robots)?;
                self.summary.sitemap_entries = live.len();
            }
            BuildStage::CommitManifest => {
                let mut committed = self.fingerprints.clone();
                for failure in &self.summary.failed {
                    if let Some(source) = &failure.source {
                        committed.get_mut(source.kind).remove(&source.slug);
                    }
                }
                let manifest = Manifest::new(committed, &self.changes, Utc::now());
                manifest::commit_at(&self.config.state_dir, &manifest)?;
            }
        }
        Ok(())
    }

    /// Render the selected routes in bounded concurrent batches.
    async fn render(&mut self) -> Result<(), BuildError> {
        let snapshot = self.snapshot()?;
        let output = self.config.output_dir.clone();
        self.routes = derive_routes(&snapshot, &self.config.static_routes);

        let selected: Vec<Route> = if self.changes.full_rebuild_required {
            self.routes.clone()
        } else {
            self.routes
                .iter()
                .filter(|r| {
                    self.changes.changed_routes.contains(&r.path) || !r.output_file(&output).exists()
                })
                .cloned()
                .collect()
        };
        self.summary.routes_total = self.routes.len();
        self.summary.selected = selected.len();
        tracing::info!(
            selected = selected.len(),
            total = self.routes.len(),
            "rendering routes"
        );

        for batch in selected.chunks(self.config.render_batch_size.max(1)) {
            let mut set = JoinSet::new();
            for route in batch.iter().cloned() {
                let prerenderer = Arc::clone(&self.prerenderer);
                let snapshot = Arc::clone(&snapshot);
                let file = route.output_file(&output);
                set.spawn_blocking(move || {
                    // A panicking renderer fails its route like any other error.
                    let rendered =
                        panic::catch_unwind(AssertUnwindSafe(|| prerenderer.render(&route, &snapshot)));
                    let result = match rendered {
                        Ok(html) => html
                            .map_err(|e| e.to_string())
                            .and_then(|html| write_document(&file, &html).map_err(|e| e.to_string())),
                        Err(payload) => {
                            Err(format!("renderer panicked: {}", panic_message(payload.as_ref())))
                        }
                    };
                    (route, result)
                });
            }
            while let Some(joined) = set.join_next().await {
                let (route, result) = joined.map_err(|e| BuildError::Join(e.to_string()))?;
                match result {
                    Ok(written) if written.is_written() => self.summary.written += 1,
                    Ok(_) => self.summary.unchanged += 1,
                    Err(error) => {
                        tracing::warn!(route = %route.path, %error, "route failed");
                        self.summary.failed.push(RouteFailure {
                            route: route.path,
                            error,
                            source: route.source,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStatus {
    pub version: u32,
    pub current_version: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub counts: ManifestCounts,
    pub changed_routes: usize,
    pub full_rebuild_required: bool,
}

impl From<&Manifest> for ManifestStatus {
    fn from(m: &Manifest) -> Self {
        Self {
            version: m.version,
            current_version: m.is_current_version(),
            generated_at: m.generated_at,
            counts: ManifestCounts::of(&m.content_hashes),
            changed_routes: m.changed_routes.len(),
            full_rebuild_required: m.full_rebuild_required,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub state_dir: PathBuf,
    pub manifest: Option<ManifestStatus>,
    pub pending: Option<ManifestStatus>,
    pub snapshot: Option<ChunkIndex>,
    pub cache: CacheStats,
}

/// What is on disk: committed and pending manifests, snapshot index, cache.
pub fn status(config: &SiteConfig) -> Result<StatusReport, BuildError> {
    let state_dir = &config.state_dir;
    let snapshot = if chunks::snapshot_exists(state_dir) {
        Some(chunks::load_index(&chunks::content_dir(state_dir))?)
    } else {
        None
    };
    Ok(StatusReport {
        state_dir: state_dir.clone(),
        manifest: manifest::load_at(state_dir)?.as_ref().map(ManifestStatus::from),
        pending: manifest::load_pending_at(state_dir)?.as_ref().map(ManifestStatus::from),
        snapshot,
        cache: BuildCache::from_config(config).stats()?,
    })
}
