//! # sitesync-build
//!
//! Change detection, snapshot storage and the incremental build.
//!
//! - [`hasher`] fingerprints records, [`manifest`] persists them and
//!   [`detector`] turns two fingerprint sets into a [`ChangeSet`].
//! - [`chunks`] stores the snapshot as bounded JSON chunks.
//! - [`cache`] mirrors the output directory into the build cache.
//! - [`sitemap`] emits `sitemap.xml` and `robots.txt`.
//! - [`pipeline`] drives the sync and build stages.

pub mod cache;
pub mod chunks;
pub mod detector;
pub mod error;
pub mod hasher;
pub mod manifest;
pub mod pipeline;
pub mod sitemap;
pub mod writer;

pub use cache::{BuildCache, CacheReport, CacheStats};
pub use chunks::ChunkIndex;
pub use detector::{diff, ChangeSet, DiffOptions, RebuildReason};
pub use error::BuildError;
pub use hasher::{fingerprint, fingerprint_snapshot, Fingerprint, FingerprintSet};
pub use manifest::{Manifest, MANIFEST_VERSION};
pub use pipeline::{
    build, build_with, run, run_with, status, sync, sync_with, BuildStage, BuildSummary,
    RouteFailure, RunSummary, StatusReport, SyncStage, SyncSummary, BUILD_STAGES, SYNC_STAGES,
};
pub use writer::WriteResult;
