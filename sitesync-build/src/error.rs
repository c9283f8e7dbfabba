//! Error types for sitesync-build.

use std::path::PathBuf;

use thiserror::Error;

use sitesync_core::ConfigError;
use sitesync_fetch::FetchError;
use sitesync_render::RenderError;

/// All errors that can abort a sync or build stage. Per-route render
/// failures are not among them; those are collected in the build summary.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The fetch stage failed; no snapshot is written.
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The renderer could not be set up (bad template override, ...).
    #[error("render setup failed: {0}")]
    Render(#[from] RenderError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (manifest, chunks).
    #[error("state JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A chunk file named by the index could not be decoded.
    #[error("corrupt snapshot file {path}: {reason}")]
    CorruptSnapshot { path: PathBuf, reason: String },

    /// `build` needs a snapshot written by a previous `sync`.
    #[error("no content snapshot at {path}; run `sitesync sync` first")]
    MissingSnapshot { path: PathBuf },

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(String),
}

/// Convenience constructor for [`BuildError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BuildError {
    BuildError::Io {
        path: path.into(),
        source,
    }
}
