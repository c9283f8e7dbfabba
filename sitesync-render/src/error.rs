//! Error types for sitesync-render.

use std::path::PathBuf;

use thiserror::Error;

use sitesync_core::{ContentKind, Slug};

/// All errors that can arise while rendering one route.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    /// Filesystem error while loading user templates.
    #[error("template io error at {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    /// The route points at a record that is not in the snapshot.
    #[error("route {route}: no {kind} with slug '{slug}' in the snapshot")]
    MissingRecord {
        route: String,
        kind: ContentKind,
        slug: Slug,
    },
}
