//! Error types for sitesync-fetch.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can abort a fetch. Any of these fails the whole sync: a
/// truncated collection is never returned as if it were complete.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A page kept failing with retryable errors until the policy gave up.
    #[error("{endpoint} page {page}: gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        endpoint: String,
        page: u32,
        attempts: u32,
        last: String,
    },

    /// A non-retryable transport failure (bad URL, TLS setup, ...).
    #[error("{endpoint} page {page}: request failed: {reason}")]
    Request {
        endpoint: String,
        page: u32,
        reason: String,
    },

    /// The API refused the first page, so there is no collection at all.
    #[error("{endpoint}: upstream rejected the request with status {status}")]
    Rejected { endpoint: String, status: u16 },

    /// A success response whose body is not a JSON array of items.
    #[error("{endpoint} page {page}: malformed response: {reason}")]
    Decode {
        endpoint: String,
        page: u32,
        reason: String,
    },

    /// I/O failure on checkpoint files, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Checkpoint JSON serialization error.
    #[error("checkpoint JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid fetcher configuration.
    #[error("config error: {0}")]
    Config(#[from] sitesync_core::ConfigError),

    /// A fan-out task panicked or was cancelled.
    #[error("fetch task failed: {0}")]
    Join(String),
}

/// Convenience constructor for [`FetchError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> FetchError {
    FetchError::Io {
        path: path.into(),
        source,
    }
}
