//! Pagination checkpoints.
//!
//! Persisted at `<state>/checkpoints/<endpoint>.json` with the same atomic
//! `.tmp` + rename pattern as the manifest. A checkpoint is only honoured when
//! it is younger than the validity window and was taken with the same
//! `per_page`; otherwise it is discarded.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, FetchError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub endpoint: String,
    pub per_page: u32,
    pub next_page: u32,
    pub items: Vec<Value>,
    pub saved_at: DateTime<Utc>,
}

pub fn checkpoint_path(state_dir: &Path, endpoint: &str) -> PathBuf {
    state_dir
        .join("checkpoints")
        .join(format!("{endpoint}.json"))
}

/// Load a usable checkpoint for `endpoint`, deleting stale or unreadable ones.
pub fn load_fresh(
    state_dir: &Path,
    endpoint: &str,
    per_page: u32,
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<Option<Checkpoint>, FetchError> {
    let path = checkpoint_path(state_dir, endpoint);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(&path, err)),
    };

    let checkpoint: Checkpoint = match serde_json::from_str(&contents) {
        Ok(checkpoint) => checkpoint,
        Err(err) => {
            tracing::warn!(endpoint, error = %err, "discarding unreadable checkpoint");
            clear(state_dir, endpoint)?;
            return Ok(None);
        }
    };

    let age = now.signed_duration_since(checkpoint.saved_at);
    let expired = age.to_std().map(|age| age > validity).unwrap_or(false);
    if expired || checkpoint.per_page != per_page || checkpoint.endpoint != endpoint {
        tracing::info!(
            endpoint,
            age_secs = age.num_seconds(),
            "discarding stale checkpoint"
        );
        clear(state_dir, endpoint)?;
        return Ok(None);
    }
    Ok(Some(checkpoint))
}

/// Save atomically: write `<path>.tmp`, then rename.
pub fn save(state_dir: &Path, checkpoint: &Checkpoint) -> Result<(), FetchError> {
    let path = checkpoint_path(state_dir, &checkpoint.endpoint);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let json = serde_json::to_string(checkpoint)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    tracing::debug!(
        endpoint = %checkpoint.endpoint,
        next_page = checkpoint.next_page,
        "checkpoint saved"
    );
    Ok(())
}

pub fn clear(state_dir: &Path, endpoint: &str) -> Result<(), FetchError> {
    let path = checkpoint_path(state_dir, endpoint);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(&path, err)),
    }
}
