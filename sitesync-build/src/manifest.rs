//! Manifest store: fingerprints of the last successful build.
//!
//! Persists a [`Manifest`] JSON document at `<state>/manifest.json`. `sync`
//! writes the next manifest to `<state>/manifest.pending.json`; only a
//! successful build promotes it. Writes use the atomic `.tmp` + rename
//! pattern.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detector::ChangeSet;
use crate::error::{io_err, BuildError};
use crate::hasher::FingerprintSet;
use crate::writer::{remove_if_exists, write_atomic};

/// Bumped whenever fingerprint inputs or route shapes change; a manifest
/// with any other version forces a full rebuild.
pub const MANIFEST_VERSION: u32 = 2;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PENDING_MANIFEST_FILE: &str = "manifest.pending.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestCounts {
    pub posts: usize,
    pub categories: usize,
    pub tags: usize,
    pub authors: usize,
}

impl ManifestCounts {
    pub fn of(hashes: &FingerprintSet) -> Self {
        Self {
            posts: hashes.posts.len(),
            categories: hashes.categories.len(),
            tags: hashes.tags.len(),
            authors: hashes.authors.len(),
        }
    }
}

/// On-disk manifest payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_hashes: FingerprintSet,
    #[serde(default)]
    pub changed_routes: Vec<String>,
    #[serde(default)]
    pub full_rebuild_required: bool,
    #[serde(default)]
    pub counts: ManifestCounts,
}

impl Manifest {
    /// The manifest describing `hashes`, annotated with the diff that led to it.
    pub fn new(hashes: FingerprintSet, changes: &ChangeSet, now: DateTime<Utc>) -> Self {
        Self {
            version: MANIFEST_VERSION,
            generated_at: Some(now),
            counts: ManifestCounts::of(&hashes),
            content_hashes: hashes,
            changed_routes: changes.changed_routes.iter().cloned().collect(),
            full_rebuild_required: changes.full_rebuild_required,
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.version == MANIFEST_VERSION
    }
}

pub fn manifest_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(MANIFEST_FILE)
}

pub fn pending_path_at(state_dir: &Path) -> PathBuf {
    state_dir.join(PENDING_MANIFEST_FILE)
}

/// Load the committed manifest.
///
/// Missing → `None`. Unparsable → `None` with a warning, so a corrupt file
/// behaves like a first build instead of blocking every future build.
pub fn load_at(state_dir: &Path) -> Result<Option<Manifest>, BuildError> {
    read_manifest(&manifest_path_at(state_dir))
}

pub fn load_pending_at(state_dir: &Path) -> Result<Option<Manifest>, BuildError> {
    read_manifest(&pending_path_at(state_dir))
}

fn read_manifest(path: &Path) -> Result<Option<Manifest>, BuildError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(io_err(path, err)),
    };
    match serde_json::from_str::<Manifest>(&contents) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable manifest");
            Ok(None)
        }
    }
}

/// Save the committed manifest atomically.
pub fn save_at(state_dir: &Path, manifest: &Manifest) -> Result<(), BuildError> {
    let json = serde_json::to_string_pretty(manifest)?;
    write_atomic(&manifest_path_at(state_dir), json.as_bytes())
}

pub fn save_pending_at(state_dir: &Path, manifest: &Manifest) -> Result<(), BuildError> {
    let json = serde_json::to_string_pretty(manifest)?;
    write_atomic(&pending_path_at(state_dir), json.as_bytes())
}

/// Promote `manifest` to the committed manifest and drop the pending file.
pub fn commit_at(state_dir: &Path, manifest: &Manifest) -> Result<(), BuildError> {
    save_at(state_dir, manifest)?;
    remove_if_exists(&pending_path_at(state_dir))?;
    tracing::info!(
        version = manifest.version,
        records = manifest.content_hashes.len(),
        "manifest committed"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::Fingerprint;
    use sitesync_core::Slug;
    use tempfile::TempDir;

    fn manifest() -> Manifest {
        let mut hashes = FingerprintSet::default();
        hashes
            .posts
            .insert(Slug::from("hello"), Fingerprint("0123456789abcdef".to_string()));
        Manifest::new(hashes, &ChangeSet::default(), Utc::now())
    }

    #[test]
    fn missing_manifest_is_none() {
        let tmp = TempDir::new().unwrap();
        assert!(load_at(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn roundtrip_save_load() {
        let tmp = TempDir::new().unwrap();
        let m = manifest();
        save_at(tmp.path(), &m).unwrap();
        assert_eq!(load_at(tmp.path()).unwrap(), Some(m));
        assert!(
            !manifest_path_at(tmp.path()).with_extension("json.sitesync.tmp").exists(),
            "tmp file should be removed after atomic rename"
        );
    }

    #[test]
    fn on_disk_shape_is_camel_case() {
        let tmp = TempDir::new().unwrap();
        save_at(tmp.path(), &manifest()).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(manifest_path_at(tmp.path())).unwrap())
                .unwrap();
        assert_eq!(raw["version"], 2);
        assert_eq!(raw["contentHashes"]["posts"]["hello"], "0123456789abcdef");
        assert!(raw["contentHashes"]["tags"].as_object().unwrap().is_empty());
        assert_eq!(raw["fullRebuildRequired"], false);
        assert_eq!(raw["counts"]["posts"], 1);
    }

    #[test]
    fn corrupt_manifest_is_treated_as_missing() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(manifest_path_at(tmp.path()), "{ nope").unwrap();
        assert!(load_at(tmp.path()).unwrap().is_none());
    }

    #[test]
    fn older_version_still_loads_for_comparison() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            manifest_path_at(tmp.path()),
            r#"{"version":1,"contentHashes":{"posts":{"a":"x"}},"changedRoutes":[],"fullRebuildRequired":false}"#,
        )
        .unwrap();
        let loaded = load_at(tmp.path()).unwrap().expect("manifest");
        assert_eq!(loaded.version, 1);
        assert!(!loaded.is_current_version());
    }

    #[test]
    fn commit_promotes_and_clears_pending() {
        let tmp = TempDir::new().unwrap();
        let m = manifest();
        save_pending_at(tmp.path(), &m).unwrap();
        assert!(load_pending_at(tmp.path()).unwrap().is_some());
        commit_at(tmp.path(), &m).unwrap();
        assert!(load_pending_at(tmp.path()).unwrap().is_none());
        assert_eq!(load_at(tmp.path()).unwrap(), Some(m));
    }
}
