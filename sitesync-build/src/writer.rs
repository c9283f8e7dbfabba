//! Atomic, hash-gated file writes.
//!
//! ## `write_document` protocol
//!
//! 1. Normalise line endings to LF.
//! 2. SHA-256 the content and the file currently on disk (if any).
//! 3. Skip if identical: the existing file and its mtime are left alone.
//! 4. Write to `<path>.sitesync.tmp`.
//! 5. Rename to the final path (atomic on POSIX); on failure remove the tmp.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{io_err, BuildError};
use crate::hasher::sha256_hex;

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// File was written (content changed or did not previously exist).
    Written { path: PathBuf },
    /// File was skipped; content on disk already matches.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.sitesync.tmp", path.display()))
}

/// SHA-256 of the file at `path`, `None` if it does not exist.
pub fn file_digest(path: &Path) -> Result<Option<String>, BuildError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(sha256_hex(&bytes))),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(io_err(path, err)),
    }
}

/// Write a rendered document only if its content changed.
pub fn write_document(path: &Path, content: &str) -> Result<WriteResult, BuildError> {
    write_document_with_tmp(path, content, &tmp_path_for(path))
}

fn write_document_with_tmp(path: &Path, content: &str, tmp: &Path) -> Result<WriteResult, BuildError> {
    let normalized = content.replace("\r\n", "\n");
    let digest = sha256_hex(normalized.as_bytes());

    if file_digest(path)?.as_deref() == Some(digest.as_str()) {
        tracing::debug!(path = %path.display(), "unchanged");
        return Ok(WriteResult::Unchanged {
            path: path.to_path_buf(),
        });
    }

    replace_file(path, normalized.as_bytes(), tmp)?;
    tracing::debug!(path = %path.display(), "wrote");
    Ok(WriteResult::Written {
        path: path.to_path_buf(),
    })
}

/// Unconditional atomic write for state files (manifest, chunks).
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    replace_file(path, bytes, &tmp_path_for(path))
}

/// Copy `src` over `dst` via a temp file so readers never see a partial entry.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<(), BuildError> {
    let bytes = std::fs::read(src).map_err(|e| io_err(src, e))?;
    replace_file(dst, &bytes, &tmp_path_for(dst))
}

fn replace_file(path: &Path, bytes: &[u8], tmp: &Path) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    if let Some(tmp_parent) = tmp.parent() {
        std::fs::create_dir_all(tmp_parent).map_err(|e| io_err(tmp_parent, e))?;
    }
    std::fs::write(tmp, bytes).map_err(|e| io_err(tmp, e))?;

    if let Err(e) = std::fs::rename(tmp, path) {
        let _ = std::fs::remove_file(tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Remove a file if present. Returns whether anything was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool, BuildError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(io_err(path, err)),
    }
}
