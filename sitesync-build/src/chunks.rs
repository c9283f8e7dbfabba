//! Chunked content store.
//!
//! Layout under `<state>/content/`:
//!
//! ```text
//! posts-chunk-0.json   posts 0 .. chunk_size
//! posts-chunk-1.json   ...
//! posts-index.json     chunk filenames in read order + sizes
//! taxonomies.json      categories, tags, authors, media, fetched_at
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sitesync_core::{ContentRecord, ContentSnapshot, MediaRecord};

use crate::error::{io_err, BuildError};
use crate::writer::write_atomic;

pub const CONTENT_DIR: &str = "content";
pub const INDEX_FILE: &str = "posts-index.json";
pub const TAXONOMIES_FILE: &str = "taxonomies.json";
const CHUNK_PREFIX: &str = "posts-chunk-";

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDetail {
    pub filename: String,
    pub post_count: usize,
    #[serde(rename = "sizeMB")]
    pub size_mb: f64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkIndex {
    pub chunks: Vec<String>,
    pub total_posts: usize,
    pub posts_per_chunk: usize,
    pub chunk_details: Vec<ChunkDetail>,
}

impl ChunkIndex {
    pub fn total_bytes(&self) -> u64 {
        self.chunk_details.iter().map(|d| d.size_bytes).sum()
    }
}

/// Everything but the posts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Taxonomies {
    categories: Vec<ContentRecord>,
    tags: Vec<ContentRecord>,
    authors: Vec<ContentRecord>,
    #[serde(default)]
    media: BTreeMap<u64, MediaRecord>,
    fetched_at: DateTime<Utc>,
}

pub fn content_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(CONTENT_DIR)
}

fn chunk_name(n: usize) -> String {
    format!("{CHUNK_PREFIX}{n}.json")
}

fn is_chunk_file(name: &str) -> bool {
    name.starts_with(CHUNK_PREFIX) && name.ends_with(".json")
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

/// Split `posts` into chunks of at most `chunk_size` and write them plus the
/// index. Chunk files left by an earlier, larger snapshot are removed first.
pub fn save_posts(
    dir: &Path,
    posts: &[ContentRecord],
    chunk_size: usize,
) -> Result<ChunkIndex, BuildError> {
    if chunk_size == 0 {
        return Err(BuildError::InvalidChunkSize);
    }
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let removed = remove_stale_chunks(dir)?;
    if removed > 0 {
        tracing::debug!(dir = %dir.display(), removed, "removed previous chunks");
    }

    let mut index = ChunkIndex {
        chunks: Vec::new(),
        total_posts: posts.len(),
        posts_per_chunk: chunk_size,
        chunk_details: Vec::new(),
    };
    for (n, chunk) in posts.chunks(chunk_size).enumerate() {
        let filename = chunk_name(n);
        let bytes = serde_json::to_vec_pretty(chunk)?;
        write_atomic(&dir.join(&filename), &bytes)?;

        let size_bytes = bytes.len() as u64;
        index.chunk_details.push(ChunkDetail {
            filename: filename.clone(),
            post_count: chunk.len(),
            size_mb: (size_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0,
            size_bytes,
        });
        index.chunks.push(filename);
    }

    let json = serde_json::to_vec_pretty(&index)?;
    write_atomic(&dir.join(INDEX_FILE), &json)?;
    tracing::info!(
        posts = index.total_posts,
        chunks = index.chunks.len(),
        bytes = index.total_bytes(),
        "posts chunked"
    );
    Ok(index)
}

fn remove_stale_chunks(dir: &Path) -> Result<usize, BuildError> {
    let mut removed = 0;
    for entry in std::fs::read_dir(dir).map_err(|e| io_err(dir, e))? {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name();
        if name.to_str().is_some_and(is_chunk_file) {
            let path = entry.path();
            std::fs::remove_file(&path).map_err(|e| io_err(&path, e))?;
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn load_index(dir: &Path) -> Result<ChunkIndex, BuildError> {
    let path = dir.join(INDEX_FILE);
    read_json(&path)
}

/// Concatenate chunks in index order.
pub fn load_posts(dir: &Path) -> Result<Vec<ContentRecord>, BuildError> {
    let index = load_index(dir)?;
    let mut posts = Vec::with_capacity(index.total_posts);
    for filename in &index.chunks {
        let chunk: Vec<ContentRecord> = read_json(&dir.join(filename))?;
        posts.extend(chunk);
    }
    if posts.len() != index.total_posts {
        return Err(BuildError::CorruptSnapshot {
            path: dir.join(INDEX_FILE),
            reason: format!(
                "index lists {} posts but chunks hold {}",
                index.total_posts,
                posts.len()
            ),
        });
    }
    Ok(posts)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, BuildError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(BuildError::MissingSnapshot {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(io_err(path, err)),
    };
    serde_json::from_str(&contents).map_err(|e| BuildError::CorruptSnapshot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Whole snapshot
// ---------------------------------------------------------------------------

pub fn snapshot_exists(state_dir: &Path) -> bool {
    let dir = content_dir(state_dir);
    dir.join(INDEX_FILE).is_file() && dir.join(TAXONOMIES_FILE).is_file()
}

pub fn save_snapshot(
    state_dir: &Path,
    snapshot: &ContentSnapshot,
    chunk_size: usize,
) -> Result<ChunkIndex, BuildError> {
    let dir = content_dir(state_dir);
    let index = save_posts(&dir, &snapshot.posts, chunk_size)?;
    let taxonomies = Taxonomies {
        categories: snapshot.categories.clone(),
        tags: snapshot.tags.clone(),
        authors: snapshot.authors.clone(),
        media: snapshot.media.clone(),
        fetched_at: snapshot.fetched_at,
    };
    let json = serde_json::to_vec_pretty(&taxonomies)?;
    write_atomic(&dir.join(TAXONOMIES_FILE), &json)?;
    Ok(index)
}

pub fn load_snapshot(state_dir: &Path) -> Result<ContentSnapshot, BuildError> {
    let dir = content_dir(state_dir);
    let taxonomies: Taxonomies = read_json(&dir.join(TAXONOMIES_FILE))?;
    let posts = load_posts(&dir)?;
    let mut snapshot = ContentSnapshot::empty(taxonomies.fetched_at);
    snapshot.posts = posts;
    snapshot.categories = taxonomies.categories;
    snapshot.tags = taxonomies.tags;
    snapshot.authors = taxonomies.authors;
    snapshot.media = taxonomies.media;
    Ok(snapshot)
}
