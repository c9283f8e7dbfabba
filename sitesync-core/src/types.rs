//! Domain types for the content snapshot.
//!
//! Every downstream component consumes [`ContentRecord`]; raw API JSON is
//! converted exactly once by [`crate::normalize`].

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// URL-unique identifier of a record within its kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(pub String);

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Slug {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Slug {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Slug {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The four content shapes served by the content API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Post,
    Category,
    Tag,
    Author,
}

impl ContentKind {
    /// All kinds in the order they appear in manifests and snapshots.
    pub fn all() -> &'static [ContentKind] {
        &[
            ContentKind::Post,
            ContentKind::Category,
            ContentKind::Tag,
            ContentKind::Author,
        ]
    }

    /// API endpoint path segment, also used as the manifest key.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContentKind::Post => "posts",
            ContentKind::Category => "categories",
            ContentKind::Tag => "tags",
            ContentKind::Author => "authors",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Post => write!(f, "post"),
            ContentKind::Category => write!(f, "category"),
            ContentKind::Tag => write!(f, "tag"),
            ContentKind::Author => write!(f, "author"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Identifiers of the records a post is filed under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relations {
    pub categories: Vec<u64>,
    pub tags: Vec<u64>,
    pub author: Option<u64>,
}

/// One canonical content item of any [`ContentKind`].
///
/// `count` and `link` are recomputed upstream without semantic effect and
/// are never part of a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: u64,
    pub kind: ContentKind,
    pub slug: Slug,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub relations: Relations,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub featured_media: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

impl ContentRecord {
    /// A record with only identity fields set.
    pub fn new(kind: ContentKind, id: u64, slug: impl Into<Slug>, title: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            slug: slug.into(),
            title: title.into(),
            body: String::new(),
            description: String::new(),
            published: None,
            modified: None,
            relations: Relations::default(),
            featured_media: None,
            count: None,
            link: None,
        }
    }
}

/// A featured image resolved from the media endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: u64,
    pub source_url: String,
    #[serde(default)]
    pub alt_text: String,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything fetched in one sync, in fetch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSnapshot {
    pub posts: Vec<ContentRecord>,
    pub categories: Vec<ContentRecord>,
    pub tags: Vec<ContentRecord>,
    pub authors: Vec<ContentRecord>,
    #[serde(default)]
    pub media: BTreeMap<u64, MediaRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl ContentSnapshot {
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            posts: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            authors: Vec::new(),
            media: BTreeMap::new(),
            fetched_at,
        }
    }

    pub fn records(&self, kind: ContentKind) -> &[ContentRecord] {
        match kind {
            ContentKind::Post => &self.posts,
            ContentKind::Category => &self.categories,
            ContentKind::Tag => &self.tags,
            ContentKind::Author => &self.authors,
        }
    }

    pub fn records_mut(&mut self, kind: ContentKind) -> &mut Vec<ContentRecord> {
        match kind {
            ContentKind::Post => &mut self.posts,
            ContentKind::Category => &mut self.categories,
            ContentKind::Tag => &mut self.tags,
            ContentKind::Author => &mut self.authors,
        }
    }

    pub fn find(&self, kind: ContentKind, slug: &Slug) -> Option<&ContentRecord> {
        self.records(kind).iter().find(|r| &r.slug == slug)
    }

    pub fn find_by_id(&self, kind: ContentKind, id: u64) -> Option<&ContentRecord> {
        self.records(kind).iter().find(|r| r.id == id)
    }

    /// Posts ordered by publish date, newest first. Undated posts sort last;
    /// ties keep fetch order.
    pub fn ranked_posts(&self) -> Vec<&ContentRecord> {
        let mut ranked: Vec<&ContentRecord> = self.posts.iter().collect();
        ranked.sort_by(|a, b| b.published.cmp(&a.published));
        ranked
    }

    /// Slugs of the `n` most recent posts.
    pub fn recent_post_slugs(&self, n: usize) -> Vec<&Slug> {
        self.ranked_posts()
            .into_iter()
            .take(n)
            .map(|r| &r.slug)
            .collect()
    }

    /// Slugs of the records with the given ids, skipping unknown ids.
    pub fn slugs_for(&self, kind: ContentKind, ids: &[u64]) -> Vec<&Slug> {
        ids.iter()
            .filter_map(|id| self.find_by_id(kind, *id))
            .map(|r| &r.slug)
            .collect()
    }

    pub fn total_records(&self) -> usize {
        ContentKind::all()
            .iter()
            .map(|kind| self.records(*kind).len())
            .sum()
    }
}
