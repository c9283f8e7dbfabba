//! Content fingerprints.
//!
//! A fingerprint is the first 16 hex chars of SHA-256 over a record's
//! semantic fields, joined with U+001F:
//!
//! `kind, title, body, description, modified, categories, tags, author, featured_media`
//!
//! `count`, `link`, `id` and `published` are not hashed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use sitesync_core::{ContentKind, ContentRecord, ContentSnapshot, Slug};

pub const FINGERPRINT_LEN: usize = 16;

const FIELD_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type FingerprintMap = BTreeMap<Slug, Fingerprint>;

/// Fingerprints for every record of a snapshot, keyed by kind then slug.
/// Serializes as the manifest's `contentHashes` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingerprintSet {
    pub posts: FingerprintMap,
    pub categories: FingerprintMap,
    pub tags: FingerprintMap,
    pub authors: FingerprintMap,
}

impl FingerprintSet {
    pub fn get(&self, kind: ContentKind) -> &FingerprintMap {
        match kind {
            ContentKind::Post => &self.posts,
            ContentKind::Category => &self.categories,
            ContentKind::Tag => &self.tags,
            ContentKind::Author => &self.authors,
        }
    }

    pub fn get_mut(&mut self, kind: ContentKind) -> &mut FingerprintMap {
        match kind {
            ContentKind::Post => &mut self.posts,
            ContentKind::Category => &mut self.categories,
            ContentKind::Tag => &mut self.tags,
            ContentKind::Author => &mut self.authors,
        }
    }

    pub fn len(&self) -> usize {
        ContentKind::all().iter().map(|k| self.get(*k).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// SHA-256 as lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

pub fn fingerprint(record: &ContentRecord) -> Fingerprint {
    let ids = |ids: &[u64]| {
        ids.iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(",")
    };
    let fields = [
        record.kind.to_string(),
        record.title.clone(),
        record.body.clone(),
        record.description.clone(),
        record
            .modified
            .map(|m| m.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default(),
        ids(&record.relations.categories),
        ids(&record.relations.tags),
        record.relations.author.map(|a| a.to_string()).unwrap_or_default(),
        record.featured_media.map(|m| m.to_string()).unwrap_or_default(),
    ];
    let joined = fields.join(FIELD_SEPARATOR);
    let mut digest = sha256_hex(joined.as_bytes());
    digest.truncate(FINGERPRINT_LEN);
    Fingerprint(digest)
}

pub fn fingerprint_snapshot(snapshot: &ContentSnapshot) -> FingerprintSet {
    let mut set = FingerprintSet::default();
    for kind in ContentKind::all() {
        let map = set.get_mut(*kind);
        for record in snapshot.records(*kind) {
            map.insert(record.slug.clone(), fingerprint(record));
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn post() -> ContentRecord {
        let mut r = ContentRecord::new(ContentKind::Post, 1, "hello", "Hello");
        r.body = "<p>Body</p>".to_string();
        r.modified = Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        r.relations.categories = vec![4, 2];
        r.relations.author = Some(7);
        r
    }

    #[test]
    fn fingerprint_is_deterministic_and_short() {
        let a = fingerprint(&post());
        assert_eq!(a, fingerprint(&post()));
        assert_eq!(a.0.len(), FINGERPRINT_LEN);
        assert!(a.0.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn tracked_fields_change_the_fingerprint() {
        let base = fingerprint(&post());
        let edits: Vec<Box<dyn Fn(&mut ContentRecord)>> = vec![
            Box::new(|r| r.title.push('!')),
            Box::new(|r| r.body.push('!')),
            Box::new(|r| r.description.push('!')),
            Box::new(|r| r.modified = None),
            Box::new(|r| r.relations.categories.push(9)),
            Box::new(|r| r.relations.tags.push(9)),
            Box::new(|r| r.relations.author = None),
            Box::new(|r| r.featured_media = Some(3)),
        ];
        for (i, edit) in edits.iter().enumerate() {
            let mut r = post();
            edit(&mut r);
            assert_ne!(fingerprint(&r), base, "edit #{i} did not change the fingerprint");
        }
    }

    #[test]
    fn volatile_fields_are_ignored() {
        let base = fingerprint(&post());
        let mut r = post();
        r.count = Some(99);
        r.link = Some("https://cms.test/?p=1".to_string());
        r.id = 1234;
        assert_eq!(fingerprint(&r), base);
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let mut a = post();
        a.title = "ab".to_string();
        a.body = "c".to_string();
        let mut b = post();
        b.title = "a".to_string();
        b.body = "bc".to_string();
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn snapshot_fingerprints_are_keyed_by_kind_and_slug() {
        let mut snap = ContentSnapshot::empty(Utc::now());
        snap.posts = vec![post()];
        snap.tags = vec![ContentRecord::new(ContentKind::Tag, 1, "hello", "Hello")];
        let set = fingerprint_snapshot(&snap);
        assert_eq!(set.len(), 2);
        assert_ne!(
            set.posts[&Slug::from("hello")],
            set.tags[&Slug::from("hello")],
            "kind is part of the fingerprint"
        );
    }
}
