//! Raw API JSON → [`ContentRecord`].
//!
//! This is the only place that knows the upstream field names. Text fields may
//! arrive as plain strings or as `{ "rendered": "..." }` objects; dates may be
//! RFC 3339 or naive ISO timestamps (taken as UTC). Titles, names and alt
//! text are stored as plain text with HTML entities decoded; bodies and
//! excerpts stay HTML. Anything malformed becomes an empty string or `None`.
//! Items without a numeric `id` or a `slug` are dropped.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use html_escape::decode_html_entities;
use serde_json::Value;

use crate::types::{ContentKind, ContentRecord, MediaRecord, Relations, Slug};

/// Normalize one raw item. Returns `None` when identity fields are missing.
pub fn normalize(kind: ContentKind, raw: &Value) -> Option<ContentRecord> {
    let id = raw.get("id").and_then(Value::as_u64)?;
    let slug = raw
        .get("slug")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let mut record = ContentRecord::new(kind, id, slug, String::new());
    record.link = raw
        .get("link")
        .and_then(Value::as_str)
        .map(str::to_string);

    match kind {
        ContentKind::Post => {
            record.title = plain_text(raw, &["title"]);
            record.body = first_text(raw, &["content", "body"]);
            record.description = first_text(raw, &["excerpt", "description"]);
            record.published = first_timestamp(raw, &["date_gmt", "date"]);
            record.modified = first_timestamp(raw, &["modified_gmt", "modified"]);
            record.relations = Relations {
                categories: id_list(raw.get("categories")),
                tags: id_list(raw.get("tags")),
                author: raw.get("author").and_then(Value::as_u64),
            };
            record.featured_media = raw
                .get("featured_media")
                .and_then(Value::as_u64)
                .filter(|id| *id != 0);
        }
        ContentKind::Category | ContentKind::Tag => {
            record.title = plain_text(raw, &["name", "title"]);
            record.description = first_text(raw, &["description"]);
            record.count = raw.get("count").and_then(Value::as_u64);
        }
        ContentKind::Author => {
            record.title = plain_text(raw, &["name", "title"]);
            record.description = first_text(raw, &["description"]);
        }
    }

    Some(record)
}

/// Normalize a page of raw items, dropping unusable items and later
/// duplicates of a slug.
pub fn normalize_all(kind: ContentKind, raw: &[Value]) -> Vec<ContentRecord> {
    let mut seen: HashSet<Slug> = HashSet::new();
    let mut records = Vec::with_capacity(raw.len());
    for item in raw {
        let Some(record) = normalize(kind, item) else {
            tracing::warn!(kind = %kind, "skipping item without id or slug");
            continue;
        };
        if !seen.insert(record.slug.clone()) {
            tracing::warn!(kind = %kind, slug = %record.slug, "duplicate slug skipped");
            continue;
        }
        records.push(record);
    }
    records
}

/// Normalize a media item. Requires `id` and a non-empty `source_url`.
pub fn normalize_media(raw: &Value) -> Option<MediaRecord> {
    let id = raw.get("id").and_then(Value::as_u64)?;
    let source_url = raw
        .get("source_url")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())?
        .to_string();
    Some(MediaRecord {
        id,
        source_url,
        alt_text: plain_text(raw, &["alt_text", "caption"]),
    })
}

fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("rendered")
            .and_then(Value::as_str)
            .map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_text(raw: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| text(raw.get(*key)))
        .unwrap_or_default()
}

/// [`first_text`] with entities decoded, for fields rendered as plain text.
fn plain_text(raw: &Value, keys: &[&str]) -> String {
    decode_html_entities(first_text(raw, keys).trim()).into_owned()
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn first_timestamp(raw: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter()
        .filter_map(|key| raw.get(*key).and_then(Value::as_str))
        .find_map(parse_timestamp)
}

fn id_list(value: Option<&Value>) -> Vec<u64> {
    match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_u64).collect(),
        Some(Value::Number(n)) => n.as_u64().into_iter().collect(),
        _ => Vec::new(),
    }
}
