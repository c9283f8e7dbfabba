//! Route-scoped SEO metadata.
//!
//! | route            | og:type   | JSON-LD `@type`                  |
//! |------------------|-----------|----------------------------------|
//! | post             | article   | `BlogPosting` / `NewsArticle`    |
//! | category/tag/author | website | `CollectionPage`                |
//! | home, static     | website   | `WebSite`                        |
//!
//! A post is a `NewsArticle` when any of its category slugs is listed in
//! `site.news_categories`.

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use html_escape::decode_html_entities;
use regex::Regex;
use serde_json::{json, Value};

use sitesync_core::{ContentKind, ContentRecord, ContentSnapshot, Route, RouteKind, SiteMeta};

use crate::error::RenderError;

/// Upper bound for generated descriptions, in characters.
pub const DESCRIPTION_LIMIT: usize = 160;

const SCHEMA_CONTEXT: &str = "https://schema.org";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern"));
static SPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("space pattern"));

/// Everything the injector writes into a document head.
#[derive(Debug, Clone, PartialEq)]
pub struct SeoMetadata {
    pub title: String,
    pub description: String,
    pub canonical: String,
    pub og_type: &'static str,
    pub site_name: String,
    pub image: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub json_ld: Value,
}

impl SeoMetadata {
    /// The `@type` of the structured-data block.
    pub fn schema_type(&self) -> &str {
        self.json_ld
            .get("@type")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }
}

/// Build the metadata for `route`. Fails only when the route's source record
/// is absent from the snapshot.
pub fn derive_metadata(
    route: &Route,
    snapshot: &ContentSnapshot,
    site: &SiteMeta,
) -> Result<SeoMetadata, RenderError> {
    let canonical = site.absolute_url(&route.path);
    let record = source_record(route, snapshot)?;

    let metadata = match (route.kind, record) {
        (RouteKind::Post, Some(post)) => post_metadata(route, post, snapshot, site, canonical),
        (RouteKind::Category | RouteKind::Tag | RouteKind::Author, Some(record)) => {
            listing_metadata(route, record, site, canonical)
        }
        _ => site_metadata(route, site, canonical),
    };
    Ok(metadata)
}

/// The record a route renders, `None` for home and static routes.
pub fn source_record<'s>(
    route: &Route,
    snapshot: &'s ContentSnapshot,
) -> Result<Option<&'s ContentRecord>, RenderError> {
    let Some(source) = &route.source else {
        return Ok(None);
    };
    snapshot
        .find(source.kind, &source.slug)
        .map(Some)
        .ok_or_else(|| RenderError::MissingRecord {
            route: route.path.clone(),
            kind: source.kind,
            slug: source.slug.clone(),
        })
}

/// Page title shown in `<title>` and social cards.
pub fn page_title(route: &Route, record: Option<&ContentRecord>, site: &SiteMeta) -> String {
    let heading = match (route.kind, record) {
        (RouteKind::Home, _) => return site.name.clone(),
        (RouteKind::Category, Some(r)) => format!("Category: {}", r.title),
        (RouteKind::Tag, Some(r)) => format!("Tag: {}", r.title),
        (RouteKind::Author, Some(r)) => format!("Posts by {}", r.title),
        (_, Some(r)) => r.title.clone(),
        (_, None) => static_heading(&route.path),
    };
    if heading.is_empty() {
        site.name.clone()
    } else {
        format!("{heading} | {}", site.name)
    }
}

fn static_heading(path: &str) -> String {
    let last = path.trim_matches('/').rsplit('/').next().unwrap_or_default();
    let words: Vec<String> = last
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect();
    words.join(" ")
}

fn post_metadata(
    route: &Route,
    post: &ContentRecord,
    snapshot: &ContentSnapshot,
    site: &SiteMeta,
    canonical: String,
) -> SeoMetadata {
    let description = or_site_default(describe(post), site);
    let image = post
        .featured_media
        .and_then(|id| snapshot.media.get(&id))
        .map(|m| m.source_url.clone())
        .or_else(|| site.default_image.clone());
    let categories: Vec<&ContentRecord> = post
        .relations
        .categories
        .iter()
        .filter_map(|id| snapshot.find_by_id(ContentKind::Category, *id))
        .collect();
    let is_news = categories
        .iter()
        .any(|c| site.news_categories.iter().any(|n| n == c.slug.as_str()));
    let author = post
        .relations
        .author
        .and_then(|id| snapshot.find_by_id(ContentKind::Author, id));

    let schema_type = if is_news { "NewsArticle" } else { "BlogPosting" };

    let mut json_ld = json!({
        "@context": SCHEMA_CONTEXT,
        "@type": schema_type,
        "headline": post.title,
        "description": description,
        "url": canonical,
        "mainEntityOfPage": { "@type": "WebPage", "@id": canonical },
        "publisher": { "@type": "Organization", "name": site.name, "url": site.url },
    });
    if let Some(published) = post.published {
        json_ld["datePublished"] = json!(rfc3339(published));
    }
    if let Some(modified) = post.modified.or(post.published) {
        json_ld["dateModified"] = json!(rfc3339(modified));
    }
    if let Some(author) = author {
        json_ld["author"] = json!({ "@type": "Person", "name": author.title });
    }
    if let Some(image) = &image {
        json_ld["image"] = json!([image]);
    }
    if let Some(section) = categories.first() {
        json_ld["articleSection"] = json!(section.title);
    }

    SeoMetadata {
        title: page_title(route, Some(post), site),
        description,
        canonical,
        og_type: "article",
        site_name: site.name.clone(),
        image,
        published: post.published,
        modified: post.modified,
        json_ld,
    }
}

fn listing_metadata(
    route: &Route,
    record: &ContentRecord,
    site: &SiteMeta,
    canonical: String,
) -> SeoMetadata {
    let description = match describe(record) {
        d if d.is_empty() => format!("{} on {}", kind_heading(route.kind, &record.title), site.name),
        d => d,
    };
    let title = page_title(route, Some(record), site);
    let json_ld = json!({
        "@context": SCHEMA_CONTEXT,
        "@type": "CollectionPage",
        "name": title,
        "description": description,
        "url": canonical,
        "isPartOf": { "@type": "WebSite", "name": site.name, "url": site.url },
    });
    SeoMetadata {
        title,
        description,
        canonical,
        og_type: "website",
        site_name: site.name.clone(),
        image: site.default_image.clone(),
        published: None,
        modified: None,
        json_ld,
    }
}

fn site_metadata(route: &Route, site: &SiteMeta, canonical: String) -> SeoMetadata {
    let description = or_site_default(String::new(), site);
    let json_ld = json!({
        "@context": SCHEMA_CONTEXT,
        "@type": "WebSite",
        "name": site.name,
        "url": site.absolute_url("/"),
        "description": description,
    });
    SeoMetadata {
        title: page_title(route, None, site),
        description,
        canonical,
        og_type: "website",
        site_name: site.name.clone(),
        image: site.default_image.clone(),
        published: None,
        modified: None,
        json_ld,
    }
}

fn kind_heading(kind: RouteKind, title: &str) -> String {
    match kind {
        RouteKind::Author => format!("Posts by {title}"),
        _ => format!("Posts filed under {title}"),
    }
}

fn or_site_default(description: String, site: &SiteMeta) -> String {
    if description.is_empty() {
        truncate_words(&site.description, DESCRIPTION_LIMIT)
    } else {
        description
    }
}

/// Plain-text description: the excerpt, else the body, stripped and cut.
pub fn describe(record: &ContentRecord) -> String {
    let source = if strip_html(&record.description).is_empty() {
        &record.body
    } else {
        &record.description
    };
    truncate_words(&strip_html(source), DESCRIPTION_LIMIT)
}

/// Drop tags, decode entities, collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let text = TAG_RE.replace_all(html, " ");
    let text = decode_html_entities(&text);
    SPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Cut `text` to at most `limit` characters on a word boundary, adding an
/// ellipsis when anything was removed.
pub fn truncate_words(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let budget = limit.saturating_sub(1);
    let cut: String = text.chars().take(budget).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(idx) if idx > 0 => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}\u{2026}", cut.trim_end_matches(|c: char| c.is_whitespace() || c == ',' || c == '.'))
}

fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitesync_core::{MediaRecord, Slug};

    fn site() -> SiteMeta {
        SiteMeta {
            url: "https://news.test".to_string(),
            name: "Daily Test".to_string(),
            description: "All the tests fit to print.".to_string(),
            default_image: Some("https://news.test/og.png".to_string()),
            news_categories: vec!["breaking".to_string()],
        }
    }

    fn snapshot() -> ContentSnapshot {
        let mut snap = ContentSnapshot::empty(Utc::now());
        snap.categories = vec![
            ContentRecord::new(ContentKind::Category, 10, "breaking", "Breaking"),
            ContentRecord::new(ContentKind::Category, 11, "recipes", "Recipes"),
        ];
        snap.authors = vec![ContentRecord::new(ContentKind::Author, 5, "ana", "Ana")];

        let mut news = ContentRecord::new(ContentKind::Post, 1, "storm", "Storm warning");
        news.description = "<p>A storm is <em>coming</em>.</p>".to_string();
        news.relations.categories = vec![10];
        news.relations.author = Some(5);
        news.featured_media = Some(77);
        news.published = Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());

        let mut blog = ContentRecord::new(ContentKind::Post, 2, "soup", "Soup");
        blog.body = "<p>Warm soup.</p>".to_string();
        blog.relations.categories = vec![11];

        snap.posts = vec![news, blog];
        snap.media.insert(
            77,
            MediaRecord {
                id: 77,
                source_url: "https://img.test/storm.jpg".to_string(),
                alt_text: String::new(),
            },
        );
        snap
    }

    #[test]
    fn news_category_yields_news_article() {
        let snap = snapshot();
        let route = Route::for_record(ContentKind::Post, &Slug::from("storm"));
        let meta = derive_metadata(&route, &snap, &site()).unwrap();
        assert_eq!(meta.schema_type(), "NewsArticle");
        assert_eq!(meta.title, "Storm warning | Daily Test");
        assert_eq!(meta.description, "A storm is coming .");
        assert_eq!(meta.canonical, "https://news.test/posts/storm/");
        assert_eq!(meta.image.as_deref(), Some("https://img.test/storm.jpg"));
        assert_eq!(meta.json_ld["author"]["name"], "Ana");
        assert_eq!(meta.json_ld["articleSection"], "Breaking");
        assert_eq!(meta.json_ld["datePublished"], "2024-03-01T08:00:00Z");
    }

    #[test]
    fn other_posts_are_blog_postings() {
        let snap = snapshot();
        let route = Route::for_record(ContentKind::Post, &Slug::from("soup"));
        let meta = derive_metadata(&route, &snap, &site()).unwrap();
        assert_eq!(meta.schema_type(), "BlogPosting");
        assert_eq!(meta.description, "Warm soup.");
        assert_eq!(meta.image.as_deref(), Some("https://news.test/og.png"));
    }

    #[test]
    fn listings_are_collection_pages() {
        let snap = snapshot();
        let route = Route::for_record(ContentKind::Category, &Slug::from("recipes"));
        let meta = derive_metadata(&route, &snap, &site()).unwrap();
        assert_eq!(meta.schema_type(), "CollectionPage");
        assert_eq!(meta.title, "Category: Recipes | Daily Test");
        assert_eq!(meta.description, "Posts filed under Recipes on Daily Test");
    }

    #[test]
    fn home_and_static_fall_back_to_site_defaults() {
        let snap = snapshot();
        let home = derive_metadata(&Route::home(), &snap, &site()).unwrap();
        assert_eq!(home.schema_type(), "WebSite");
        assert_eq!(home.title, "Daily Test");
        assert_eq!(home.description, "All the tests fit to print.");

        let about = derive_metadata(&Route::static_page("/about-us"), &snap, &site()).unwrap();
        assert_eq!(about.title, "About Us | Daily Test");
        assert_eq!(about.canonical, "https://news.test/about-us/");
    }

    #[test]
    fn missing_source_record_is_an_error() {
        let snap = snapshot();
        let route = Route::for_record(ContentKind::Tag, &Slug::from("ghost"));
        let err = derive_metadata(&route, &snap, &site()).unwrap_err();
        assert!(matches!(err, RenderError::MissingRecord { .. }), "got {err:?}");
    }

    #[test]
    fn truncation_respects_word_boundaries() {
        let text = "alpha beta gamma delta";
        assert_eq!(truncate_words(text, 100), text);
        let cut = truncate_words(text, 14);
        assert_eq!(cut, "alpha beta\u{2026}");
        assert!(cut.chars().count() <= 14);
    }

    #[test]
    fn long_descriptions_fit_the_limit() {
        let mut post = ContentRecord::new(ContentKind::Post, 3, "long", "Long");
        post.body = "word ".repeat(100);
        let description = describe(&post);
        assert!(description.chars().count() <= DESCRIPTION_LIMIT);
        assert!(description.ends_with('\u{2026}'));
    }

    #[test]
    fn strip_html_decodes_entities() {
        assert_eq!(strip_html("<p>Fish &amp; chips&nbsp;<br/>today</p>"), "Fish & chips today");
        assert_eq!(strip_html("Jerry&#8217;s &hellip;"), "Jerry\u{2019}s \u{2026}");
    }
}
