//! Template context: serializable rendering payload built from a route and
//! the snapshot.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use sitesync_core::{routes::record_path, ContentKind, ContentRecord, ContentSnapshot, RouteKind};

use crate::error::RenderError;
use crate::prerender::RenderInput;
use crate::seo::{describe, page_title, source_record};

#[derive(Debug, Clone, Serialize)]
pub struct PageContext {
    pub site: SiteCtx,
    pub page: PageCtx,
    /// The route's own record; `None` for home and static pages.
    pub record: Option<RecordCtx>,
    /// Posts shown on listing pages, newest first.
    pub listing: Vec<PostSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteCtx {
    pub name: String,
    pub url: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageCtx {
    pub path: String,
    pub kind: String,
    pub title: String,
    pub canonical: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordCtx {
    pub slug: String,
    pub title: String,
    pub body: String,
    pub description: String,
    pub published: Option<String>,
    pub published_label: Option<String>,
    pub modified: Option<String>,
    pub image: Option<ImageCtx>,
    pub categories: Vec<LinkCtx>,
    pub tags: Vec<LinkCtx>,
    pub author: Option<LinkCtx>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageCtx {
    pub url: String,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkCtx {
    pub title: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    pub title: String,
    pub path: String,
    pub excerpt: String,
    pub published_label: Option<String>,
}

impl PageContext {
    pub fn build(input: &RenderInput<'_>) -> Result<Self, RenderError> {
        let RenderInput { route, snapshot, site, home_listing } = *input;
        let record = source_record(route, snapshot)?;

        let listing = match (route.kind, record) {
            (RouteKind::Home, _) => summaries(snapshot.ranked_posts().into_iter().take(home_listing)),
            (RouteKind::Category | RouteKind::Tag | RouteKind::Author, Some(r)) => {
                summaries(posts_filed_under(snapshot, r))
            }
            _ => Vec::new(),
        };

        Ok(Self {
            site: SiteCtx {
                name: site.name.clone(),
                url: site.url.clone(),
                description: site.description.clone(),
            },
            page: PageCtx {
                path: route.path.clone(),
                kind: route.kind.to_string(),
                title: page_title(route, record, site),
                canonical: site.absolute_url(&route.path),
            },
            record: record.map(|r| record_ctx(r, snapshot)),
            listing,
        })
    }

    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        tera::Context::from_serialize(self).map_err(RenderError::from)
    }
}

/// Posts related to a taxonomy or author record, in ranked order.
pub fn posts_filed_under<'s>(
    snapshot: &'s ContentSnapshot,
    record: &ContentRecord,
) -> impl Iterator<Item = &'s ContentRecord> {
    let (kind, id) = (record.kind, record.id);
    snapshot.ranked_posts().into_iter().filter(move |post| match kind {
        ContentKind::Category => post.relations.categories.contains(&id),
        ContentKind::Tag => post.relations.tags.contains(&id),
        ContentKind::Author => post.relations.author == Some(id),
        ContentKind::Post => false,
    })
}

fn summaries<'s>(posts: impl Iterator<Item = &'s ContentRecord>) -> Vec<PostSummary> {
    posts
        .map(|post| PostSummary {
            title: post.title.clone(),
            path: record_path(ContentKind::Post, &post.slug),
            excerpt: describe(post),
            published_label: post.published.map(label),
        })
        .collect()
}

fn record_ctx(record: &ContentRecord, snapshot: &ContentSnapshot) -> RecordCtx {
    let links = |kind: ContentKind, ids: &[u64]| -> Vec<LinkCtx> {
        ids.iter()
            .filter_map(|id| snapshot.find_by_id(kind, *id))
            .map(|r| LinkCtx {
                title: r.title.clone(),
                path: record_path(kind, &r.slug),
            })
            .collect()
    };
    let author = record
        .relations
        .author
        .map(|id| links(ContentKind::Author, &[id]))
        .and_then(|mut found| found.pop());
    let image = record
        .featured_media
        .and_then(|id| snapshot.media.get(&id))
        .map(|m| ImageCtx {
            url: m.source_url.clone(),
            alt: if m.alt_text.is_empty() {
                record.title.clone()
            } else {
                m.alt_text.clone()
            },
        });

    RecordCtx {
        slug: record.slug.to_string(),
        title: record.title.clone(),
        body: record.body.clone(),
        description: record.description.clone(),
        published: record.published.map(iso),
        published_label: record.published.map(label),
        modified: record.modified.map(iso),
        image,
        categories: links(ContentKind::Category, &record.relations.categories),
        tags: links(ContentKind::Tag, &record.relations.tags),
        author,
    }
}

fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn label(ts: DateTime<Utc>) -> String {
    ts.format("%B %-d, %Y").to_string()
}
