//! Route derivation.
//!
//! Routes are recomputed from the whole snapshot on every run, never patched.
//!
//! | Kind     | Path               |
//! |----------|--------------------|
//! | Home     | `/`                |
//! | Post     | `/posts/<slug>/`   |
//! | Category | `/category/<slug>/`|
//! | Tag      | `/tag/<slug>/`     |
//! | Author   | `/author/<slug>/`  |
//! | Static   | configured         |

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::{ContentKind, ContentSnapshot, Slug};

pub const HOME_PATH: &str = "/";

/// What produced a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteKind {
    Home,
    Post,
    Category,
    Tag,
    Author,
    Static,
}

impl RouteKind {
    pub fn for_content(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Post => RouteKind::Post,
            ContentKind::Category => RouteKind::Category,
            ContentKind::Tag => RouteKind::Tag,
            ContentKind::Author => RouteKind::Author,
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteKind::Home => "home",
            RouteKind::Post => "post",
            RouteKind::Category => "category",
            RouteKind::Tag => "tag",
            RouteKind::Author => "author",
            RouteKind::Static => "static",
        };
        f.write_str(s)
    }
}

/// The record a route renders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteSource {
    pub kind: ContentKind,
    pub slug: Slug,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub path: String,
    pub kind: RouteKind,
    pub source: Option<RouteSource>,
}

impl Route {
    pub fn home() -> Self {
        Self {
            path: HOME_PATH.to_string(),
            kind: RouteKind::Home,
            source: None,
        }
    }

    pub fn for_record(kind: ContentKind, slug: &Slug) -> Self {
        Self {
            path: record_path(kind, slug),
            kind: RouteKind::for_content(kind),
            source: Some(RouteSource {
                kind,
                slug: slug.clone(),
            }),
        }
    }

    pub fn static_page(path: &str) -> Self {
        Self {
            path: normalize_path(path),
            kind: RouteKind::Static,
            source: None,
        }
    }

    /// `<root>/<path>/index.html`. `.` and `..` segments are dropped.
    pub fn output_file(&self, root: &Path) -> PathBuf {
        output_file_for(root, &self.path)
    }
}

/// Canonical path for a record's own page.
pub fn record_path(kind: ContentKind, slug: &Slug) -> String {
    match kind {
        ContentKind::Post => format!("/posts/{slug}/"),
        ContentKind::Category => format!("/category/{slug}/"),
        ContentKind::Tag => format!("/tag/{slug}/"),
        ContentKind::Author => format!("/author/{slug}/"),
    }
}

/// Output document for a route path.
pub fn output_file_for(root: &Path, path: &str) -> PathBuf {
    let mut file = root.to_path_buf();
    for segment in path
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
    {
        file.push(segment);
    }
    file.join("index.html")
}

/// Leading and trailing slash, no duplicate slashes.
pub fn normalize_path(path: &str) -> String {
    let inner: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if inner.is_empty() {
        return HOME_PATH.to_string();
    }
    format!("/{}/", inner.join("/"))
}

/// Full route list in stable order: home, static routes, posts, categories,
/// tags, authors. Duplicate paths keep their first occurrence.
pub fn derive_routes(snapshot: &ContentSnapshot, static_routes: &[String]) -> Vec<Route> {
    let mut seen = HashSet::new();
    let mut routes = Vec::with_capacity(snapshot.total_records() + static_routes.len() + 1);

    let mut push = |route: Route, routes: &mut Vec<Route>| {
        if seen.insert(route.path.clone()) {
            routes.push(route);
        } else {
            tracing::warn!(path = %route.path, "duplicate route skipped");
        }
    };

    push(Route::home(), &mut routes);
    for path in static_routes {
        push(Route::static_page(path), &mut routes);
    }
    for kind in ContentKind::all() {
        for record in snapshot.records(*kind) {
            push(Route::for_record(*kind, &record.slug), &mut routes);
        }
    }
    routes
}
