//! Tera rendering engine: [`TemplateEngine`] and the default
//! [`TemplateRenderer`].
//!
//! # Template mapping
//!
//! | Route kind              | Template             |
//! |-------------------------|----------------------|
//! | Home                    | `home.html.tera`     |
//! | Post                    | `post.html.tera`     |
//! | Category / Tag / Author | `listing.html.tera`  |
//! | Static                  | `static.html.tera`   |
//!
//! All page templates extend `layout.html.tera`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tera::Tera;

use sitesync_core::RouteKind;

use crate::context::PageContext;
use crate::error::RenderError;
use crate::prerender::{PageRenderer, RenderInput};

// ---------------------------------------------------------------------------
// Embedded templates, baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("layout.html.tera", include_str!("templates/layout.html.tera")),
    ("_post_list.html.tera", include_str!("templates/_post_list.html.tera")),
    ("home.html.tera", include_str!("templates/home.html.tera")),
    ("post.html.tera", include_str!("templates/post.html.tera")),
    ("listing.html.tera", include_str!("templates/listing.html.tera")),
    ("static.html.tera", include_str!("templates/static.html.tera")),
];

/// Suffix that turns on HTML autoescaping.
const AUTOESCAPE_SUFFIX: &str = ".html.tera";

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.exists() {
        tracing::warn!(dir = %dir.display(), "template directory missing, using embedded templates");
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        tracing::debug!(template = %name, "user template override");
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(
            normalize_template_name(Path::new(name)),
            (*content).to_string(),
        );
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![AUTOESCAPE_SUFFIX]);
    let items: Vec<(String, String)> = templates.into_iter().collect();
    tera.add_raw_templates(items)?;
    Ok(tera)
}

/// Template used for a route kind.
pub fn template_name(kind: RouteKind) -> &'static str {
    match kind {
        RouteKind::Home => "home.html.tera",
        RouteKind::Post => "post.html.tera",
        RouteKind::Category | RouteKind::Tag | RouteKind::Author => "listing.html.tera",
        RouteKind::Static => "static.html.tera",
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for rendering templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded
/// defaults by relative path. Template names are normalised to lowercase.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    pub fn render(&self, name: &str, ctx: &PageContext) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        Ok(self.tera.render(name, &tera_ctx)?)
    }
}

// ---------------------------------------------------------------------------
// TemplateRenderer
// ---------------------------------------------------------------------------

/// Default [`PageRenderer`]: one tera template per route kind.
pub struct TemplateRenderer {
    engine: TemplateEngine,
}

impl TemplateRenderer {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        Ok(TemplateRenderer {
            engine: TemplateEngine::new(user_template_dir)?,
        })
    }
}

impl PageRenderer for TemplateRenderer {
    fn render_body(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        let ctx = PageContext::build(input)?;
        self.engine.render(template_name(input.route.kind), &ctx)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sitesync_core::{ContentKind, ContentRecord, ContentSnapshot, Route, SiteMeta, Slug};
    use tempfile::TempDir;

    fn snapshot() -> ContentSnapshot {
        let mut snap = ContentSnapshot::empty(Utc::now());
        let mut post = ContentRecord::new(ContentKind::Post, 1, "hello", "Hello <World>");
        post.body = "<p>Body <strong>text</strong></p>".to_string();
        post.relations.categories = vec![2];
        snap.posts = vec![post];
        snap.categories = vec![ContentRecord::new(ContentKind::Category, 2, "news", "News")];
        snap
    }

    fn render(renderer: &TemplateRenderer, route: &Route) -> String {
        let snap = snapshot();
        let site = SiteMeta::default();
        renderer
            .render_body(&RenderInput {
                route,
                snapshot: &snap,
                site: &site,
                home_listing: 10,
            })
            .unwrap_or_else(|e| panic!("render failed for {}: {e}", route.path))
    }

    #[test]
    fn every_route_kind_renders() {
        let renderer = TemplateRenderer::new(None).expect("embedded templates");
        let routes = [
            Route::home(),
            Route::static_page("about"),
            Route::for_record(ContentKind::Post, &Slug::from("hello")),
            Route::for_record(ContentKind::Category, &Slug::from("news")),
        ];
        for route in &routes {
            let html = render(&renderer, route);
            assert!(html.contains("</head>"), "{} has no head", route.path);
            assert!(!html.contains('\r'), "{} contains CR", route.path);
        }
    }

    #[test]
    fn titles_are_escaped_and_bodies_are_not() {
        let renderer = TemplateRenderer::new(None).unwrap();
        let html = render(&renderer, &Route::for_record(ContentKind::Post, &Slug::from("hello")));
        assert!(html.contains("<h1>Hello &lt;World&gt;</h1>"));
        assert!(html.contains("<p>Body <strong>text</strong></p>"));
    }

    #[test]
    fn listing_shows_filed_posts() {
        let renderer = TemplateRenderer::new(None).unwrap();
        let html = render(&renderer, &Route::for_record(ContentKind::Category, &Slug::from("news")));
        assert!(html.contains("Hello &lt;World&gt;"));
    }

    #[test]
    fn user_templates_override_embedded_ones() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("static.html.tera"),
            "<html><head></head><body>custom {{ page.path }}</body></html>",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let renderer = TemplateRenderer::new(Some(dir.path())).unwrap();
        let html = render(&renderer, &Route::static_page("/terms/"));
        assert!(html.contains("custom"), "override not used: {html}");
    }

    #[test]
    fn missing_template_dir_falls_back_to_embedded() {
        let dir = TempDir::new().unwrap();
        let renderer = TemplateRenderer::new(Some(&dir.path().join("nope"))).unwrap();
        let html = render(&renderer, &Route::home());
        assert!(html.contains("<main>"));
    }
}
