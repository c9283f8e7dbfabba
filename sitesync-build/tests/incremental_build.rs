//! End-to-end sync + build runs against an in-memory CMS.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tempfile::TempDir;

use sitesync_build::manifest::{self, pending_path_at};
use sitesync_build::{
    build_with, chunks, run_with, sync_with, BuildError, RebuildReason, MANIFEST_VERSION,
};
use sitesync_core::{ContentKind, SiteConfig, SiteMeta, Slug};
use sitesync_fetch::{FetchOptions, Fetcher, HttpResponse, RetryPolicy, Transport, TransportError};
use sitesync_render::{PageRenderer, Prerenderer, RenderError, RenderInput};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Serves every collection on page 1; later pages are empty.
#[derive(Default)]
struct Cms {
    collections: Mutex<HashMap<String, Vec<Value>>>,
}

impl Cms {
    fn seeded() -> Arc<Self> {
        let cms = Self::default();
        cms.set(
            "posts",
            vec![
                json!({"id": 10, "slug": "alpha", "title": {"rendered": "Alpha"},
                       "content": {"rendered": "<p>A</p>"}, "categories": [1], "author": 9,
                       "date_gmt": "2024-05-02T09:00:00"}),
                json!({"id": 11, "slug": "beta", "title": {"rendered": "Beta"},
                       "content": {"rendered": "<p>B</p>"}, "categories": [2],
                       "date_gmt": "2024-05-01T09:00:00"}),
            ],
        );
        cms.set(
            "categories",
            vec![
                json!({"id": 1, "slug": "news", "name": "News", "count": 1}),
                json!({"id": 2, "slug": "sport", "name": "Sport", "count": 1}),
            ],
        );
        cms.set("tags", vec![]);
        cms.set("authors", vec![json!({"id": 9, "slug": "kim", "name": "Kim"})]);
        Arc::new(cms)
    }

    fn set(&self, endpoint: &str, items: Vec<Value>) {
        self.collections
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), items);
    }

    fn edit(&self, endpoint: &str, f: impl FnOnce(&mut Vec<Value>)) {
        let mut collections = self.collections.lock().unwrap();
        f(collections.get_mut(endpoint).unwrap());
    }
}

impl Transport for Cms {
    fn get(&self, url: &str) -> Result<HttpResponse, TransportError> {
        let path = url
            .strip_prefix("https://cms.test/")
            .ok_or_else(|| TransportError::Invalid(url.to_string()))?;
        let (endpoint, query) = path.split_once('?').unwrap_or((path, ""));
        if !query.split('&').any(|p| p == "page=1") {
            return Ok(HttpResponse::ok("[]"));
        }
        let items = self
            .collections
            .lock()
            .unwrap()
            .get(endpoint)
            .cloned()
            .unwrap_or_default();
        Ok(HttpResponse::ok(Value::Array(items).to_string()))
    }
}

/// Minimal shell renderer that fails for one route.
struct FailOn(&'static str);

impl PageRenderer for FailOn {
    fn render_body(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        if input.route.path == self.0 {
            return Err(RenderError::MissingRecord {
                route: input.route.path.clone(),
                kind: ContentKind::Post,
                slug: Slug::from("broken"),
            });
        }
        Ok(format!(
            "<html><head></head><body>{}</body></html>",
            input.route.path
        ))
    }
}

/// Shell renderer that panics for one route.
struct PanicOn(&'static str);

impl PageRenderer for PanicOn {
    fn render_body(&self, input: &RenderInput<'_>) -> Result<String, RenderError> {
        if input.route.path == self.0 {
            panic!("template blew up on {}", input.route.path);
        }
        Ok(format!(
            "<html><head></head><body>{}</body></html>",
            input.route.path
        ))
    }
}

/// `n` posts in category 1, `p0` newest.
fn many_posts(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({"id": 100 + i, "slug": format!("p{i}"), "title": {"rendered": format!("Post {i}")},
                   "content": {"rendered": "<p>body</p>"}, "categories": [1],
                   "date_gmt": format!("2024-05-{:02}T09:00:00", 28 - i)})
        })
        .collect()
}

fn read(config: &SiteConfig, page: &str) -> String {
    std::fs::read_to_string(config.output_dir.join(page)).unwrap()
}

fn config(root: &Path) -> SiteConfig {
    SiteConfig {
        api_base_url: "https://cms.test".to_string(),
        site: SiteMeta {
            url: "https://press.test".to_string(),
            name: "Press".to_string(),
            ..SiteMeta::default()
        },
        output_dir: root.join("dist"),
        cache_dir: root.join("cache"),
        state_dir: root.join("state"),
        static_routes: vec!["about".to_string()],
        ..SiteConfig::default()
    }
}

fn fetcher(cms: &Arc<Cms>, config: &SiteConfig) -> Arc<Fetcher> {
    Arc::new(Fetcher::new(
        Arc::clone(cms) as Arc<dyn Transport>,
        config.api_base_url.clone(),
        RetryPolicy::immediate(2),
        FetchOptions::from_config(config),
    ))
}

fn prerenderer(config: &SiteConfig) -> Arc<Prerenderer> {
    Arc::new(Prerenderer::from_config(config).unwrap())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread")]
async fn first_run_is_a_full_build_and_commits_the_manifest() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();

    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    assert_eq!(summary.sync.counts.posts, 2);
    assert_eq!(summary.build.reason, Some(RebuildReason::NoManifest));
    assert_eq!(summary.build.routes_total, 7);
    assert_eq!(summary.build.written, 7);
    assert!(summary.build.failed.is_empty());
    assert_eq!(summary.build.sitemap_entries, 7);

    let out = config.output_dir.as_path();
    assert!(out.join("posts/alpha/index.html").is_file());
    assert!(out.join("about/index.html").is_file());
    assert!(out.join("sitemap.xml").is_file());
    assert!(out.join("robots.txt").is_file());
    assert!(config.cache_dir.join("pages/posts/alpha/index.html").is_file());

    let committed = manifest::load_at(&config.state_dir).unwrap().unwrap();
    assert_eq!(committed.version, MANIFEST_VERSION);
    assert_eq!(committed.content_hashes.posts.len(), 2);
    assert!(!pending_path_at(&config.state_dir).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_content_renders_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    let second = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();
    assert!(!second.build.full_rebuild);
    assert_eq!(second.build.selected, 0);
    assert_eq!(second.build.written, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn title_change_rerenders_post_and_its_listings() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    cms.edit("posts", |posts| posts[0]["title"] = json!({"rendered": "Alpha v2"}));
    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    let changed: Vec<&str> = summary
        .sync
        .changes
        .changed_routes
        .iter()
        .map(String::as_str)
        .collect();
    assert_eq!(changed, vec!["/", "/author/kim/", "/category/news/", "/posts/alpha/"]);
    assert_eq!(summary.build.selected, 4);
    let html = std::fs::read_to_string(config.output_dir.join("posts/alpha/index.html")).unwrap();
    assert!(html.contains("Alpha v2"));
}

#[tokio::test(flavor = "multi_thread")]
async fn deleted_post_is_evicted_from_output_and_cache() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    cms.edit("posts", |posts| {
        posts.remove(1);
    });
    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    assert_eq!(summary.build.evicted, 2);
    assert_eq!(summary.build.selected, 1, "only the home listing is re-rendered");
    assert!(!config.output_dir.join("posts/beta/index.html").exists());
    assert!(!config.cache_dir.join("pages/posts/beta/index.html").exists());
    let sitemap = std::fs::read_to_string(config.output_dir.join("sitemap.xml")).unwrap();
    assert!(!sitemap.contains("/posts/beta/"));
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_writes_pending_manifest_and_build_promotes_it() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();

    let dry = sync_with(&config, fetcher(&cms, &config), true).await.unwrap();
    assert!(dry.dry_run);
    assert!(dry.chunks.is_none());
    assert!(!chunks::snapshot_exists(&config.state_dir));

    let synced = sync_with(&config, fetcher(&cms, &config), false).await.unwrap();
    assert_eq!(synced.chunks.as_ref().map(|c| c.total_posts), Some(2));
    assert!(manifest::load_pending_at(&config.state_dir).unwrap().is_some());
    assert!(manifest::load_at(&config.state_dir).unwrap().is_none());

    let built = build_with(&config, prerenderer(&config), false).await.unwrap();
    assert_eq!(built.written, 7);
    assert!(manifest::load_pending_at(&config.state_dir).unwrap().is_none());
    assert!(manifest::load_at(&config.state_dir).unwrap().is_some());

    let forced = build_with(&config, prerenderer(&config), true).await.unwrap();
    assert_eq!(forced.reason, Some(RebuildReason::Forced));
    assert_eq!(forced.selected, 7);
    assert_eq!(forced.unchanged, 7);
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_route_is_left_out_of_the_manifest_and_retried() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    let failing = Arc::new(Prerenderer::new(
        Arc::new(FailOn("/posts/beta/")),
        config.site.clone(),
    ));

    let first = run_with(&config, fetcher(&cms, &config), Arc::clone(&failing), false)
        .await
        .unwrap();
    assert_eq!(first.build.failed.len(), 1);
    assert_eq!(first.build.failed[0].route, "/posts/beta/");
    assert_eq!(first.build.written, 6, "other routes still render");

    let committed = manifest::load_at(&config.state_dir).unwrap().unwrap();
    assert!(committed.content_hashes.posts.contains_key(&Slug::from("alpha")));
    assert!(!committed.content_hashes.posts.contains_key(&Slug::from("beta")));

    let healthy = Arc::new(Prerenderer::new(Arc::new(FailOn("/nowhere/")), config.site.clone()));
    let second = run_with(&config, fetcher(&cms, &config), healthy, false)
        .await
        .unwrap();
    assert!(second.sync.changes.changed_routes.contains("/posts/beta/"));
    assert!(second.build.failed.is_empty());
    assert!(config.output_dir.join("posts/beta/index.html").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn build_without_snapshot_fails_loudly() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let err = build_with(&config, prerenderer(&config), false)
        .await
        .unwrap_err();
    assert!(matches!(err, BuildError::MissingSnapshot { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_aborts_sync_without_writing_state() {
    struct Down;
    impl Transport for Down {
        fn get(&self, _url: &str) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::status(503))
        }
    }

    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.cooldown.threshold = 100;
    let fetcher = Arc::new(Fetcher::new(
        Arc::new(Down),
        config.api_base_url.clone(),
        RetryPolicy::immediate(2),
        FetchOptions::from_config(&config),
    ));

    let err = sync_with(&config, fetcher, false).await.unwrap_err();
    assert!(matches!(err, BuildError::Fetch(_)));
    assert!(!chunks::snapshot_exists(&config.state_dir));
    assert!(manifest::load_pending_at(&config.state_dir).unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn stored_snapshot_round_trips() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.chunk_size = 1;
    let cms = Cms::seeded();
    sync_with(&config, fetcher(&cms, &config), false).await.unwrap();

    let snapshot = chunks::load_snapshot(&config.state_dir).unwrap();
    let slugs: Vec<&str> = snapshot.posts.iter().map(|p| p.slug.as_str()).collect();
    assert_eq!(slugs, vec!["alpha", "beta"]);
    assert_eq!(snapshot.categories.len(), 2);
    assert_eq!(snapshot.authors[0].title, "Kim");
    let index = chunks::load_index(&chunks::content_dir(&config.state_dir)).unwrap();
    assert_eq!(index.chunks.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_renderer_fails_one_route_and_the_build_continues() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    let panicking = Arc::new(Prerenderer::new(
        Arc::new(PanicOn("/posts/beta/")),
        config.site.clone(),
    ));

    let first = run_with(&config, fetcher(&cms, &config), panicking, false)
        .await
        .unwrap();
    assert_eq!(first.build.failed.len(), 1);
    assert_eq!(first.build.failed[0].route, "/posts/beta/");
    assert!(first.build.failed[0].error.contains("renderer panicked"));
    assert!(first.build.failed[0].error.contains("template blew up"));
    assert_eq!(first.build.written, 6);
    assert!(config.output_dir.join("posts/alpha/index.html").is_file());
    assert!(config.output_dir.join("sitemap.xml").is_file());

    let committed = manifest::load_at(&config.state_dir).unwrap().unwrap();
    assert!(!committed.content_hashes.posts.contains_key(&Slug::from("beta")));

    let second = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();
    assert!(second.build.failed.is_empty());
    assert!(read(&config, "posts/beta/index.html").contains("Beta"));
}

#[tokio::test(flavor = "multi_thread")]
async fn retitled_post_refreshes_a_home_page_wider_than_ten() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(tmp.path());
    config.invalidation.home_window = 15;
    let cms = Cms::seeded();
    cms.set("posts", many_posts(15));
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();
    assert!(read(&config, "index.html").contains("Post 12<"));

    cms.edit("posts", |posts| posts[12]["title"] = json!({"rendered": "Retitled"}));
    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    let changed = &summary.sync.changes.changed_routes;
    assert!(changed.contains("/"));
    assert!(changed.contains("/category/news/"));
    let home = read(&config, "index.html");
    assert!(home.contains("Retitled"));
    assert!(!home.contains("Post 12<"));
}

#[tokio::test(flavor = "multi_thread")]
async fn home_page_lists_exactly_the_invalidation_window() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    cms.set("posts", many_posts(15));
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    let home = read(&config, "index.html");
    assert!(home.contains("href=\"/posts/p9/\""));
    assert!(!home.contains("href=\"/posts/p10/\""));

    cms.edit("posts", |posts| posts[12]["title"] = json!({"rendered": "Retitled"}));
    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();
    let changed = &summary.sync.changes.changed_routes;
    assert!(!changed.contains("/"), "p12 is outside the home listing");
    assert!(changed.contains("/category/news/"));
    assert!(read(&config, "category/news/index.html").contains("Retitled"));
}

#[tokio::test(flavor = "multi_thread")]
async fn retitled_post_refreshes_its_category_listing() {
    let tmp = TempDir::new().unwrap();
    let config = config(tmp.path());
    let cms = Cms::seeded();
    run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();
    assert!(read(&config, "category/sport/index.html").contains(">Beta<"));

    cms.edit("posts", |posts| posts[1]["title"] = json!({"rendered": "Beta Cup Final"}));
    let summary = run_with(&config, fetcher(&cms, &config), prerenderer(&config), false)
        .await
        .unwrap();

    let changed = &summary.sync.changes.changed_routes;
    assert!(changed.contains("/category/sport/"));
    assert!(!changed.contains("/category/news/"));
    let listing = read(&config, "category/sport/index.html");
    assert!(listing.contains("Beta Cup Final"));
    assert!(!listing.contains(">Beta<"));
}
