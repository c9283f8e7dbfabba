use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::Utc;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

use sitesync_build::chunks;
use sitesync_core::normalize::normalize_all;
use sitesync_core::{config::ENV_VARS, ContentKind, ContentSnapshot};

/// Temp workspace with a config file pointing every directory inside it.
struct Site {
    dir: TempDir,
}

impl Site {
    fn new(api_base_url: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path();
        let config = format!(
            "api_base_url: \"{api_base_url}\"\n\
             site:\n  url: https://press.test\n  name: Press\n\
             output_dir: {}\n\
             cache_dir: {}\n\
             state_dir: {}\n\
             static_routes: [about]\n",
            root.join("dist").display(),
            root.join("cache").display(),
            root.join("state").display(),
        );
        fs::write(root.join("sitesync.yaml"), config).expect("write config");
        Self { dir }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sitesync"));
        for var in ENV_VARS {
            cmd.env_remove(var);
        }
        cmd.env("RUST_LOG", "warn")
            .current_dir(self.dir.path())
            .arg("--config")
            .arg(self.path("sitesync.yaml"));
        cmd
    }

    fn seed_snapshot(&self) {
        let mut snapshot = ContentSnapshot::empty(Utc::now());
        snapshot.posts = normalize_all(
            ContentKind::Post,
            &[json!({"id": 1, "slug": "hello", "title": {"rendered": "Hello"},
                     "content": {"rendered": "<p>Hi</p>"}, "categories": [3],
                     "date_gmt": "2024-05-01T09:00:00"})],
        );
        snapshot.categories = normalize_all(
            ContentKind::Category,
            &[json!({"id": 3, "slug": "news", "name": "News", "count": 1})],
        );
        chunks::save_snapshot(&self.path("state"), &snapshot, 50).expect("seed snapshot");
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is JSON")
}

fn exists(path: &Path) -> bool {
    path.is_file()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn help_lists_subcommands() {
    Command::new(assert_cmd::cargo::cargo_bin!("sitesync"))
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("sync"))
        .stdout(contains("build"))
        .stdout(contains("cache"))
        .stdout(contains("status"));
}

#[test]
fn status_json_on_fresh_workspace() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    let output = site.cmd().args(["status", "--json"]).output().expect("run status");
    assert!(output.status.success());

    let report = stdout_json(&output);
    assert!(report["manifest"].is_null());
    assert!(report["pending"].is_null());
    assert!(report["snapshot"].is_null());
    assert_eq!(report["cache"]["exists"], json!(false));
}

#[test]
fn build_without_snapshot_points_at_sync() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    site.cmd()
        .arg("build")
        .assert()
        .failure()
        .stderr(contains("sitesync sync"));
}

#[test]
fn sync_without_api_url_fails() {
    let site = Site::new("");
    site.cmd()
        .arg("sync")
        .assert()
        .failure()
        .stderr(contains("api_base_url"));
}

#[test]
fn missing_explicit_config_fails() {
    let site = Site::new("https://cms.test");
    Command::new(assert_cmd::cargo::cargo_bin!("sitesync"))
        .current_dir(site.dir.path())
        .args(["--config", "nope.yaml", "status"])
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn build_from_seeded_snapshot_writes_site() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    site.seed_snapshot();

    site.cmd()
        .arg("build")
        .assert()
        .success()
        .stdout(contains("full build"));

    assert!(exists(&site.path("dist/index.html")));
    assert!(exists(&site.path("dist/posts/hello/index.html")));
    assert!(exists(&site.path("dist/category/news/index.html")));
    assert!(exists(&site.path("dist/about/index.html")));
    assert!(exists(&site.path("dist/sitemap.xml")));
    assert!(exists(&site.path("dist/robots.txt")));
    assert!(exists(&site.path("state/manifest.json")));

    let output = site.cmd().args(["status", "--json"]).output().expect("run status");
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["manifest"]["counts"]["posts"], json!(1));
    assert_eq!(report["snapshot"]["totalPosts"], json!(1));
    assert_eq!(report["cache"]["exists"], json!(true));

    site.cmd()
        .arg("build")
        .assert()
        .success()
        .stdout(contains("partial build"));
}

#[test]
fn build_lists_failed_routes_with_their_error() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    site.seed_snapshot();
    fs::create_dir_all(site.path("templates")).expect("mkdir");
    fs::write(site.path("templates/post.html.tera"), "{{ no_such_variable }}").expect("write");
    let mut config = fs::read_to_string(site.path("sitesync.yaml")).expect("read config");
    config.push_str(&format!("template_dir: {}\n", site.path("templates").display()));
    fs::write(site.path("sitesync.yaml"), config).expect("write config");

    let output = site.cmd().arg("build").output().expect("run build");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 failed"), "got: {stdout}");
    assert!(stdout.contains("/posts/hello/: template engine error"), "got: {stdout}");
    assert!(!stdout.contains('\u{2014}'), "got: {stdout}");
    assert!(exists(&site.path("dist/category/news/index.html")));
}

#[test]
fn zero_request_timeout_is_a_config_error() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    site.cmd()
        .env("SITESYNC_REQUEST_TIMEOUT", "0")
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("request_timeout_secs must be greater than zero"));
}

#[test]
fn cache_save_stats_and_clean() {
    let site = Site::new("https://cms.test/wp-json/wp/v2");
    fs::create_dir_all(site.path("dist/posts/a")).expect("mkdir");
    fs::write(site.path("dist/posts/a/index.html"), "<html>a</html>").expect("write page");
    fs::write(site.path("dist/index.html"), "<html>home</html>").expect("write page");

    let output = site
        .cmd()
        .args(["cache", "save", "--json"])
        .output()
        .expect("run cache save");
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["copied"], json!(2));

    let output = site
        .cmd()
        .args(["cache", "stats", "--json"])
        .output()
        .expect("run cache stats");
    assert!(output.status.success());
    let stats = stdout_json(&output);
    assert_eq!(stats["exists"], json!(true));
    assert_eq!(stats["pages"], json!(2));

    fs::remove_file(site.path("dist/index.html")).expect("remove page");
    site.cmd()
        .args(["cache", "restore"])
        .assert()
        .success()
        .stdout(contains("1 copied"));
    assert!(exists(&site.path("dist/index.html")));

    site.cmd()
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(contains("removed"));
    site.cmd()
        .args(["cache", "clean"])
        .assert()
        .success()
        .stdout(contains("Nothing to clean"));
}
