//! Layered site configuration.
//!
//! # Resolution order
//!
//! 1. Built-in defaults ([`SiteConfig::default`])
//! 2. YAML file: `--config <file>`, else `./sitesync.yaml`, else
//!    `<config_dir>/sitesync/config.yaml`
//! 3. Environment overrides (`SITESYNC_*`, see [`ENV_VARS`])
//!
//! Only an explicitly requested file is required to exist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_FILE_NAME: &str = "sitesync.yaml";

pub const ENV_API_URL: &str = "SITESYNC_API_URL";
pub const ENV_OUTPUT_DIR: &str = "SITESYNC_OUTPUT_DIR";
pub const ENV_CACHE_DIR: &str = "SITESYNC_CACHE_DIR";
pub const ENV_STATE_DIR: &str = "SITESYNC_STATE_DIR";
pub const ENV_CHUNK_SIZE: &str = "SITESYNC_CHUNK_SIZE";
pub const ENV_REQUEST_TIMEOUT: &str = "SITESYNC_REQUEST_TIMEOUT";
pub const ENV_MAX_CHANGED_ROUTES: &str = "SITESYNC_MAX_CHANGED_ROUTES";

/// Every environment variable consulted by [`SiteConfig::apply_env`].
pub const ENV_VARS: &[&str] = &[
    ENV_API_URL,
    ENV_OUTPUT_DIR,
    ENV_CACHE_DIR,
    ENV_STATE_DIR,
    ENV_CHUNK_SIZE,
    ENV_REQUEST_TIMEOUT,
    ENV_MAX_CHANGED_ROUTES,
];

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Site-wide metadata used for defaults, canonical links and the sitemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteMeta {
    /// Absolute site origin without trailing slash, e.g. `https://example.com`.
    pub url: String,
    pub name: String,
    pub description: String,
    pub default_image: Option<String>,
    /// Category slugs whose posts are emitted as `NewsArticle`.
    pub news_categories: Vec<String>,
}

impl Default for SiteMeta {
    fn default() -> Self {
        Self {
            url: "http://localhost".to_string(),
            name: "sitesync".to_string(),
            description: String::new(),
            default_image: None,
            news_categories: Vec::new(),
        }
    }
}

impl SiteMeta {
    /// Absolute URL for a route path.
    pub fn absolute_url(&self, path: &str) -> String {
        format!("{}{}", self.url.trim_end_matches('/'), path)
    }
}

/// Which listing routes are re-marked when a post changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationPolicy {
    pub categories: bool,
    pub tags: bool,
    pub author: bool,
    /// A changed post within the `home_window` most recent posts marks `/`.
    pub home_window: usize,
}

impl Default for InvalidationPolicy {
    fn default() -> Self {
        Self {
            categories: true,
            tags: true,
            author: true,
            home_window: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    pub every_pages: u32,
    pub validity_secs: u64,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            every_pages: 5,
            validity_secs: 1_800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownSettings {
    /// Consecutive failed attempts before pausing.
    pub threshold: u32,
    pub secs: u64,
    pub probe_attempts: u32,
}

impl Default for CooldownSettings {
    fn default() -> Self {
        Self {
            threshold: 3,
            secs: 30,
            probe_attempts: 3,
        }
    }
}

// ---------------------------------------------------------------------------
// SiteConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Content API root, e.g. `https://cms.example.com/wp-json/wp/v2`.
    pub api_base_url: String,
    pub site: SiteMeta,
    pub output_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Manifest, snapshot chunks and fetch checkpoints live here.
    pub state_dir: PathBuf,
    /// Compiled client assets saved alongside rendered pages.
    pub assets_dir: Option<PathBuf>,
    /// `.tera` overrides for the embedded document templates.
    pub template_dir: Option<PathBuf>,
    pub static_routes: Vec<String>,
    pub robots_disallow: Vec<String>,
    pub chunk_size: usize,
    pub per_page: u32,
    pub request_timeout_secs: u64,
    pub max_changed_routes: usize,
    pub retry: RetrySettings,
    pub checkpoint: CheckpointSettings,
    pub cooldown: CooldownSettings,
    pub media_batch_size: usize,
    pub render_batch_size: usize,
    pub invalidation: InvalidationPolicy,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            api_base_url: String::new(),
            site: SiteMeta::default(),
            output_dir: PathBuf::from("dist"),
            cache_dir: PathBuf::from(".sitesync/cache"),
            state_dir: PathBuf::from(".sitesync/state"),
            assets_dir: None,
            template_dir: None,
            static_routes: Vec::new(),
            robots_disallow: Vec::new(),
            chunk_size: 50,
            per_page: 100,
            request_timeout_secs: 30,
            max_changed_routes: 50,
            retry: RetrySettings::default(),
            checkpoint: CheckpointSettings::default(),
            cooldown: CooldownSettings::default(),
            media_batch_size: 5,
            render_batch_size: 8,
            invalidation: InvalidationPolicy::default(),
        }
    }
}

impl SiteConfig {
    /// Resolve, parse, apply environment overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match locate(explicit)? {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading config file");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file. An empty file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Apply `SITESYNC_*` overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL) {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup(ENV_OUTPUT_DIR) {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup(ENV_STATE_DIR) {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup(ENV_CHUNK_SIZE) {
            self.chunk_size = parse_env(ENV_CHUNK_SIZE, value)?;
        }
        if let Some(value) = lookup(ENV_REQUEST_TIMEOUT) {
            self.request_timeout_secs = parse_env(ENV_REQUEST_TIMEOUT, value)?;
        }
        if let Some(value) = lookup(ENV_MAX_CHANGED_ROUTES) {
            self.max_changed_routes = parse_env(ENV_MAX_CHANGED_ROUTES, value)?;
        }
        Ok(())
    }

    /// Reject values that would make the pipeline loop or divide by zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&str, bool); 7] = [
            ("chunk_size", self.chunk_size == 0),
            ("per_page", self.per_page == 0),
            ("retry.max_attempts", self.retry.max_attempts == 0),
            ("checkpoint.every_pages", self.checkpoint.every_pages == 0),
            ("media_batch_size", self.media_batch_size == 0),
            ("render_batch_size", self.render_batch_size == 0),
            ("request_timeout_secs", self.request_timeout_secs == 0),
        ];
        if let Some((field, _)) = checks.iter().find(|(_, bad)| *bad) {
            return Err(ConfigError::Invalid(format!("{field} must be greater than zero")));
        }
        Ok(())
    }

    /// The fetch stages need an API root; cache and build commands do not.
    pub fn require_api_url(&self) -> Result<&str, ConfigError> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "api_base_url is empty; set it in {CONFIG_FILE_NAME} or {ENV_API_URL}"
            )));
        }
        Ok(url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn checkpoint_validity(&self) -> Duration {
        Duration::from_secs(self.checkpoint.validity_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown.secs)
    }
}

fn parse_env<T>(var: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
            value,
        })
}

fn locate(explicit: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return Ok(Some(path.to_path_buf()));
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    if local.exists() {
        return Ok(Some(local));
    }
    Ok(dirs::config_dir()
        .map(|dir| dir.join("sitesync").join("config.yaml"))
        .filter(|path| path.exists()))
}
