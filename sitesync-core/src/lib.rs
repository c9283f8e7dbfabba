//! sitesync core library: content model, routes, normalization, config.
//!
//! - [`types`]: canonical records and the fetched snapshot
//! - [`normalize`]: the single raw-JSON → [`ContentRecord`] step
//! - [`routes`]: route derivation and output paths
//! - [`config`]: layered [`SiteConfig`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod normalize;
pub mod routes;
pub mod types;

pub use config::{InvalidationPolicy, SiteConfig, SiteMeta};
pub use error::ConfigError;
pub use routes::{derive_routes, Route, RouteKind, RouteSource};
pub use types::{ContentKind, ContentRecord, ContentSnapshot, MediaRecord, Relations, Slug};
