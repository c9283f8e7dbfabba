//! # sitesync-render
//!
//! Turns a route plus the content snapshot into a finished HTML document:
//! a [`PageRenderer`] produces the markup, [`seo`] derives route-scoped
//! metadata and [`inject`] splices it into the head.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use sitesync_core::{derive_routes, ContentSnapshot, SiteConfig};
//! use sitesync_render::Prerenderer;
//!
//! fn render_all(config: &SiteConfig, snapshot: &ContentSnapshot) {
//!     if let Ok(prerenderer) = Prerenderer::from_config(config) {
//!         for route in derive_routes(snapshot, &config.static_routes) {
//!             if let Ok(html) = prerenderer.render(&route, snapshot) {
//!                 println!("{}: {} bytes", route.path, html.len());
//!             }
//!         }
//!     }
//! }
//! ```

pub mod context;
pub mod engine;
pub mod error;
pub mod inject;
pub mod prerender;
pub mod seo;

pub use context::PageContext;
pub use engine::{TemplateEngine, TemplateRenderer};
pub use error::RenderError;
pub use inject::inject;
pub use prerender::{PageRenderer, Prerenderer, RenderInput};
pub use seo::{derive_metadata, SeoMetadata};
