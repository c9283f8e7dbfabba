//! Route prerendering: body from a [`PageRenderer`], head from
//! [`derive_metadata`], spliced by [`inject`].

use std::sync::Arc;

use sitesync_core::{ContentSnapshot, InvalidationPolicy, Route, SiteConfig, SiteMeta};

use crate::engine::TemplateRenderer;
use crate::error::RenderError;
use crate::inject::inject;
use crate::seo::derive_metadata;

/// What a renderer gets for one route.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub route: &'a Route,
    pub snapshot: &'a ContentSnapshot,
    pub site: &'a SiteMeta,
    /// Newest posts the home page lists. Equal to the change detector's
    /// home window so an edit that changes the home page also marks `/`.
    pub home_listing: usize,
}

/// Produces the markup for one route. Must not touch the filesystem; the
/// build writes the output.
pub trait PageRenderer: Send + Sync {
    fn render_body(&self, input: &RenderInput<'_>) -> Result<String, RenderError>;
}

pub struct Prerenderer {
    renderer: Arc<dyn PageRenderer>,
    site: SiteMeta,
    home_listing: usize,
}

impl Prerenderer {
    pub fn new(renderer: Arc<dyn PageRenderer>, site: SiteMeta) -> Self {
        Self {
            renderer,
            site,
            home_listing: InvalidationPolicy::default().home_window,
        }
    }

    pub fn with_home_listing(mut self, home_listing: usize) -> Self {
        self.home_listing = home_listing;
        self
    }

    /// Tera renderer with the configured template overrides; the home page
    /// lists `invalidation.home_window` posts.
    pub fn from_config(config: &SiteConfig) -> Result<Self, RenderError> {
        let renderer = TemplateRenderer::new(config.template_dir.as_deref())?;
        Ok(Self::new(Arc::new(renderer), config.site.clone())
            .with_home_listing(config.invalidation.home_window))
    }

    pub fn site(&self) -> &SiteMeta {
        &self.site
    }

    /// The final document for `route`.
    pub fn render(&self, route: &Route, snapshot: &ContentSnapshot) -> Result<String, RenderError> {
        let metadata = derive_metadata(route, snapshot, &self.site)?;
        let body = self.renderer.render_body(&RenderInput {
            route,
            snapshot,
            site: &self.site,
            home_listing: self.home_listing,
        })?;
        tracing::debug!(route = %route.path, schema = metadata.schema_type(), "rendered");
        Ok(inject(&body, &metadata))
    }
}
