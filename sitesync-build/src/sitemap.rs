//! `sitemap.xml` and `robots.txt` generation.

use chrono::{DateTime, SecondsFormat, Utc};

use sitesync_core::{ContentSnapshot, Route, RouteKind, SiteMeta};

pub const SITEMAP_FILE: &str = "sitemap.xml";
pub const ROBOTS_FILE: &str = "robots.txt";

/// Change frequency for sitemap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeFreq {
    Daily,
    Weekly,
    Monthly,
}

impl ChangeFreq {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

/// A sitemap URL entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SitemapUrl {
    pub loc: String,
    pub lastmod: Option<DateTime<Utc>>,
    pub changefreq: ChangeFreq,
    pub priority: f32,
}

/// Fixed priority / change frequency per route kind.
pub fn policy(kind: RouteKind) -> (f32, ChangeFreq) {
    match kind {
        RouteKind::Home => (1.0, ChangeFreq::Daily),
        RouteKind::Post => (0.8, ChangeFreq::Weekly),
        RouteKind::Static => (0.7, ChangeFreq::Monthly),
        RouteKind::Category => (0.6, ChangeFreq::Weekly),
        RouteKind::Tag => (0.5, ChangeFreq::Weekly),
        RouteKind::Author => (0.4, ChangeFreq::Monthly),
    }
}

fn lastmod(route: &Route, snapshot: &ContentSnapshot) -> Option<DateTime<Utc>> {
    match (&route.source, route.kind) {
        (Some(source), _) => snapshot
            .find(source.kind, &source.slug)
            .and_then(|r| r.modified.or(r.published)),
        (None, RouteKind::Home) => snapshot
            .posts
            .iter()
            .filter_map(|p| p.modified.or(p.published))
            .max(),
        (None, _) => None,
    }
}

pub fn entries(routes: &[Route], snapshot: &ContentSnapshot, site: &SiteMeta) -> Vec<SitemapUrl> {
    routes
        .iter()
        .map(|route| {
            let (priority, changefreq) = policy(route.kind);
            SitemapUrl {
                loc: site.absolute_url(&route.path),
                lastmod: lastmod(route, snapshot),
                changefreq,
                priority,
            }
        })
        .collect()
}

/// Sitemap XML with one `<url>` per route, in route order.
pub fn emit(routes: &[Route], snapshot: &ContentSnapshot, site: &SiteMeta) -> String {
    let urls = entries(routes, snapshot, site);
    tracing::debug!(count = urls.len(), "generating sitemap");

    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
    xml.push('\n');
    for url in &urls {
        xml.push_str(&url_to_xml(url));
    }
    xml.push_str("</urlset>\n");
    xml
}

fn url_to_xml(url: &SitemapUrl) -> String {
    let mut xml = String::from("  <url>\n");
    xml.push_str(&format!("    <loc>{}</loc>\n", escape_xml(&url.loc)));
    if let Some(lastmod) = &url.lastmod {
        xml.push_str(&format!(
            "    <lastmod>{}</lastmod>\n",
            lastmod.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    xml.push_str(&format!(
        "    <changefreq>{}</changefreq>\n",
        url.changefreq.as_str()
    ));
    xml.push_str(&format!("    <priority>{:.1}</priority>\n", url.priority));
    xml.push_str("  </url>\n");
    xml
}

pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `robots.txt` allowing everything except `disallow`, pointing at the sitemap.
pub fn robots(site: &SiteMeta, disallow: &[String]) -> String {
    let mut out = String::from("User-agent: *\n");
    for path in disallow {
        out.push_str(&format!("Disallow: {path}\n"));
    }
    out.push_str("Allow: /\n");
    out.push_str(&format!("\nSitemap: {}\n", site.absolute_url("/sitemap.xml")));
    out
}
