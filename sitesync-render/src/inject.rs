//! Head metadata injection.
//!
//! [`inject`] strips every title, description, canonical, Open Graph,
//! Twitter card, `article:*` and JSON-LD tag from the document's `<head>`
//! and inserts one generated block right before `</head>`. The body is never
//! touched, so inline SVG titles or author-embedded JSON-LD survive. Running
//! it twice yields the same document as running it once.

use std::sync::LazyLock;

use chrono::SecondsFormat;
use html_escape::encode_quoted_attribute;
use regex::Regex;

use crate::seo::SeoMetadata;

static LD_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b[^>]*type\s*=\s*["']application/ld\+json["'][^>]*>.*?</script\s*>\s*"#)
        .expect("ld+json pattern")
});
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>.*?</title\s*>\s*").expect("title pattern")
});
static META_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta\b[^>]*\b(?:name|property)\s*=\s*["'](?:description|og:[^"']*|twitter:[^"']*|article:[^"']*)["'][^>]*>\s*"#,
    )
    .expect("meta pattern")
});
static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<link\b[^>]*\brel\s*=\s*["']canonical["'][^>]*>\s*"#).expect("canonical pattern")
});
static HEAD_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("head close pattern"));
static HTML_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html\b[^>]*>").expect("html open pattern"));

/// Replace all route-scoped head metadata in `document` with `metadata`.
pub fn inject(document: &str, metadata: &SeoMetadata) -> String {
    let block = head_block(metadata);

    // Everything before the first `</head>` is head territory.
    if let Some(close) = HEAD_CLOSE_RE.find(document) {
        let (head, rest) = document.split_at(close.start());
        let head = strip_metadata(head);
        let mut out = String::with_capacity(document.len() + block.len());
        out.push_str(&head);
        out.push_str(&block);
        out.push_str(rest);
        return out;
    }

    // No head at all: create one and leave the rest as is.
    let head = format!("<head>\n{block}</head>");
    match HTML_OPEN_RE.find(document) {
        Some(open) => format!(
            "{}\n{head}{}",
            &document[..open.end()],
            &document[open.end()..]
        ),
        None => format!("{head}\n{document}"),
    }
}

/// Remove every tag [`inject`] owns from a head fragment.
pub fn strip_metadata(head: &str) -> String {
    // JSON-LD first: its payload is escaped, but a hand-written block in a
    // base template may not be.
    let out = LD_JSON_RE.replace_all(head, "");
    let out = TITLE_RE.replace_all(&out, "");
    let out = META_RE.replace_all(&out, "");
    CANONICAL_RE.replace_all(&out, "").into_owned()
}

/// The generated head block, one tag per line.
pub fn head_block(metadata: &SeoMetadata) -> String {
    let title = escape(&metadata.title);
    let description = escape(&metadata.description);
    let canonical = escape(&metadata.canonical);

    let mut lines = vec![
        format!("<title>{title}</title>"),
        format!(r#"<meta name="description" content="{description}">"#),
        format!(r#"<link rel="canonical" href="{canonical}">"#),
        format!(r#"<meta property="og:type" content="{}">"#, metadata.og_type),
        format!(r#"<meta property="og:title" content="{title}">"#),
        format!(r#"<meta property="og:description" content="{description}">"#),
        format!(r#"<meta property="og:url" content="{canonical}">"#),
        format!(
            r#"<meta property="og:site_name" content="{}">"#,
            escape(&metadata.site_name)
        ),
    ];
    if let Some(image) = &metadata.image {
        lines.push(format!(r#"<meta property="og:image" content="{}">"#, escape(image)));
    }
    if let Some(published) = metadata.published {
        lines.push(format!(
            r#"<meta property="article:published_time" content="{}">"#,
            published.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    if let Some(modified) = metadata.modified {
        lines.push(format!(
            r#"<meta property="article:modified_time" content="{}">"#,
            modified.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    let card = if metadata.image.is_some() {
        "summary_large_image"
    } else {
        "summary"
    };
    lines.push(format!(r#"<meta name="twitter:card" content="{card}">"#));
    lines.push(format!(r#"<meta name="twitter:title" content="{title}">"#));
    lines.push(format!(r#"<meta name="twitter:description" content="{description}">"#));
    if let Some(image) = &metadata.image {
        lines.push(format!(r#"<meta name="twitter:image" content="{}">"#, escape(image)));
    }
    lines.push(format!(
        r#"<script type="application/ld+json">{}</script>"#,
        script_safe_json(&metadata.json_ld)
    ));

    let mut block = lines.join("\n");
    block.push('\n');
    block
}

fn escape(s: &str) -> String {
    encode_quoted_attribute(s).into_owned()
}

/// JSON that cannot close its `<script>` element or open a new tag.
fn script_safe_json(value: &serde_json::Value) -> String {
    value
        .to_string()
        .replace('<', "\\u003c")
        .replace('>', "\\u003e")
        .replace('&', "\\u0026")
}
