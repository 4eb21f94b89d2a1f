//! HTML parser for extracting links and metadata
//!
//! `parse_page` is a pure function over raw bytes. It never fails: markup
//! the parser cannot make sense of yields a page with empty fields rather
//! than an error.

use crate::crawler::keywords::extract_keywords;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Extracted information from an HTML page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    /// The page title (from the `<title>` tag), empty when absent
    pub title: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub robots_meta: String,
    pub publication_date: Option<String>,
    /// Resolved `<link rel="canonical">` target
    pub canonical_url: Option<String>,
    /// Visible text, whitespace-collapsed
    pub text_content: String,
    /// h1-h6 text in document order
    pub headings: Vec<String>,
    /// All links found on the page (absolute URLs)
    pub outbound_links: BTreeSet<String>,
    pub keywords: Vec<String>,
}

/// Parses raw HTML bytes fetched from `base_url`
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags
/// - `<link rel="canonical" href="...">`
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links
/// - Data URIs
/// - Fragment-only links
///
/// Links are resolved against `base_url` and collapse to a set.
///
/// # Example
///
/// ```
/// use sumi_archive::crawler::parse_page;
/// use url::Url;
///
/// let html = br#"<html><head><title>Test</title></head><body><a href="/page">Link</a></body></html>"#;
/// let base_url = Url::parse("https://example.com/").unwrap();
/// let parsed = parse_page(&base_url, html);
/// assert_eq!(parsed.title, "Test");
/// assert!(parsed.outbound_links.contains("https://example.com/page"));
/// ```
pub fn parse_page(base_url: &Url, raw: &[u8]) -> ParsedPage {
    let html = String::from_utf8_lossy(raw);
    let document = Html::parse_document(&html);

    let title = extract_title(&document);
    let meta = extract_meta(&document);
    let headings = extract_headings(&document);
    let keywords = extract_keywords(base_url, &title, &meta.keywords, &headings);

    ParsedPage {
        canonical_url: extract_canonical(&document, base_url),
        text_content: extract_text(&document),
        outbound_links: extract_links(&document, base_url),
        title,
        meta_description: meta.description,
        meta_keywords: meta.keywords,
        robots_meta: meta.robots,
        publication_date: meta.publication_date,
        headings,
        keywords,
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for word in parts.flat_map(str::split_whitespace) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(element.text())
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> String {
    let Some(title_selector) = selector("title") else {
        return String::new();
    };

    document
        .select(&title_selector)
        .next()
        .map(element_text)
        .unwrap_or_default()
}

#[derive(Default)]
struct MetaFields {
    description: String,
    keywords: String,
    robots: String,
    publication_date: Option<String>,
}

fn extract_meta(document: &Html) -> MetaFields {
    let mut fields = MetaFields::default();
    let Some(meta_selector) = selector("meta[content]") else {
        return fields;
    };

    for element in document.select(&meta_selector) {
        let content = element.value().attr("content").unwrap_or("").trim();
        let name = element
            .value()
            .attr("name")
            .or_else(|| element.value().attr("property"))
            .unwrap_or("")
            .to_lowercase();

        match name.as_str() {
            "description" => fields.description = content.to_string(),
            "keywords" => fields.keywords = content.to_string(),
            "robots" => fields.robots = content.to_string(),
            "publication_date" | "article:published_time" if !content.is_empty() => {
                fields.publication_date.get_or_insert_with(|| content.to_string());
            }
            _ => {}
        }
    }

    fields
}

fn extract_headings(document: &Html) -> Vec<String> {
    let Some(heading_selector) = selector("h1, h2, h3, h4, h5, h6") else {
        return Vec::new();
    };

    document
        .select(&heading_selector)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect()
}

/// Collects text nodes outside `<script>`, `<style>`, and `<noscript>`
fn extract_text(document: &Html) -> String {
    let texts = document.tree.root().descendants().filter_map(|node| {
        let text = node.value().as_text()?;
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript"))
        });
        (!hidden).then(|| &**text)
    });
    collapse_whitespace(texts)
}

fn extract_canonical(document: &Html, base_url: &Url) -> Option<String> {
    let canonical_selector = selector("link[rel='canonical'][href]")?;
    document
        .select(&canonical_selector)
        .filter_map(|element| element.value().attr("href"))
        .find_map(|href| resolve_link(href, base_url))
}

/// Extracts all valid links from the HTML document
fn extract_links(document: &Html, base_url: &Url) -> BTreeSet<String> {
    let mut links = BTreeSet::new();

    if let Some(a_selector) = selector("a[href]") {
        for element in document.select(&a_selector) {
            // Skip if it has the download attribute
            if element.value().attr("download").is_some() {
                continue;
            }

            if let Some(href) = element.value().attr("href") {
                if let Some(absolute_url) = resolve_link(href, base_url) {
                    links.insert(absolute_url);
                }
            }
        }
    }

    if let Some(canonical) = extract_canonical(document, base_url) {
        links.insert(canonical);
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}
