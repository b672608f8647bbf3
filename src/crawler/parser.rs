//! Link extraction from HTML pages
//!
//! # Link Extraction Rules
//!
//! **Include:**
//! - `<a href="...">` and `<area href="...">` anywhere in the document
//!
//! **Exclude:**
//! - `<a href="..." download>`
//! - `javascript:`, `mailto:`, `tel:` links
//! - Data URIs
//! - Fragment-only links (same page anchors)
//! - Anything that is not http(s) after resolution
//!
//! Links are canonicalized (fragment removed, query sorted) and returned in
//! first-seen order without duplicates.

use crate::url::canonicalize;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts all followable links from a parsed document
///
/// # Arguments
///
/// * `document` - The parsed HTML document
/// * `base_url` - The URL the document was served from
///
/// # Returns
///
/// Absolute, canonical URLs in document order, without duplicates
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    let Ok(selector) = Selector::parse("a[href], area[href]") else {
        return links;
    };

    let base_url = document_base(document, base_url);

    for element in document.select(&selector) {
        // Skip if it has the download attribute
        if element.value().attr("download").is_some() {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };

        if let Some(url) = resolve_link(href, &base_url) {
            if seen.insert(url.as_str().to_string()) {
                links.push(url);
            }
        }
    }

    links
}

/// Convenience wrapper that parses `html` first
pub fn extract_links_from_html(html: &str, base_url: &Url) -> Vec<Url> {
    extract_links(&Html::parse_document(html), base_url)
}

/// Honors a `<base href>` element when present
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| document.select(&selector).next())
        .and_then(|element| element.value().attr("href"))
        .and_then(|href| page_url.join(href.trim()).ok())
        .unwrap_or_else(|| page_url.clone())
}

/// Resolves a link href to a canonical absolute URL
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - fragment-only hrefs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
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

    let absolute = base_url.join(href).ok()?;
    canonicalize(absolute).ok()
}
