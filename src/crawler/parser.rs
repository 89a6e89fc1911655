//! Link extraction from HTML responses
//!
//! Handlers that follow links use [`extract_links`] to turn a page body into
//! absolute URLs for the frontier. Extraction is deliberately shallow: anchor
//! hrefs only, resolved against the final response URL.

use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Extracts absolute link targets from an HTML document
///
/// # Link Extraction Rules
///
/// **Include:** `<a href="...">` targets, resolved against `base_url`.
///
/// **Exclude:** `javascript:`, `mailto:`, `tel:` and `data:` hrefs, anchors
/// with a `download` attribute, non-HTTP(S) results, and same-page fragment
/// links. Duplicates are removed, first occurrence wins.
///
/// An unparsable `base_url` yields no links.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            if let Some(url) = resolve_link(href, &base) {
                if seen.insert(url.clone()) {
                    links.push(url);
                }
            }
        }
    }

    links
}

/// Resolves a link href to an absolute URL and validates it
fn resolve_link(href: &str, base: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }

    Some(resolved.to_string())
}
