//! URL normalization and unique key derivation
//!
//! Two URLs that differ only in case of the host, fragment, query parameter
//! order or a trailing slash refer to the same unit of work. Normalization
//! collapses those differences before the key is computed.

use crate::UrlError;
use sha2::{Digest, Sha256};
use url::Url;

/// Normalizes a URL for deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject non-HTTP(S) schemes (parsing already drops
///    default ports)
/// 2. Lowercase the host and remove a `www.` prefix
/// 3. Remove the fragment
/// 4. Sort query parameters alphabetically; drop an empty query
/// 5. Remove the trailing slash (except for the root path)
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(String)` - The normalized URL
/// * `Err(UrlError)` - The URL could not be parsed or has no host
pub fn normalize_url(url_str: &str) -> Result<String, UrlError> {
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url.host_str().ok_or(UrlError::MissingHost)?;
    let mut normalized_host = host.to_lowercase();
    if let Some(stripped) = normalized_host.strip_prefix("www.") {
        normalized_host = stripped.to_string();
    }
    url.set_host(Some(&normalized_host))
        .map_err(|e| UrlError::Parse(e.to_string()))?;

    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        pairs.sort();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            let query = pairs
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&query));
        }
    }

    let mut normalized = url.to_string();
    if normalized.ends_with('/') && url.path() != "/" {
        normalized.pop();
    }

    Ok(normalized)
}

/// Derives the deduplication key for a request
///
/// GET requests use the normalized URL directly. Other methods append the
/// method name and a truncated SHA-256 digest of the body, so requests that
/// differ only in payload stay distinct.
pub fn unique_key_for(url: &str, method: &str, body: Option<&str>) -> String {
    let base = normalize_url(url).unwrap_or_else(|_| url.to_string());

    if method.eq_ignore_ascii_case("GET") {
        return base;
    }

    // Hash the canonical method spelling so "post" and "POST" agree
    let mut hasher = Sha256::new();
    hasher.update(method.to_uppercase().as_bytes());
    hasher.update(body.unwrap_or("").as_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("{}#{}:{}", base, method.to_uppercase(), &digest[..16])
}
