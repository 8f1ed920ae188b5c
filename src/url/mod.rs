//! URL handling module for Fleetcrawl
//!
//! Normalization gives every page a single record key; the matcher applies
//! the restricted-domain allow-list.

mod matcher;
mod normalize;

use url::Url;

pub use matcher::{is_domain_allowed, matches_wildcard};
pub use normalize::{normalize_key, normalize_url};

/// Extracts the lowercase host of a URL, if it has one
///
/// ```
/// use url::Url;
/// use fleetcrawl::url::extract_domain;
///
/// let url = Url::parse("https://Blog.Example.com:8443/post").unwrap();
/// assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
