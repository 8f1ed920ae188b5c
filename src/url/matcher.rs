/// Checks if a host matches a restricted-domain pattern
///
/// Two pattern forms are supported:
/// 1. Exact match: `example.com` matches only `example.com`
/// 2. Wildcard match: `*.example.com` matches the bare domain and every
///    subdomain (`blog.example.com`, `api.v2.example.com`)
///
/// Hosts are expected to be lowercase already.
///
/// # Examples
///
/// ```
/// use fleetcrawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "blog.example.com"));
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("*.example.com", "myexample.com"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => {
            candidate == base
                || candidate
                    .strip_suffix(base)
                    .is_some_and(|head| head.ends_with('.'))
        }
        None => candidate == pattern,
    }
}

/// Applies the restricted-domain allow-list to a host
///
/// An empty allow-list places no restriction.
pub fn is_domain_allowed(host: &str, allow_list: &[String]) -> bool {
    allow_list.is_empty()
        || allow_list
            .iter()
            .any(|pattern| matches_wildcard(&pattern.to_lowercase(), host))
}
