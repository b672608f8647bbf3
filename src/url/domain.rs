use url::Url;

/// Extracts the lowercase host of a URL
///
/// Ports are not part of the host, so `example.com:8080` and `example.com`
/// fall under the same domain entries.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use trawl::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str()
        .filter(|h| !h.is_empty())
        .map(|h| h.trim_end_matches('.').to_lowercase())
}
