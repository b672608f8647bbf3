use crate::UrlError;
use url::Url;

/// Canonicalizes a URL so that equivalent links compare equal
///
/// # Canonicalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything but `http` and `https`
/// 3. Require a host (the `url` crate already lowercases it)
/// 4. Remove the fragment (everything after #)
/// 5. Sort query parameters by key, then value
/// 6. Remove an empty query string (trailing ?)
///
/// Paths are left untouched: `/page` and `/page/` can be different
/// resources on the sites we scrape.
///
/// # Examples
///
/// ```
/// use trawl::url::canonicalize_url;
///
/// let url = canonicalize_url("https://EXAMPLE.test/list?page=2&b=1#top").unwrap();
/// assert_eq!(url.as_str(), "https://example.test/list?b=1&page=2");
/// ```
pub fn canonicalize_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;
    canonicalize(url)
}

/// Canonicalizes an already parsed URL
pub fn canonicalize(mut url: Url) -> Result<Url, UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingDomain);
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_scheme() {
        let result = canonicalize_url("http://example.com/page").unwrap();
        assert_eq!(result.as_str(), "http://example.com/page");
    }

    #[test]
    fn test_keeps_trailing_slash() {
        let result = canonicalize_url("https://example.com/page/").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page/");
    }

    #[test]
    fn test_remove_fragment() {
        let result = canonicalize_url("https://example.com/page#section").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_sort_query_params() {
        let result = canonicalize_url("https://example.com/page?b=2&a=1").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page?a=1&b=2");
    }

    #[test]
    fn test_empty_query_removed() {
        let result = canonicalize_url("https://example.com/page?").unwrap();
        assert_eq!(result.as_str(), "https://example.com/page");
    }

    #[test]
    fn test_lowercase_domain() {
        let result = canonicalize_url("https://EXAMPLE.COM/Page").unwrap();
        assert_eq!(result.as_str(), "https://example.com/Page");
    }

    #[test]
    fn test_invalid_scheme() {
        let result = canonicalize_url("ftp://example.com/page");
        assert!(matches!(result.unwrap_err(), UrlError::InvalidScheme(_)));
    }

    #[test]
    fn test_malformed_url() {
        assert!(matches!(
            canonicalize_url("not a url").unwrap_err(),
            UrlError::Parse(_)
        ));
    }

    #[test]
    fn test_equivalent_links_compare_equal() {
        let a = canonicalize_url("https://example.com/list?page=2&sort=new#results").unwrap();
        let b = canonicalize_url("https://Example.com/list?sort=new&page=2").unwrap();
        assert_eq!(a, b);
    }
}
