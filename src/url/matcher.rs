/// Checks if a host falls under a domain entry
///
/// Domain entries follow link-extractor conventions: an entry matches the
/// domain itself and every subdomain below it. A leading `*.` is accepted
/// and means the same thing.
///
/// | Entry           | Host                | Matches |
/// |-----------------|---------------------|---------|
/// | `is.fi`         | `is.fi`             | yes     |
/// | `is.fi`         | `ravit.is.fi`       | yes     |
/// | `*.is.fi`       | `www.is.fi`         | yes     |
/// | `is.fi`         | `this.fi`           | no      |
///
/// Both arguments should already be lowercase.
///
/// # Examples
///
/// ```
/// use trawl::url::matches_domain;
///
/// assert!(matches_domain("example.com", "example.com"));
/// assert!(matches_domain("example.com", "blog.example.com"));
/// assert!(matches_domain("*.example.com", "example.com"));
/// assert!(!matches_domain("example.com", "myexample.com"));
/// ```
pub fn matches_domain(entry: &str, host: &str) -> bool {
    let base = entry.strip_prefix("*.").unwrap_or(entry);
    if base.is_empty() {
        return false;
    }

    host == base
        || host
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Checks if a host falls under any of the domain entries
pub fn matches_any_domain<S: AsRef<str>>(entries: &[S], host: &str) -> bool {
    entries
        .iter()
        .any(|entry| matches_domain(entry.as_ref(), host))
}
