use crate::config::types::CrawlSettings;
use crate::ConfigError;
use url::Url;

/// Validates fetch-layer settings
pub fn validate_settings(settings: &CrawlSettings) -> Result<(), ConfigError> {
    if settings.concurrency < 1 || settings.concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 256, got {}",
            settings.concurrency
        )));
    }

    if settings.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be at least 1".to_string(),
        ));
    }

    if settings.render_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "render-timeout-secs must be at least 1".to_string(),
        ));
    }

    if settings.retry_times > 10 {
        return Err(ConfigError::Validation(format!(
            "retry-times must be at most 10, got {}",
            settings.retry_times
        )));
    }

    if settings.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates and parses a start URL
pub fn validate_start_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid start URL '{}': {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Start URL '{}' must use http or https",
            raw
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(ConfigError::InvalidUrl(format!(
            "Start URL '{}' has no host",
            raw
        )));
    }

    Ok(url)
}

/// Validates a domain entry (supports a `*.` prefix)
pub fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);

    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&CrawlSettings::default()).is_ok());
    }

    #[test]
    fn test_concurrency_bounds() {
        let mut settings = CrawlSettings::default();
        settings.concurrency = 0;
        assert!(validate_settings(&settings).is_err());
        settings.concurrency = 257;
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_empty_user_agent() {
        let settings = CrawlSettings {
            user_agent: "  ".to_string(),
            ..CrawlSettings::default()
        };
        assert!(validate_settings(&settings).is_err());
    }

    #[test]
    fn test_validate_start_url() {
        assert!(validate_start_url("https://example.test/list").is_ok());
        assert!(validate_start_url("http://127.0.0.1:8080/").is_ok());
        assert!(validate_start_url("ftp://example.test/").is_err());
        assert!(validate_start_url("/relative").is_err());
    }

    #[test]
    fn test_validate_domain_pattern() {
        assert!(validate_domain_pattern("example.com").is_ok());
        assert!(validate_domain_pattern("*.example.com").is_ok());
        assert!(validate_domain_pattern("localhost").is_ok());
        assert!(validate_domain_pattern("127.0.0.1").is_ok());

        assert!(validate_domain_pattern("").is_err());
        assert!(validate_domain_pattern("*.").is_err());
        assert!(validate_domain_pattern(".example.com").is_err());
        assert!(validate_domain_pattern("example.com.").is_err());
        assert!(validate_domain_pattern("exa mple.com").is_err());
    }
}
