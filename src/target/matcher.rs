//! Link matchers
//!
//! A matcher decides whether an absolute URL belongs to a link class. It
//! carries regex allow/deny patterns and allow/deny domain sets:
//!
//! | Rule | Effect |
//! |------|--------|
//! | `allow` | URL must match at least one pattern (empty list matches everything) |
//! | `deny` | URL must match none of the patterns |
//! | `allow-domains` | Host must be one of the domains or a subdomain (empty set allows all) |
//! | `deny-domains` | Host must not be one of the domains or a subdomain |
//!
//! Patterns use search semantics: `/item/\d+` matches anywhere in the URL.

use crate::config::validate_domain_pattern;
use crate::url::{extract_domain, matches_any_domain};
use crate::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Serializable matcher rules as written in a target configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MatcherConfig {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub allow_domains: Vec<String>,
    pub deny_domains: Vec<String>,
}

impl MatcherConfig {
    /// Matcher rules with only allow patterns
    pub fn allow<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allow: patterns.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn with_allow_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_deny<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Compiles the patterns and validates the domain entries
    pub fn compile(&self) -> Result<LinkMatcher, ConfigError> {
        for domain in self.allow_domains.iter().chain(&self.deny_domains) {
            validate_domain_pattern(domain)?;
        }

        Ok(LinkMatcher {
            enabled: true,
            allow: compile_patterns(&self.allow)?,
            deny: compile_patterns(&self.deny)?,
            allow_domains: lowercase(&self.allow_domains),
            deny_domains: lowercase(&self.deny_domains),
        })
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p)
                .map_err(|e| ConfigError::InvalidPattern(format!("Invalid regex '{}': {}", p, e)))
        })
        .collect()
}

fn lowercase(domains: &[String]) -> Vec<String> {
    domains.iter().map(|d| d.to_lowercase()).collect()
}

/// A compiled link matcher
#[derive(Debug, Clone)]
pub struct LinkMatcher {
    enabled: bool,
    allow: Vec<Regex>,
    deny: Vec<Regex>,
    allow_domains: Vec<String>,
    deny_domains: Vec<String>,
}

impl LinkMatcher {
    /// A matcher that accepts no link at all
    pub fn none() -> Self {
        Self {
            enabled: false,
            allow: Vec::new(),
            deny: Vec::new(),
            allow_domains: Vec::new(),
            deny_domains: Vec::new(),
        }
    }

    /// A matcher that accepts every link
    pub fn any() -> Self {
        Self {
            enabled: true,
            ..Self::none()
        }
    }

    /// Whether the matcher can accept any link
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Checks a URL against the rules
    pub fn matches(&self, url: &Url) -> bool {
        if !self.enabled {
            return false;
        }

        let Some(host) = extract_domain(url) else {
            return false;
        };

        if !self.allow_domains.is_empty() && !matches_any_domain(&self.allow_domains, &host) {
            return false;
        }

        if matches_any_domain(&self.deny_domains, &host) {
            return false;
        }

        let url = url.as_str();

        if !self.allow.is_empty() && !self.allow.iter().any(|re| re.is_match(url)) {
            return false;
        }

        !self.deny.iter().any(|re| re.is_match(url))
    }
}
