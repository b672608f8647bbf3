use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Budgets that bound one crawl run
///
/// Every budget is independent and `0` means unlimited. Reaching any of them
/// stops dispatching new requests; requests already in flight are drained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RunLimits {
    /// Maximum number of records to extract
    pub items: u64,

    /// Wall-clock budget in seconds
    pub timeout_secs: u64,

    /// Maximum number of pages to fetch
    pub pages: u64,

    /// Maximum number of extraction or transport errors
    pub errors: u64,
}

impl RunLimits {
    /// Creates limits with an item budget and a wall-clock budget
    pub fn new(items: u64, timeout_secs: u64) -> Self {
        Self {
            items,
            timeout_secs,
            ..Self::default()
        }
    }

    pub fn with_pages(mut self, pages: u64) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_errors(mut self, errors: u64) -> Self {
        self.errors = errors;
        self
    }

    /// Returns the wall-clock budget, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Fetch-layer behaviour for a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlSettings {
    /// Maximum number of requests in flight at once
    pub concurrency: u32,

    /// Minimum time between two requests to the same host (milliseconds)
    pub download_delay_ms: u64,

    /// Per-request HTTP timeout in seconds
    pub request_timeout_secs: u64,

    /// Extra attempts for timeouts, connection failures, 5xx and 429
    pub retry_times: u32,

    /// User agent sent with every HTTP request
    pub user_agent: String,

    /// Whether to honour robots.txt
    pub obey_robots: bool,

    /// Navigation timeout for browser-rendered requests in seconds
    pub render_timeout_secs: u64,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            concurrency: 16,
            download_delay_ms: 0,
            request_timeout_secs: 30,
            retry_times: 2,
            user_agent: format!("trawl/{}", env!("CARGO_PKG_VERSION")),
            obey_robots: false,
            render_timeout_secs: 30,
        }
    }
}

/// What the worker streams back to the caller while it crawls
///
/// Verbose logs and the compact progress line are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum TelemetryMode {
    /// Nothing is forwarded
    Off,
    /// Log records at or above `level`
    Logs { level: LogLevel },
    /// Page, error and item counters
    #[default]
    Progress,
}

/// Log verbosity accepted on the command line and in telemetry settings
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }

    pub fn to_tracing(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }

    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Self::Error,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::INFO => Self::Info,
            tracing::Level::DEBUG => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" | "critical" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!(
                "log level should be one of error, warn, info, debug, trace; got '{}'",
                other
            )),
        }
    }
}
