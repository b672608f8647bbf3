//! Trawl: a budgeted, process-isolated site scraping engine
//!
//! A *target* describes which links on a website lead to extractable records
//! ("content" links) and which only lead to more links ("navigation" links).
//! The engine crawls the site, renders pages through a browser when a target
//! asks for it, appends every extracted record to a job directory, and stops
//! when an item, page, error or time budget is reached. Each crawl runs in its
//! own worker process; logs and progress stream back to the caller.

pub mod config;
pub mod crawler;
pub mod output;
pub mod render;
pub mod robots;
pub mod storage;
pub mod supervisor;
pub mod target;
pub mod url;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Trawl operations
#[derive(Debug, Error)]
pub enum TrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] crawler::TransportError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] target::ExtractionError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Worker crashed: {message}")]
    WorkerCrash { message: String },

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TrawlError {
    /// Returns the classification of this error
    ///
    /// The classification survives the trip across the worker process
    /// boundary, so callers can tell a misconfigured target apart from an
    /// unexpected worker failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::UrlError(_) => ErrorKind::Configuration,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Extraction(_) => ErrorKind::Extraction,
            Self::Storage(_) | Self::Io(_) | Self::Json(_) => ErrorKind::Storage,
            Self::WorkerCrash { .. } => ErrorKind::WorkerCrash,
        }
    }
}

/// Error classification shared by the worker and the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Bad target, budgets, job directory or render session
    Configuration,
    /// A target's extractor failed on a content page
    Extraction,
    /// A fetch failed after retries
    Transport,
    /// Job directory, items file or frontier store I/O failed
    Storage,
    /// The worker failed in a way no other kind describes
    WorkerCrash,
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid target configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unknown target kind: {0}")]
    UnknownTarget(String),

    #[error("Render session could not start: {0}")]
    RenderSession(String),

    #[error("Invalid job directory: {0}")]
    JobDir(String),

    /// A configuration error raised inside a worker process
    #[error("{0}")]
    Reported(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Result type alias for Trawl operations
pub type Result<T> = std::result::Result<T, TrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{CrawlSettings, RunLimits, TelemetryMode};
pub use crawler::{BudgetKind, CrawlReport, FetchRequest, LinkKind, Page, TerminationReason};
pub use render::RenderDirective;
pub use storage::Scraper;
pub use supervisor::{RunOutcome, Supervisor};
pub use target::{Record, Target, TargetConfig, TargetDefinition, TargetRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = TrawlError::from(ConfigError::Validation("bad".into()));
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = TrawlError::WorkerCrash {
            message: "boom".into(),
        };
        assert_eq!(err.kind(), ErrorKind::WorkerCrash);

        let err = TrawlError::from(std::io::Error::other("disk"));
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_error_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::WorkerCrash).unwrap();
        assert_eq!(json, "\"worker-crash\"");
    }
}
