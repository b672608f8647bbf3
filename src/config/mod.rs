//! Configuration module
//!
//! Run budgets, fetch settings, telemetry selection, and loading of TOML
//! target files.
//!
//! # Example
//!
//! ```no_run
//! use trawl::config::load_target_file;
//! use std::path::Path;
//!
//! let file = load_target_file(Path::new("target.toml")).unwrap();
//! println!("Target kind: {}", file.kind);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{CrawlSettings, LogLevel, RunLimits, TelemetryMode};

pub use parser::{compute_config_hash, load_target_file, parse_target_file, TargetFile};
pub use validation::{validate_domain_pattern, validate_settings, validate_start_url};
