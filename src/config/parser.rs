use crate::config::types::CrawlSettings;
use crate::config::validation::validate_settings;
use crate::ConfigError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// A target file as written by a user
///
/// ```toml
/// kind = "selector"
///
/// [config]
/// start-urls = ["https://example.test/list"]
///
/// [settings]
/// concurrency = 8
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetFile {
    /// Registered target kind
    pub kind: String,

    /// Kind-specific configuration, validated when the target is built
    #[serde(default)]
    pub config: toml::Table,

    #[serde(default)]
    pub settings: CrawlSettings,
}

impl TargetFile {
    /// Converts the kind-specific configuration to JSON for the target registry
    pub fn config_json(&self) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(&self.config)?)
    }
}

/// Loads and parses a target file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML target file
///
/// # Returns
///
/// * `Ok(TargetFile)` - Successfully loaded file with validated settings
/// * `Err(ConfigError)` - Failed to load, parse, or validate the file
pub fn load_target_file(path: &Path) -> Result<TargetFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_target_file(&content)
}

/// Parses a target file from TOML text
pub fn parse_target_file(content: &str) -> Result<TargetFile, ConfigError> {
    let file: TargetFile = toml::from_str(content)?;

    if file.kind.trim().is_empty() {
        return Err(ConfigError::Validation(
            "target kind cannot be empty".to_string(),
        ));
    }

    validate_settings(&file.settings)?;

    Ok(file)
}

/// Computes a SHA-256 hash of a target configuration
///
/// The hash is stored in the job record so that a resumed job can tell
/// whether its configuration was edited in between runs. JSON objects are
/// serialized with sorted keys, so equal configurations hash equally.
pub fn compute_config_hash(kind: &str, config: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
