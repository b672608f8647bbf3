//! Job directories
//!
//! A job directory is the only handle needed to resume a crawl:
//!
//! ```text
//! <job_dir>/
//!   job.json          target kind, configuration, settings, items path
//!   items.jl          extracted records, one JSON object per line
//!   frontier.sqlite   pending requests and seen links
//! ```

use crate::config::{compute_config_hash, validate_settings, CrawlSettings};
use crate::target::{Target, TargetRegistry};
use crate::{ConfigError, TrawlError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const JOB_FILE: &str = "job.json";
pub const ITEMS_FILE: &str = "items.jl";
pub const FRONTIER_FILE: &str = "frontier.sqlite";

/// Paths of the files inside a job directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub dir: PathBuf,
    pub job: PathBuf,
    pub items: PathBuf,
    pub frontier: PathBuf,
}

impl JobPaths {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            job: dir.join(JOB_FILE),
            items: dir.join(ITEMS_FILE),
            frontier: dir.join(FRONTIER_FILE),
        }
    }
}

/// The persisted description of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobRecord {
    /// Registered target kind
    pub kind: String,

    /// Serialized target configuration
    pub config: Value,

    /// Items file, relative to the job directory when it lives inside it
    pub items_path: PathBuf,

    #[serde(default)]
    pub settings: CrawlSettings,

    /// SHA-256 of kind and configuration at save time
    pub config_hash: String,

    pub saved_at: DateTime<Utc>,
}

impl JobRecord {
    /// The items file of a record read from `job_dir`
    pub fn items_path_in(&self, job_dir: &Path) -> PathBuf {
        if self.items_path.is_relative() {
            job_dir.join(&self.items_path)
        } else {
            self.items_path.clone()
        }
    }
}

/// A job reconstructed from its directory
#[derive(Debug, Clone)]
pub struct SavedJob {
    pub target: Target,
    pub items_path: PathBuf,
    pub settings: CrawlSettings,
}

/// Creates `dir` if needed and checks that it is a directory
pub fn ensure_job_dir(dir: &Path) -> Result<(), ConfigError> {
    if dir.exists() && !dir.is_dir() {
        return Err(ConfigError::JobDir(format!(
            "{} exists and is not a directory",
            dir.display()
        )));
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| ConfigError::JobDir(format!("cannot create {}: {}", dir.display(), e)))
}

/// Writes the job record, replacing any previous one
///
/// The record is written to a temporary file first and renamed into place,
/// so a reader never observes a partial record.
pub fn save(
    target: &Target,
    settings: &CrawlSettings,
    items_path: &Path,
    job_dir: &Path,
) -> Result<PathBuf, TrawlError> {
    ensure_job_dir(job_dir)?;
    let paths = JobPaths::new(job_dir);

    let record = JobRecord {
        kind: target.kind().to_string(),
        config: target.config().clone(),
        items_path: stored_items_path(items_path, job_dir)?,
        settings: settings.clone(),
        config_hash: compute_config_hash(target.kind(), target.config()),
        saved_at: Utc::now(),
    };

    let tmp = paths.job.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(&record)?)?;
    std::fs::rename(&tmp, &paths.job)?;

    tracing::debug!("Saved job record to {}", paths.job.display());
    Ok(job_dir.to_path_buf())
}

/// The items path as recorded in `job.json`
///
/// A file inside the job directory is stored relative to it so the directory
/// can be moved; any other relative path is made absolute.
fn stored_items_path(items_path: &Path, job_dir: &Path) -> Result<PathBuf, TrawlError> {
    if let Ok(relative) = items_path.strip_prefix(job_dir) {
        return Ok(relative.to_path_buf());
    }

    if items_path.is_relative() {
        return Ok(std::env::current_dir()?.join(items_path));
    }

    Ok(items_path.to_path_buf())
}

/// Reads the job record of a directory
pub fn read_record(job_dir: &Path) -> Result<JobRecord, TrawlError> {
    let paths = JobPaths::new(job_dir);

    if !paths.dir.is_dir() {
        return Err(ConfigError::JobDir(format!("{} is not a directory", job_dir.display())).into());
    }

    let content = match std::fs::read(&paths.job) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::JobDir(format!(
                "no {} in {}",
                JOB_FILE,
                job_dir.display()
            ))
            .into());
        }
        Err(e) => return Err(e.into()),
    };

    Ok(serde_json::from_slice(&content)?)
}

/// Rebuilds the target and output location saved in `job_dir`
pub fn load(job_dir: &Path, registry: &TargetRegistry) -> Result<SavedJob, TrawlError> {
    let record = read_record(job_dir)?;

    if compute_config_hash(&record.kind, &record.config) != record.config_hash {
        tracing::warn!(
            "Job record in {} was modified after it was saved",
            job_dir.display()
        );
    }

    validate_settings(&record.settings)?;
    let target = registry.build(&record.kind, &record.config)?;

    let items_path = record.items_path_in(job_dir);

    Ok(SavedJob {
        target,
        items_path,
        settings: record.settings,
    })
}

/// Deletes everything inside `job_dir`, keeping the directory itself
pub fn clear(job_dir: &Path) -> Result<(), TrawlError> {
    if !job_dir.exists() {
        return Ok(());
    }

    if !job_dir.is_dir() {
        return Err(ConfigError::JobDir(format!("{} is not a directory", job_dir.display())).into());
    }

    for entry in std::fs::read_dir(job_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }

    tracing::info!("Cleared job directory {}", job_dir.display());
    Ok(())
}
