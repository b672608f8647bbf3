//! The caller-facing scraping handle

use super::job::{self, ensure_job_dir, ITEMS_FILE};
use crate::config::{validate_settings, CrawlSettings, LogLevel, RunLimits, TelemetryMode};
use crate::output::{read_records, Table};
use crate::supervisor::{RunOutcome, Supervisor};
use crate::target::{Record, Target, TargetRegistry};
use crate::TrawlError;
use std::path::{Path, PathBuf};

/// A target bound to a job directory
///
/// Each call to [`Scraper::scrape`] runs one crawl in a worker process and
/// appends to the same items file, continuing from the frontier the previous
/// call left behind.
///
/// A scraper created without a job directory works in a fresh temporary
/// directory that is deleted when the scraper is dropped, unless
/// [`Scraper::save`] was called.
#[derive(Debug)]
pub struct Scraper {
    target: Target,
    job_dir: PathBuf,
    items_path: PathBuf,
    settings: CrawlSettings,
    log_level: Option<LogLevel>,
    progress: bool,
    supervisor: Supervisor,
    ephemeral: bool,
}

impl Scraper {
    pub fn new(target: Target, job_dir: Option<PathBuf>) -> Result<Self, TrawlError> {
        let (job_dir, ephemeral) = match job_dir {
            Some(dir) => (dir, false),
            None => (std::env::temp_dir().join(uuid::Uuid::new_v4().to_string()), true),
        };
        ensure_job_dir(&job_dir)?;

        Ok(Self {
            items_path: job_dir.join(ITEMS_FILE),
            target,
            job_dir,
            settings: CrawlSettings::default(),
            log_level: None,
            progress: true,
            supervisor: Supervisor::new(),
            ephemeral,
        })
    }

    /// Restores a scraper saved with [`Scraper::save`]
    pub fn load(job_dir: &Path, registry: &TargetRegistry) -> Result<Self, TrawlError> {
        let saved = job::load(job_dir, registry)?;

        Ok(Self {
            target: saved.target,
            job_dir: job_dir.to_path_buf(),
            items_path: saved.items_path,
            settings: saved.settings,
            log_level: None,
            progress: true,
            supervisor: Supervisor::new(),
            ephemeral: false,
        })
    }

    /// Replaces the fetch settings after validating them
    pub fn with_settings(mut self, settings: CrawlSettings) -> Result<Self, TrawlError> {
        validate_settings(&settings)?;
        self.settings = settings;
        Ok(self)
    }

    /// Forwards worker logs at `level` instead of the progress line
    pub fn with_log_level(mut self, level: Option<LogLevel>) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Runs workers through `supervisor` instead of the current binary
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn job_dir(&self) -> &Path {
        &self.job_dir
    }

    pub fn items_path(&self) -> &Path {
        &self.items_path
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// What the worker streams back; a log level takes precedence
    pub fn telemetry(&self) -> TelemetryMode {
        match self.log_level {
            Some(level) => TelemetryMode::Logs { level },
            None if self.progress => TelemetryMode::Progress,
            None => TelemetryMode::Off,
        }
    }

    /// Crawls until a budget in `limits` is reached or nothing is left
    pub async fn scrape(&self, limits: RunLimits) -> Result<RunOutcome, TrawlError> {
        let outcome = self
            .supervisor
            .clone()
            .with_settings(self.settings.clone())
            .with_telemetry(self.telemetry())
            .run_with_items(&self.target, limits, &self.job_dir, &self.items_path)
            .await?;

        if let RunOutcome::Finished(report) = &outcome {
            tracing::info!(
                "Scraped {} items from {} pages ({})",
                report.items_scraped,
                report.pages_fetched,
                report.reason
            );
        }

        Ok(outcome)
    }

    /// Every record scraped so far, in order
    pub fn records(&self) -> Result<Vec<Record>, TrawlError> {
        Ok(read_records(&self.items_path)?)
    }

    pub fn table(&self) -> Result<Table, TrawlError> {
        Ok(Table::from_records(&self.records()?))
    }

    /// Persists the job record and keeps the directory past this handle
    pub fn save(&mut self) -> Result<PathBuf, TrawlError> {
        let dir = job::save(&self.target, &self.settings, &self.items_path, &self.job_dir)?;
        self.ephemeral = false;
        Ok(dir)
    }

    /// Deletes the job's records, frontier and job record
    pub fn clear(&self) -> Result<(), TrawlError> {
        job::clear(&self.job_dir)
    }
}

impl Drop for Scraper {
    fn drop(&mut self) {
        if self.ephemeral {
            if let Err(e) = std::fs::remove_dir_all(&self.job_dir) {
                tracing::debug!("Cannot remove {}: {}", self.job_dir.display(), e);
            }
        }
    }
}
