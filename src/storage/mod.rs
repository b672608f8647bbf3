//! Storage module for job persistence
//!
//! This module handles everything a job keeps on disk, including:
//! - The job record (`job.json`) with save / load / clear
//! - The SQLite frontier store used to resume a crawl
//! - The [`Scraper`] handle tying a target to its job directory

mod job;
mod schema;
mod scraper;
mod sqlite;

pub use job::{
    clear, ensure_job_dir, load, read_record, save, JobPaths, JobRecord, SavedJob, FRONTIER_FILE,
    ITEMS_FILE, JOB_FILE,
};
pub use scraper::Scraper;
pub use sqlite::FrontierStore;

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Corrupt record in {path} at line {line}: {message}")]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },

    #[error("Invalid stored data: {0}")]
    Invalid(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
