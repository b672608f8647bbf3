//! Crawler module for fetching and processing pages
//!
//! This module contains the core crawling logic, including:
//! - Fetch requests, pages and link classes
//! - HTTP fetching with retry logic
//! - HTML link extraction
//! - The link-classification frontier and its budgets
//! - Request scheduling and download delays
//! - Overall crawl coordination

mod budget;
mod coordinator;
mod fetcher;
mod frontier;
mod parser;
mod request;
mod scheduler;

pub use budget::{BudgetKind, BudgetState, TerminationReason};
pub use coordinator::{Coordinator, CrawlReport, PROGRESS_TARGET};
pub use fetcher::{build_http_client, FetchOutcome, Fetcher, TransportError};
pub use frontier::{Frontier, PageOutcome};
pub use parser::{extract_links, extract_links_from_html};
pub use request::{FetchRequest, LinkKind, Page, CONTENT_PRIORITY, NAVIGATION_PRIORITY};
pub use scheduler::{Ready, Scheduler, SeenKey};

use crate::config::{CrawlSettings, RunLimits};
use crate::target::Target;
use crate::TrawlError;
use std::path::Path;

/// Runs a complete crawl of `target` in the current process
///
/// This is the entry point used by the worker. It will:
/// 1. Start the render session if the target needs one
/// 2. Restore the frontier left by a previous run of the job
/// 3. Fetch pages and hand them to the frontier until a budget is reached
///    or nothing is left to fetch
/// 4. Persist the unfetched frontier for the next run
pub async fn run_crawl(
    target: Target,
    limits: RunLimits,
    settings: &CrawlSettings,
    job_dir: &Path,
    items_path: &Path,
) -> Result<CrawlReport, TrawlError> {
    Coordinator::start(target, limits, settings, job_dir, items_path)
        .await?
        .run()
        .await
}
