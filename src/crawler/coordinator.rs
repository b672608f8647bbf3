//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the crawl loop that runs inside a worker, including:
//! - Restoring the frontier of a previous run
//! - Dispatching fetches (plain or rendered) up to the concurrency limit
//! - Handing pages to the frontier and appending records
//! - Enforcing the item, page, error and time budgets with a graceful drain
//! - Persisting whatever was left unfetched

use crate::config::{CrawlSettings, RunLimits};
use crate::crawler::budget::{BudgetKind, BudgetState, TerminationReason};
use crate::crawler::fetcher::{FetchOutcome, Fetcher, TransportError};
use crate::crawler::frontier::{Frontier, PageOutcome};
use crate::crawler::request::FetchRequest;
use crate::crawler::scheduler::{Ready, Scheduler};
use crate::output::ItemWriter;
use crate::render::RenderLayer;
use crate::storage::{FrontierStore, JobPaths};
use crate::target::Target;
use crate::TrawlError;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};

/// Tracing target of progress events
pub const PROGRESS_TARGET: &str = "trawl::progress";

/// Summary of a finished crawl run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlReport {
    pub reason: TerminationReason,
    pub items_scraped: u64,
    pub pages_fetched: u64,
    pub errors: u64,
    pub elapsed_secs: f64,
}

/// Mutable crawl state; page handling never interleaves
struct CrawlState {
    frontier: Frontier,
    scheduler: Scheduler,
    budget: BudgetState,
    items: ItemWriter,
    store: FrontierStore,

    /// First reason dispatching stopped
    stop: Option<TerminationReason>,

    /// Requests refused by a terminating page handler
    refused: Vec<FetchRequest>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    state: CrawlState,
    fetcher: Fetcher,
    render: RenderLayer,
    concurrency: usize,
}

impl Coordinator {
    /// Prepares a crawl of `target` inside a job directory
    ///
    /// Starts the render session when the target needs one, opens the items
    /// file and restores the frontier of a previous run.
    pub async fn start(
        target: Target,
        limits: RunLimits,
        settings: &CrawlSettings,
        job_dir: &Path,
        items_path: &Path,
    ) -> Result<Self, TrawlError> {
        let render = RenderLayer::start(&target, settings).await?;
        Self::with_render(target, limits, settings, job_dir, items_path, render)
    }

    /// Like [`Coordinator::start`] with an already running render layer
    pub fn with_render(
        target: Target,
        limits: RunLimits,
        settings: &CrawlSettings,
        job_dir: &Path,
        items_path: &Path,
        render: RenderLayer,
    ) -> Result<Self, TrawlError> {
        let paths = JobPaths::new(job_dir);
        crate::storage::ensure_job_dir(&paths.dir)?;

        let fetcher = Fetcher::new(settings)?;
        let items = ItemWriter::open(items_path)?;
        let store = FrontierStore::open(&paths.frontier)?;

        let frontier = Frontier::new(target);
        let mut scheduler = Scheduler::new(Duration::from_millis(settings.download_delay_ms))
            .with_seen(store.load_seen()?);

        // Start URLs are always fetched, even if a previous run saw them
        for request in frontier.start_requests() {
            scheduler.force_enqueue(request);
        }

        let restored = store.load_pending()?;
        if !restored.is_empty() {
            tracing::info!("Restoring {} pending requests", restored.len());
        }
        for request in restored {
            scheduler.force_enqueue(request);
        }

        Ok(Self {
            state: CrawlState {
                frontier,
                scheduler,
                budget: BudgetState::new(limits),
                items,
                store,
                stop: None,
                refused: Vec::new(),
            },
            fetcher,
            render,
            concurrency: settings.concurrency.max(1) as usize,
        })
    }

    /// Runs the crawl until the frontier is exhausted or a budget is reached
    pub async fn run(self) -> Result<CrawlReport, TrawlError> {
        let Self {
            mut state,
            fetcher,
            render,
            concurrency,
        } = self;

        tracing::info!(
            "Starting crawl of {} target with {} queued requests{}",
            state.frontier.target().kind(),
            state.scheduler.len(),
            if render.is_active() { ", rendering enabled" } else { "" }
        );

        let result = crawl_loop(&mut state, &fetcher, &render, concurrency).await;
        render.shutdown().await;
        result?;

        state.finish()
    }
}

async fn crawl_loop(
    state: &mut CrawlState,
    fetcher: &Fetcher,
    render: &RenderLayer,
    concurrency: usize,
) -> Result<(), TrawlError> {
    let mut in_flight = FuturesUnordered::new();

    let deadline = state.budget.deadline();
    let timer = tokio::time::sleep_until(
        deadline
            .map(tokio::time::Instant::from_std)
            .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(86_400 * 365)),
    );
    tokio::pin!(timer);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupt_armed = true;

    loop {
        let mut wait = None;

        if state.stop.is_none() {
            while in_flight.len() < concurrency {
                match state.scheduler.next_ready(Instant::now()) {
                    Ready::Request(request) => in_flight.push(fetch_one(fetcher, render, request)),
                    Ready::Wait(duration) => {
                        wait = Some(duration);
                        break;
                    }
                    Ready::Empty => break,
                }
            }
        }

        if in_flight.is_empty() && (state.stop.is_some() || wait.is_none()) {
            break;
        }

        tokio::select! {
            Some((request, result)) = in_flight.next(), if !in_flight.is_empty() => {
                state.on_response(request, result)?;
            }
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {}
            _ = &mut timer, if deadline.is_some() && state.stop.is_none() => {
                tracing::info!("Time budget reached, draining {} requests", in_flight.len());
                state.stop = Some(TerminationReason::BudgetReached(BudgetKind::Time));
            }
            signal = &mut ctrl_c, if interrupt_armed => {
                interrupt_armed = false;
                match signal {
                    Ok(()) => {
                        tracing::warn!("Interrupted, draining {} requests", in_flight.len());
                        if state.stop.is_none() {
                            state.stop = Some(TerminationReason::Interrupted);
                        }
                    }
                    Err(e) => tracing::debug!("Cannot listen for Ctrl-C: {}", e),
                }
            }
        }
    }

    Ok(())
}

/// Obtains the page for a request, rendered when it carries a directive
async fn fetch_one(
    fetcher: &Fetcher,
    render: &RenderLayer,
    request: FetchRequest,
) -> (FetchRequest, Result<FetchOutcome, TransportError>) {
    let result = match render.maybe_render(&request).await {
        Ok(Some(page)) => Ok(FetchOutcome::Page(page)),
        Ok(None) => fetcher.fetch(&request).await,
        Err(e) => Err(TransportError::new(request.url.as_str(), e.to_string())),
    };
    (request, result)
}

impl CrawlState {
    fn on_response(
        &mut self,
        request: FetchRequest,
        result: Result<FetchOutcome, TransportError>,
    ) -> Result<(), TrawlError> {
        match result {
            Ok(FetchOutcome::Page(page)) => {
                self.budget.pages_fetched += 1;
                tracing::debug!("Fetched {} ({})", page.url, request.kind);

                match self.frontier.handle_page(&page, request.kind, &mut self.budget) {
                    PageOutcome::Terminate(reason) => {
                        if self.stop.is_none() {
                            self.stop = Some(reason);
                        }
                        self.refused.push(request);
                    }
                    PageOutcome::Continue { record, requests } => {
                        match record {
                            Some(Ok(record)) => self.items.append(&record)?,
                            Some(Err(e)) => {
                                tracing::warn!("{}", e);
                                self.budget.errors += 1;
                            }
                            None => {}
                        }

                        for request in requests {
                            self.scheduler.enqueue(request);
                        }
                    }
                }
            }
            Ok(FetchOutcome::Disallowed) => {
                tracing::info!("Skipping {}: disallowed by robots.txt", request.url);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                self.budget.errors += 1;
            }
        }

        if self.stop.is_none() {
            if let Some(kind) = self.budget.exceeded() {
                tracing::info!("{} budget reached", kind);
                self.stop = Some(TerminationReason::BudgetReached(kind));
            }
        }

        tracing::info!(
            target: PROGRESS_TARGET,
            pages_fetched = self.budget.pages_fetched,
            errors = self.budget.errors,
            items_scraped = self.budget.items_emitted,
            "progress"
        );

        Ok(())
    }

    /// Persists the unfetched frontier and builds the report
    fn finish(mut self) -> Result<CrawlReport, TrawlError> {
        let mut pending = std::mem::take(&mut self.refused);
        pending.extend(self.scheduler.drain());

        self.store.save_pending(&pending)?;
        self.store.save_seen(self.scheduler.seen())?;

        let reason = if self.budget.items_reached() {
            TerminationReason::BudgetReached(BudgetKind::Items)
        } else {
            self.stop.unwrap_or(TerminationReason::FrontierExhausted)
        };

        let report = CrawlReport {
            reason,
            items_scraped: self.budget.items_emitted,
            pages_fetched: self.budget.pages_fetched,
            errors: self.budget.errors,
            elapsed_secs: self.budget.elapsed().as_secs_f64(),
        };

        tracing::info!(
            "Crawl finished ({}): {} items, {} pages, {} errors, {} requests left",
            report.reason,
            report.items_scraped,
            report.pages_fetched,
            report.errors,
            pending.len()
        );
        tracing::debug!("Records appended to {}", self.items.path().display());

        Ok(report)
    }
}
