//! The worker side of a supervised crawl

use super::telemetry::{worker_filter, TelemetryLayer};
use super::{WorkerFailure, WorkerInvocation, WorkerResult};
use crate::crawler::run_crawl;
use crate::target::TargetRegistry;
use crate::{ConfigError, ErrorKind, TrawlError};
use futures::FutureExt;
use std::any::Any;
use std::io::Write;
use std::panic::AssertUnwindSafe;
use tokio::io::AsyncReadExt;
use tracing_subscriber::layer::SubscriberExt;

/// Hidden subcommand that turns the binary into a worker
pub const WORKER_COMMAND: &str = "__worker";

/// Runs one crawl described on stdin and reports the result on stdout
///
/// Returns the process exit code. The tracing subscriber installed here is
/// scoped to the calling thread, so this must run on a current-thread
/// runtime.
pub async fn run_worker(registry: &TargetRegistry) -> i32 {
    let invocation = match read_invocation().await {
        Ok(invocation) => invocation,
        Err(e) => return report(&WorkerResult::Failed(WorkerFailure::from_error(&e))),
    };

    let subscriber = tracing_subscriber::registry()
        .with(worker_filter(invocation.telemetry))
        .with(TelemetryLayer::new(std::io::stderr(), invocation.telemetry));
    let _guard = tracing::subscriber::set_default(subscriber);

    let result = execute(registry, invocation).await;
    report(&result)
}

/// Runs the crawl, turning errors and panics into a failure result
async fn execute(registry: &TargetRegistry, invocation: WorkerInvocation) -> WorkerResult {
    match AssertUnwindSafe(crawl(registry, invocation)).catch_unwind().await {
        Ok(Ok(report)) => WorkerResult::Finished(report),
        Ok(Err(e)) => {
            tracing::error!("{}", e);
            WorkerResult::Failed(WorkerFailure::from_error(&e))
        }
        Err(payload) => {
            let message = format!("worker panicked: {}", panic_message(payload.as_ref()));
            tracing::error!("{}", message);
            WorkerResult::Failed(WorkerFailure {
                kind: ErrorKind::WorkerCrash,
                message,
                url: None,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

async fn read_invocation() -> Result<WorkerInvocation, TrawlError> {
    let mut input = Vec::new();
    tokio::io::stdin().read_to_end(&mut input).await?;

    serde_json::from_slice(&input)
        .map_err(|e| ConfigError::Validation(format!("malformed worker invocation: {}", e)).into())
}

async fn crawl(
    registry: &TargetRegistry,
    invocation: WorkerInvocation,
) -> Result<crate::CrawlReport, TrawlError> {
    let target = registry.build(&invocation.kind, &invocation.config)?;

    run_crawl(
        target,
        invocation.limits,
        &invocation.settings,
        &invocation.job_dir,
        &invocation.items_path,
    )
    .await
}

fn report(result: &WorkerResult) -> i32 {
    let code = match result {
        WorkerResult::Finished(_) => 0,
        WorkerResult::Failed(_) => 1,
    };

    let mut stdout = std::io::stdout().lock();
    let written = serde_json::to_writer(&mut stdout, result)
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(stdout))
        .and_then(|()| stdout.flush());

    match written {
        Ok(()) => code,
        Err(_) => 2,
    }
}
