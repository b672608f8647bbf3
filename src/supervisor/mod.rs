//! Process-isolated crawl runs
//!
//! Every crawl runs in a fresh worker process (the `trawl` binary invoked
//! with its hidden `__worker` subcommand). The supervisor:
//! - Sends a [`WorkerInvocation`] as JSON on the worker's stdin
//! - Replays the telemetry the worker streams on stderr
//! - Reads a single [`WorkerResult`] from the worker's stdout
//! - Turns worker failures back into [`TrawlError`]s of the same kind
//!
//! A worker that exits without a result, or outlives its time budget by
//! more than a grace period, is killed and reported as a crash. Runs without
//! a time budget are bounded by [`DEFAULT_FALLBACK_TIMEOUT`] instead.

mod telemetry;
mod worker;

pub use telemetry::{
    forward_telemetry, worker_filter, FieldValue, TelemetryEvent, TelemetryLayer, TelemetrySink,
    TracingSink, WORKER_TARGET,
};
pub use worker::{run_worker, WORKER_COMMAND};

use crate::config::{CrawlSettings, RunLimits, TelemetryMode};
use crate::crawler::{CrawlReport, TransportError};
use crate::storage::{ensure_job_dir, ITEMS_FILE};
use crate::target::{ExtractionError, Target};
use crate::{ConfigError, ErrorKind, TrawlError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

/// Everything a worker needs to run one crawl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerInvocation {
    pub kind: String,
    pub config: Value,
    pub limits: RunLimits,
    pub settings: CrawlSettings,
    pub job_dir: PathBuf,
    pub items_path: PathBuf,
    pub telemetry: TelemetryMode,
}

/// The single message a worker writes on stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkerResult {
    Finished(CrawlReport),
    Failed(WorkerFailure),
}

/// A crawl error flattened for the trip across the process boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl WorkerFailure {
    pub fn from_error(error: &TrawlError) -> Self {
        let (message, url) = match error {
            TrawlError::Config(e) => (e.to_string(), None),
            TrawlError::UrlError(e) => (e.to_string(), None),
            TrawlError::Transport(e) => (e.reason.clone(), Some(e.url.clone())),
            TrawlError::Extraction(e) => (e.message.clone(), Some(e.url.clone())),
            other => (other.to_string(), None),
        };

        Self {
            kind: error.kind(),
            message,
            url,
        }
    }

    /// Rebuilds an error of the same kind in the supervisor
    pub fn into_error(self) -> TrawlError {
        match self.kind {
            ErrorKind::Configuration => ConfigError::Reported(self.message).into(),
            ErrorKind::Transport => TransportError {
                url: self.url.unwrap_or_default(),
                reason: self.message,
            }
            .into(),
            ErrorKind::Extraction => ExtractionError {
                url: self.url.unwrap_or_default(),
                message: self.message,
            }
            .into(),
            ErrorKind::Storage | ErrorKind::WorkerCrash => TrawlError::WorkerCrash {
                message: self.message,
            },
        }
    }
}

/// How a supervised run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Finished(CrawlReport),
    /// The caller pressed Ctrl-C; whatever the worker wrote so far is kept
    Interrupted,
}

/// Longest a worker may run when its limits carry no time budget
pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

type SinkFactory = Arc<dyn Fn() -> Box<dyn TelemetrySink> + Send + Sync>;

/// Runs crawls in worker processes
#[derive(Clone)]
pub struct Supervisor {
    program: Option<PathBuf>,
    args: Vec<String>,
    settings: CrawlSettings,
    telemetry: TelemetryMode,
    sink: SinkFactory,
    exit_grace: Duration,
    shutdown_grace: Duration,
    interrupt_grace: Duration,
    fallback_timeout: Duration,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("settings", &self.settings)
            .field("telemetry", &self.telemetry)
            .field("exit_grace", &self.exit_grace)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("fallback_timeout", &self.fallback_timeout)
            .finish_non_exhaustive()
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl Supervisor {
    /// A supervisor that re-executes the current binary as its worker
    pub fn new() -> Self {
        Self {
            program: None,
            args: vec![WORKER_COMMAND.to_string()],
            settings: CrawlSettings::default(),
            telemetry: TelemetryMode::default(),
            sink: Arc::new(|| Box::new(TracingSink::new()) as Box<dyn TelemetrySink>),
            exit_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(60),
            interrupt_grace: Duration::from_secs(10),
            fallback_timeout: DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    /// Uses another executable as the worker
    pub fn with_program(mut self, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        self.program = Some(program.into());
        self.args = args;
        self
    }

    pub fn with_settings(mut self, settings: CrawlSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryMode) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Replaces where worker telemetry goes
    pub fn with_sink<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn TelemetrySink> + Send + Sync + 'static,
    {
        self.sink = Arc::new(factory);
        self
    }

    /// Time a worker gets to exit after its result or end of output
    pub fn with_exit_grace(mut self, grace: Duration) -> Self {
        self.exit_grace = grace;
        self
    }

    /// Time a worker may run past its time budget before it is killed
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Time a worker may run when the crawl has no time budget
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    pub fn telemetry(&self) -> TelemetryMode {
        self.telemetry
    }

    /// Crawls `target` in a worker, appending records to `job_dir/items.jl`
    pub async fn run(
        &self,
        target: &Target,
        limits: RunLimits,
        job_dir: &Path,
    ) -> Result<RunOutcome, TrawlError> {
        self.run_with_items(target, limits, job_dir, &job_dir.join(ITEMS_FILE))
            .await
    }

    /// Crawls `target` in a worker, appending records to `items_path`
    pub async fn run_with_items(
        &self,
        target: &Target,
        limits: RunLimits,
        job_dir: &Path,
        items_path: &Path,
    ) -> Result<RunOutcome, TrawlError> {
        ensure_job_dir(job_dir)?;

        let invocation = WorkerInvocation {
            kind: target.kind().to_string(),
            config: target.config().clone(),
            limits,
            settings: self.settings.clone(),
            job_dir: job_dir.to_path_buf(),
            items_path: items_path.to_path_buf(),
            telemetry: self.telemetry,
        };

        self.run_invocation(&invocation).await
    }

    /// Runs a prepared invocation to completion
    pub async fn run_invocation(
        &self,
        invocation: &WorkerInvocation,
    ) -> Result<RunOutcome, TrawlError> {
        let mut child = self.spawn()?;
        tracing::debug!("Started worker (pid {:?})", child.id());

        let stderr = child.stderr.take().ok_or_else(|| crash("worker stderr unavailable"))?;
        let mut sink = (self.sink)();
        let listener = tokio::spawn(async move {
            if let Err(e) = forward_telemetry(stderr, &mut *sink).await {
                tracing::debug!("Telemetry channel failed: {}", e);
            }
        });

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(invocation)?;
            // A worker that died on startup closes stdin; its exit status says why
            if let Err(e) = stdin.write_all(&payload).await {
                tracing::debug!("Cannot send invocation to worker: {}", e);
            }
            drop(stdin);
        }

        let stdout = child.stdout.take().ok_or_else(|| crash("worker stdout unavailable"))?;
        let result = read_result(stdout);
        tokio::pin!(result);

        let hard_deadline = invocation
            .limits
            .timeout()
            .map(|t| t + self.shutdown_grace)
            .unwrap_or(self.fallback_timeout);
        let deadline = tokio::time::sleep(hard_deadline);
        tokio::pin!(deadline);

        tokio::select! {
            result = &mut result => {
                let status = self.reap(&mut child, self.exit_grace).await;
                self.join(listener).await;

                match result {
                    Some(WorkerResult::Finished(report)) => Ok(RunOutcome::Finished(report)),
                    Some(WorkerResult::Failed(failure)) => Err(failure.into_error()),
                    None => Err(crash(format!(
                        "worker exited without a result ({})",
                        describe(status)
                    ))),
                }
            }
            _ = &mut deadline => {
                tracing::error!("Worker still running after {}s, killing it", hard_deadline.as_secs());
                if let Err(e) = child.kill().await {
                    tracing::debug!("Cannot kill worker: {}", e);
                }
                self.join(listener).await;
                Err(crash(format!(
                    "worker did not finish within {}s",
                    hard_deadline.as_secs_f64()
                )))
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Interrupted, waiting for the worker to save its frontier");
                // The worker receives the same signal and drains on its own
                if tokio::time::timeout(self.interrupt_grace, &mut result).await.is_err() {
                    tracing::debug!("Worker sent no result within {}s of the interrupt", self.interrupt_grace.as_secs());
                }
                self.reap(&mut child, self.exit_grace).await;
                self.join(listener).await;
                Ok(RunOutcome::Interrupted)
            }
        }
    }

    fn spawn(&self) -> Result<Child, TrawlError> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => std::env::current_exe()?,
        };

        Command::new(&program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| crash(format!("cannot start worker {}: {}", program.display(), e)))
    }

    /// Waits up to `grace` for the worker to exit, then kills it
    async fn reap(&self, child: &mut Child, grace: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::debug!("Cannot wait for worker: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!("Worker did not exit within {}s, killing it", grace.as_secs());
                if let Err(e) = child.kill().await {
                    tracing::debug!("Cannot kill worker: {}", e);
                }
                None
            }
        }
    }

    /// Waits for the telemetry listener so replayed logs precede the return
    async fn join(&self, mut listener: JoinHandle<()>) {
        if tokio::time::timeout(self.exit_grace, &mut listener).await.is_err() {
            listener.abort();
        }
    }
}

/// Reads stdout until a result line shows up or the stream ends
async fn read_result(stdout: ChildStdout) -> Option<WorkerResult> {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<WorkerResult>(&line) {
                Ok(result) => return Some(result),
                Err(_) => tracing::debug!(target: WORKER_TARGET, "stdout: {}", line),
            },
            Ok(None) => return None,
            Err(e) => {
                tracing::debug!("Cannot read worker output: {}", e);
                return None;
            }
        }
    }
}

fn describe(status: Option<ExitStatus>) -> String {
    match status {
        Some(status) => status.to_string(),
        None => "killed".to_string(),
    }
}

fn crash(message: impl Into<String>) -> TrawlError {
    TrawlError::WorkerCrash {
        message: message.into(),
    }
}
