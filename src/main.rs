//! Trawl main entry point
//!
//! This is the command-line interface for the Trawl scraping engine.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use trawl::config::{load_target_file, LogLevel};
use trawl::output::{read_records, Table};
use trawl::storage::{self, JobPaths};
use trawl::supervisor::{run_worker, WORKER_COMMAND};
use trawl::{LinkKind, RunLimits, RunOutcome, Scraper, TargetRegistry};
use tracing_subscriber::EnvFilter;

/// Trawl: a budgeted site scraper
///
/// Trawl follows the links a target classifies as content or navigation,
/// extracts a record from every content page and appends it to a job
/// directory. Crawls stop at an item, page, error or time budget and can be
/// resumed from the job directory.
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "A budgeted site scraper", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a target described by a TOML file
    Scrape {
        /// Path to the target file
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Job directory to write to (a temporary one if omitted)
        #[arg(long)]
        job_dir: Option<PathBuf>,

        #[command(flatten)]
        budgets: Budgets,

        #[command(flatten)]
        telemetry: Telemetry,
    },

    /// Continue a saved job
    Resume {
        #[arg(value_name = "JOB_DIR")]
        job_dir: PathBuf,

        #[command(flatten)]
        budgets: Budgets,

        #[command(flatten)]
        telemetry: Telemetry,
    },

    /// Print the records of a job
    Get {
        #[arg(value_name = "JOB_DIR")]
        job_dir: PathBuf,

        #[arg(long, value_enum, default_value_t = Format::Jsonl)]
        format: Format,
    },

    /// Delete the records, frontier and job record of a job
    Clear {
        #[arg(value_name = "JOB_DIR")]
        job_dir: PathBuf,
    },

    /// Validate a target file and show what would be crawled
    Check {
        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },

    #[command(name = WORKER_COMMAND, hide = true)]
    Worker,
}

#[derive(Args, Debug, Clone, Copy)]
struct Budgets {
    /// Number of items to scrape (0 for no limit)
    #[arg(short = 'n', long = "items", default_value_t = 10)]
    items: u64,

    /// Seconds before the crawl stops (0 for no limit)
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Number of pages to fetch (0 for no limit)
    #[arg(long, default_value_t = 0)]
    pages: u64,

    /// Number of errors tolerated (0 for no limit)
    #[arg(long, default_value_t = 0)]
    errors: u64,
}

impl From<Budgets> for RunLimits {
    fn from(budgets: Budgets) -> Self {
        RunLimits::new(budgets.items, budgets.timeout)
            .with_pages(budgets.pages)
            .with_errors(budgets.errors)
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct Telemetry {
    /// Stream worker logs at this level instead of the progress line
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Hide the progress line
    #[arg(long, conflicts_with = "log_level")]
    no_progress: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Jsonl,
    Csv,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let registry = TargetRegistry::with_builtins();

    if let Command::Worker = cli.command {
        // Worker logging is installed per invocation and goes to the supervisor
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let code = runtime.block_on(run_worker(&registry));
        std::process::exit(code);
    }

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Scrape {
            target,
            job_dir,
            budgets,
            telemetry,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(handle_scrape(&registry, &target, job_dir, budgets, telemetry))
        }
        Command::Resume {
            job_dir,
            budgets,
            telemetry,
        } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(handle_resume(&registry, &job_dir, budgets, telemetry))
        }
        Command::Get { job_dir, format } => handle_get(&job_dir, format),
        Command::Clear { job_dir } => {
            storage::clear(&job_dir)?;
            println!("✓ Cleared {}", job_dir.display());
            Ok(())
        }
        Command::Check { target } => handle_check(&registry, &target),
        Command::Worker => Ok(()),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("trawl=info,warn"),
            1 => EnvFilter::new("trawl=debug,info"),
            2 => EnvFilter::new("trawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Handles `scrape`: saves a new job and runs it
async fn handle_scrape(
    registry: &TargetRegistry,
    path: &Path,
    job_dir: Option<PathBuf>,
    budgets: Budgets,
    telemetry: Telemetry,
) -> anyhow::Result<()> {
    tracing::info!("Loading target from: {}", path.display());
    let file = load_target_file(path)?;
    let target = registry.build(&file.kind, &file.config_json()?)?;

    let mut scraper = Scraper::new(target, job_dir)?
        .with_settings(file.settings)?
        .with_log_level(telemetry.log_level)
        .with_progress(!telemetry.no_progress);

    // Saved before crawling so an interrupted run can still be resumed
    let dir = scraper.save()?;
    println!("Job directory: {}", dir.display());

    let outcome = scraper.scrape(budgets.into()).await?;
    print_outcome(&outcome, &dir);
    Ok(())
}

/// Handles `resume`: continues a saved job where it stopped
async fn handle_resume(
    registry: &TargetRegistry,
    job_dir: &Path,
    budgets: Budgets,
    telemetry: Telemetry,
) -> anyhow::Result<()> {
    let scraper = Scraper::load(job_dir, registry)
        .with_context(|| format!("cannot resume {}", job_dir.display()))?
        .with_log_level(telemetry.log_level)
        .with_progress(!telemetry.no_progress);

    let outcome = scraper.scrape(budgets.into()).await?;
    print_outcome(&outcome, job_dir);
    Ok(())
}

fn print_outcome(outcome: &RunOutcome, job_dir: &Path) {
    match outcome {
        RunOutcome::Finished(report) => {
            println!(
                "✓ {} items scraped, {} pages fetched, {} errors in {:.1}s ({})",
                report.items_scraped,
                report.pages_fetched,
                report.errors,
                report.elapsed_secs,
                report.reason
            );
        }
        RunOutcome::Interrupted => println!("Interrupted"),
    }
    println!("Resume with: trawl resume {}", job_dir.display());
}

/// Handles `get`: writes the records of a job to stdout
fn handle_get(job_dir: &Path, format: Format) -> anyhow::Result<()> {
    let items_path = match storage::read_record(job_dir) {
        Ok(record) => record.items_path_in(job_dir),
        Err(_) => JobPaths::new(job_dir).items,
    };
    let records = read_records(&items_path)?;

    let stdout = std::io::stdout();
    match format {
        Format::Jsonl => {
            use std::io::Write;
            let mut out = stdout.lock();
            for record in &records {
                serde_json::to_writer(&mut out, record)?;
                writeln!(out)?;
            }
        }
        Format::Csv => Table::from_records(&records).write_csv(stdout.lock())?,
    }

    Ok(())
}

/// Handles `check`: validates a target file and shows what would be crawled
fn handle_check(registry: &TargetRegistry, path: &Path) -> anyhow::Result<()> {
    let file = load_target_file(path)?;
    if !registry.contains(&file.kind) {
        anyhow::bail!(
            "unknown target kind '{}' (registered: {})",
            file.kind,
            registry.kinds().collect::<Vec<_>>().join(", ")
        );
    }
    let target = registry.build(&file.kind, &file.config_json()?)?;
    let definition = target.definition();

    println!("=== Trawl Target Check ===\n");
    println!("Kind: {}", target.kind());

    println!("\nStart URLs ({}):", definition.start_urls.len());
    for url in &definition.start_urls {
        println!("  - {}", url);
    }

    for kind in [LinkKind::Content, LinkKind::Navigation] {
        let followed = if definition.matcher(kind).is_enabled() {
            "followed"
        } else {
            "not followed"
        };
        let render = if definition.render(kind).is_some() {
            ", rendered"
        } else {
            ""
        };
        println!("\n{} links: {}{}", kind, followed, render);
    }

    println!("\nSettings:");
    println!("  Concurrency: {}", file.settings.concurrency);
    println!("  Download delay: {}ms", file.settings.download_delay_ms);
    println!("  Request timeout: {}s", file.settings.request_timeout_secs);
    println!("  Retries: {}", file.settings.retry_times);
    println!("  User agent: {}", file.settings.user_agent);
    println!("  Obey robots.txt: {}", file.settings.obey_robots);

    println!("\n✓ Target is valid");
    Ok(())
}
