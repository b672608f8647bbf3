//! Crawls run through real worker processes

use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use trawl::config::{CrawlSettings, LogLevel, TelemetryMode};
use trawl::storage::ITEMS_FILE;
use trawl::supervisor::{TelemetryEvent, TelemetrySink, WorkerInvocation, WORKER_COMMAND};
use trawl::target::{FieldRule, MatcherConfig, SelectorTarget};
use trawl::{
    BudgetKind, ErrorKind, RunLimits, RunOutcome, Scraper, Supervisor, Target, TerminationReason,
    TrawlError,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Clone, Default)]
struct Collected(Arc<Mutex<Vec<TelemetryEvent>>>);

impl TelemetrySink for Collected {
    fn event(&mut self, event: TelemetryEvent) {
        self.0.lock().unwrap().push(event);
    }

    fn raw(&mut self, line: &str) {
        self.0.lock().unwrap().raw(line);
    }
}

fn supervisor(collected: &Collected) -> Supervisor {
    let sink = collected.clone();
    Supervisor::new()
        .with_program(env!("CARGO_BIN_EXE_trawl"), vec![WORKER_COMMAND.to_string()])
        .with_sink(move || Box::new(sink.clone()) as Box<dyn TelemetrySink>)
}

fn settings() -> CrawlSettings {
    CrawlSettings {
        concurrency: 1,
        retry_times: 0,
        request_timeout_secs: 5,
        ..CrawlSettings::default()
    }
}

/// A list page linking four items, the first two without a title
async fn site() -> MockServer {
    let server = MockServer::start().await;
    let base = server.uri();

    let links: String = (1..=4)
        .map(|i| format!("<a href=\"{}/item/{}\">{}</a>", base, i, i))
        .collect();
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "<html><body>{}</body></html>",
            links
        )))
        .mount(&server)
        .await;

    for id in 1..=4 {
        let body = if id <= 2 {
            "<html><body><p>sold out</p></body></html>".to_string()
        } else {
            format!("<html><body><h1>Item {}</h1></body></html>", id)
        };
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", id)))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }

    server
}

fn target(server: &MockServer) -> Target {
    let config = SelectorTarget::new([format!("{}/list", server.uri())])
        .content(MatcherConfig::allow([r"/item/\d+"]))
        .field("title", FieldRule::new("h1").required());
    Target::new(&config).unwrap()
}

#[tokio::test]
async fn test_scraper_resumes_after_error_budget() {
    let server = site().await;
    let dir = TempDir::new().unwrap();
    let collected = Collected::default();

    let scraper = Scraper::new(target(&server), Some(dir.path().to_path_buf()))
        .unwrap()
        .with_settings(settings())
        .unwrap()
        .with_progress(false)
        .with_supervisor(supervisor(&collected));

    match scraper.scrape(RunLimits::default().with_errors(2)).await.unwrap() {
        RunOutcome::Finished(report) => {
            assert_eq!(report.reason, TerminationReason::BudgetReached(BudgetKind::Errors));
            assert_eq!(report.items_scraped, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(scraper.records().unwrap().is_empty());

    match scraper.scrape(RunLimits::new(10, 30)).await.unwrap() {
        RunOutcome::Finished(report) => {
            assert_eq!(report.reason, TerminationReason::FrontierExhausted);
            assert_eq!(report.items_scraped, 2);
            assert_eq!(report.errors, 0);
        }
        other => panic!("unexpected {:?}", other),
    }

    let titles: Vec<String> = scraper
        .records()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Item 3", "Item 4"]);
}

#[tokio::test]
async fn test_progress_events_arrive_in_order() {
    let server = site().await;
    let dir = TempDir::new().unwrap();
    let collected = Collected::default();

    let outcome = supervisor(&collected)
        .with_settings(settings())
        .with_telemetry(TelemetryMode::Progress)
        .run(&target(&server), RunLimits::new(0, 30), dir.path())
        .await
        .unwrap();

    let RunOutcome::Finished(report) = outcome else {
        panic!("expected a finished run");
    };

    let events = collected.0.lock().unwrap().clone();
    let progress: Vec<(u64, u64, u64)> = events
        .iter()
        .map(|e| match e {
            TelemetryEvent::Progress {
                pages_fetched,
                errors,
                items_scraped,
            } => (*pages_fetched, *errors, *items_scraped),
            other => panic!("progress mode forwarded {:?}", other),
        })
        .collect();

    assert_eq!(progress.len() as u64, report.pages_fetched);
    assert!(progress.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(
        progress.last().copied(),
        Some((report.pages_fetched, report.errors, report.items_scraped))
    );
}

#[tokio::test]
async fn test_log_mode_forwards_extraction_warnings() {
    let server = site().await;
    let dir = TempDir::new().unwrap();
    let collected = Collected::default();

    supervisor(&collected)
        .with_settings(settings())
        .with_telemetry(TelemetryMode::Logs {
            level: LogLevel::Warn,
        })
        .run(&target(&server), RunLimits::new(0, 30), dir.path())
        .await
        .unwrap();

    let events = collected.0.lock().unwrap().clone();
    let extraction_warnings: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::Log {
                level: LogLevel::Warn,
                message,
                ..
            } if message.starts_with("extraction failed") => Some(message.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(extraction_warnings.len(), 2);
    assert!(extraction_warnings[0].contains("/item/1"));
    assert!(extraction_warnings[1].contains("/item/2"));
    assert!(events.iter().all(|e| match e {
        TelemetryEvent::Log { level, .. } => *level <= LogLevel::Warn,
        TelemetryEvent::Progress { .. } => false,
    }));
}

#[tokio::test]
async fn test_unknown_target_is_configuration_error() {
    let dir = TempDir::new().unwrap();
    let collected = Collected::default();

    let invocation = WorkerInvocation {
        kind: "no-such-target".into(),
        config: serde_json::json!({}),
        limits: RunLimits::default(),
        settings: CrawlSettings::default(),
        job_dir: dir.path().to_path_buf(),
        items_path: dir.path().join(ITEMS_FILE),
        telemetry: TelemetryMode::Off,
    };

    let err = supervisor(&collected)
        .run_invocation(&invocation)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, TrawlError::Config(_)));
    assert!(err.to_string().contains("no-such-target"));
}
