//! End-to-end crawls run in-process against wiremock sites

use tempfile::TempDir;
use trawl::config::CrawlSettings;
use trawl::crawler::run_crawl;
use trawl::output::read_records;
use trawl::storage::ITEMS_FILE;
use trawl::target::{FieldRule, MatcherConfig, SelectorTarget};
use trawl::{BudgetKind, RunLimits, Target, TerminationReason};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(format!("<html><body>{}</body></html>", body))
}

fn links(hrefs: &[String]) -> String {
    hrefs
        .iter()
        .map(|href| format!("<a href=\"{}\">link</a>", href))
        .collect()
}

async fn mount_items(server: &MockServer, ids: impl IntoIterator<Item = u32>) {
    for id in ids {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", id)))
            .respond_with(html(&format!("<h1>Item {}</h1>", id)))
            .mount(server)
            .await;
    }
}

fn item_target(server: &MockServer) -> Target {
    let config = SelectorTarget::new([format!("{}/list?page=1", server.uri())])
        .content(MatcherConfig::allow([r"/item/\d+"]))
        .navigation(MatcherConfig::allow([r"/list\?page=\d+"]))
        .field("title", FieldRule::new("h1").required());
    Target::new(&config).unwrap()
}

fn settings(concurrency: u32) -> CrawlSettings {
    CrawlSettings {
        concurrency,
        retry_times: 0,
        request_timeout_secs: 5,
        ..CrawlSettings::default()
    }
}

#[tokio::test]
async fn test_bounded_crawl_stops_at_item_limit() {
    let server = MockServer::start().await;
    let base = server.uri();

    let page_one: Vec<String> = (1..=5)
        .map(|i| format!("{}/item/{}", base, i))
        .chain([format!("{}/list?page=2", base)])
        .collect();
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(html(&links(&page_one)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(html(&links(&[format!("{}/item/6", base)])))
        .mount(&server)
        .await;
    mount_items(&server, 1..=6).await;

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);

    let report = run_crawl(
        item_target(&server),
        RunLimits::new(3, 30),
        &settings(2),
        dir.path(),
        &items,
    )
    .await
    .unwrap();

    assert_eq!(report.reason, TerminationReason::BudgetReached(BudgetKind::Items));
    assert_eq!(report.items_scraped, 3);

    let records = read_records(&items).unwrap();
    assert_eq!(records.len(), 3);
    for record in &records {
        let url = record["url"].as_str().unwrap();
        assert!(url.contains("/item/"), "{}", url);
        assert!(record["title"].as_str().unwrap().starts_with("Item "));
    }
}

#[tokio::test]
async fn test_crawl_exhausts_small_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    let page_one: Vec<String> = vec![
        format!("{}/item/1", base),
        format!("{}/item/2", base),
        // Duplicates are fetched once
        format!("{}/item/1#reviews", base),
        format!("{}/about", base),
    ];
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(&links(&page_one)))
        .mount(&server)
        .await;
    mount_items(&server, 1..=2).await;

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);

    let report = run_crawl(
        item_target(&server),
        RunLimits::default(),
        &settings(4),
        dir.path(),
        &items,
    )
    .await
    .unwrap();

    assert_eq!(report.reason, TerminationReason::FrontierExhausted);
    assert_eq!(report.items_scraped, 2);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn test_domain_filter_keeps_crawl_on_site() {
    let server = MockServer::start().await;
    let base = server.uri();

    let page_one: Vec<String> = vec![
        format!("{}/item/1", base),
        "http://elsewhere.invalid/item/2".to_string(),
        format!("{}/item/3", base),
    ];
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(&links(&page_one)))
        .mount(&server)
        .await;
    mount_items(&server, [1, 3]).await;

    let config = SelectorTarget::new([format!("{}/list", base)])
        .content(MatcherConfig::allow([r"/item/\d+"]).with_allow_domains(["127.0.0.1"]))
        .field("title", FieldRule::new("h1"));
    let target = Target::new(&config).unwrap();

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);
    let report = run_crawl(target, RunLimits::default(), &settings(2), dir.path(), &items)
        .await
        .unwrap();

    assert_eq!(report.items_scraped, 2);
    assert_eq!(report.errors, 0);
    for record in read_records(&items).unwrap() {
        assert!(record["url"].as_str().unwrap().starts_with(&base));
    }
}

#[tokio::test]
async fn test_robots_disallowed_pages_are_skipped() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /item/2\n"),
        )
        .mount(&server)
        .await;
    let page_one: Vec<String> = (1..=3).map(|i| format!("{}/item/{}", base, i)).collect();
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(&links(&page_one)))
        .mount(&server)
        .await;
    mount_items(&server, [1, 3]).await;
    Mock::given(method("GET"))
        .and(path("/item/2"))
        .respond_with(html("<h1>Item 2</h1>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);
    let settings = CrawlSettings {
        obey_robots: true,
        ..settings(1)
    };

    let report = run_crawl(
        item_target(&server),
        RunLimits::default(),
        &settings,
        dir.path(),
        &items,
    )
    .await
    .unwrap();

    assert_eq!(report.items_scraped, 2);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn test_resume_after_error_budget_appends() {
    let server = MockServer::start().await;
    let base = server.uri();

    let page_one: Vec<String> = (1..=4).map(|i| format!("{}/item/{}", base, i)).collect();
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(html(&links(&page_one)))
        .mount(&server)
        .await;
    // Items 1 and 2 lack the required title
    for id in 1..=2 {
        Mock::given(method("GET"))
            .and(path(format!("/item/{}", id)))
            .respond_with(html("<p>gone</p>"))
            .expect(1)
            .mount(&server)
            .await;
    }
    mount_items(&server, 3..=4).await;

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);

    let first = run_crawl(
        item_target(&server),
        RunLimits::default().with_errors(2),
        &settings(1),
        dir.path(),
        &items,
    )
    .await
    .unwrap();

    assert_eq!(first.reason, TerminationReason::BudgetReached(BudgetKind::Errors));
    assert_eq!(first.errors, 2);
    assert!(read_records(&items).unwrap().is_empty());

    let second = run_crawl(
        item_target(&server),
        RunLimits::default(),
        &settings(1),
        dir.path(),
        &items,
    )
    .await
    .unwrap();

    assert_eq!(second.reason, TerminationReason::FrontierExhausted);
    assert_eq!(second.items_scraped, 2);
    assert_eq!(second.errors, 0);

    let titles: Vec<String> = read_records(&items)
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Item 3", "Item 4"]);
}
