//! Rendered requests are served by the render session, never over HTTP

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use trawl::config::CrawlSettings;
use trawl::crawler::Coordinator;
use trawl::output::read_records;
use trawl::render::{RenderError, RenderLayer, RenderSession};
use trawl::storage::ITEMS_FILE;
use trawl::target::{FieldRule, MatcherConfig, SelectorTarget};
use trawl::{FetchRequest, LinkKind, RenderDirective, RunLimits, Target, TerminationReason};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves the same document for every URL and records navigations
#[derive(Clone, Default)]
struct StaticSession {
    visited: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl RenderSession for StaticSession {
    async fn navigate(&mut self, url: &Url) -> Result<(), RenderError> {
        self.visited.lock().unwrap().push(url.path().to_string());
        Ok(())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value, RenderError> {
        Ok(serde_json::Value::Null)
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        Ok("<html>ok</html>".to_string())
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_maybe_render_substitutes_page() {
    let session = StaticSession::default();
    let layer = RenderLayer::with_session(Box::new(session.clone()), HashMap::new());

    let url = Url::parse("https://shop.test/item/1").unwrap();
    let request = FetchRequest::new(url.clone(), LinkKind::Content)
        .with_render(Some(RenderDirective::browser()));

    let page = layer.maybe_render(&request).await.unwrap().unwrap();
    assert_eq!(page.url, url);
    assert_eq!(page.body, "<html>ok</html>");
    assert_eq!(*session.visited.lock().unwrap(), vec!["/item/1".to_string()]);

    let plain = FetchRequest::new(url, LinkKind::Content);
    assert!(layer.maybe_render(&plain).await.unwrap().is_none());
}

#[tokio::test]
async fn test_rendered_content_pages_skip_http() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(format!(
                "<html><body><a href=\"{0}/item/1\">1</a><a href=\"{0}/item/2\">2</a></body></html>",
                base
            )),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>http</html>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/item/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>http</html>"))
        .expect(0)
        .mount(&server)
        .await;

    let config = SelectorTarget::new([format!("{}/list", base)])
        .content(MatcherConfig::allow([r"/item/\d+"]))
        .content_render(RenderDirective::browser())
        .field("text", FieldRule::new("body"));
    let target = Target::new(&config).unwrap();

    let session = StaticSession::default();
    let render = RenderLayer::with_session(Box::new(session.clone()), HashMap::new());

    let dir = TempDir::new().unwrap();
    let items = dir.path().join(ITEMS_FILE);
    let settings = CrawlSettings {
        concurrency: 2,
        retry_times: 0,
        ..CrawlSettings::default()
    };

    let report = Coordinator::with_render(
        target,
        RunLimits::default(),
        &settings,
        dir.path(),
        &items,
        render,
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    assert_eq!(report.reason, TerminationReason::FrontierExhausted);
    assert_eq!(report.items_scraped, 2);

    let records = read_records(&items).unwrap();
    assert!(records.iter().all(|r| r["text"] == "ok"));

    let mut visited = session.visited.lock().unwrap().clone();
    visited.sort();
    assert_eq!(visited, vec!["/item/1", "/item/2"]);
}
