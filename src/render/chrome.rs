//! Headless Chromium session over the DevTools protocol

use super::{RenderError, RenderSession};
use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use url::Url;

/// A single Chromium tab reused for every render of a crawl
///
/// Cookies and local storage persist between navigations, so a consent
/// banner dismissed once stays dismissed for the rest of the run.
pub struct ChromeSession {
    browser: Browser,
    page: chromiumoxide::Page,
    handler: JoinHandle<()>,
    timeout: Duration,
}

impl ChromeSession {
    /// Launches headless Chromium and opens one blank tab
    ///
    /// The binary is taken from `CHROME_BIN` when set, otherwise from a list
    /// of well-known locations, otherwise left to `chromiumoxide`.
    pub async fn launch(timeout: Duration) -> Result<Self, RenderError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(timeout);

        if let Some(bin) = find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        let config = builder
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--no-first-run")
            .build()
            .map_err(RenderError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        // The CDP handler must be polled for the connection to make progress
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler error: {}", e);
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Launch(e.to_string()))?;

        Ok(Self {
            browser,
            page,
            handler,
            timeout,
        })
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn navigate(&mut self, url: &Url) -> Result<(), RenderError> {
        let navigation = async {
            self.page.goto(url.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(self.timeout, navigation).await {
            Ok(result) => result.map_err(|e| RenderError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(RenderError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, RenderError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| RenderError::Script(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn page_source(&mut self) -> Result<String, RenderError> {
        self.page
            .content()
            .await
            .map_err(|e| RenderError::Session(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RenderError> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            tracing::debug!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| RenderError::Session(e.to_string()))
    }
}

fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}
