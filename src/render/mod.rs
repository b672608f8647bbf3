//! Render substitution layer
//!
//! Requests that carry a [`RenderDirective`] are not fetched over plain HTTP.
//! Instead one long-lived browser session, owned by the [`RenderLayer`],
//! navigates to the URL and its DOM snapshot is used as the page body.
//! Targets may also register named [`RenderCallback`]s that drive the session
//! themselves (click through consent walls, wait for selectors, and so on).

#[cfg(feature = "browser")]
mod chrome;

#[cfg(feature = "browser")]
pub use chrome::ChromeSession;

use crate::config::CrawlSettings;
use crate::crawler::{FetchRequest, Page};
use crate::target::Target;
use crate::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

/// Script used to scroll the page to the bottom
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight)";

/// How a request should be turned into a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RenderDirective {
    /// Navigate the shared browser session and snapshot the DOM
    Browser(BrowserRender),

    /// Hand the request and the session to a target-registered callback
    Callback { name: String },
}

impl RenderDirective {
    /// Default browser rendering with no waits
    pub fn browser() -> Self {
        Self::Browser(BrowserRender::default())
    }

    pub fn callback(name: impl Into<String>) -> Self {
        Self::Callback { name: name.into() }
    }
}

/// Options for the default browser render
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BrowserRender {
    /// Time to wait after navigation before taking the snapshot
    pub wait_ms: u64,

    /// Scroll to the bottom of the page once before the snapshot
    pub scroll_to_bottom: bool,

    /// Time to wait after scrolling
    pub scroll_wait_ms: u64,
}

/// Errors raised while rendering a page
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("render callback '{0}' is not registered")]
    UnknownCallback(String),

    #[error("no render session is running")]
    NoSession,

    #[error("rendering {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("render session error: {0}")]
    Session(String),
}

/// One browser handle driven by the render layer
#[async_trait]
pub trait RenderSession: Send {
    /// Navigates to `url` and waits for the load to finish
    async fn navigate(&mut self, url: &Url) -> Result<(), RenderError>;

    /// Evaluates a script in the current page and returns its JSON result
    async fn evaluate(&mut self, script: &str) -> Result<serde_json::Value, RenderError>;

    /// Returns the serialized DOM of the current page
    async fn page_source(&mut self) -> Result<String, RenderError>;

    async fn close(&mut self) -> Result<(), RenderError>;
}

/// A target-specific render routine
#[async_trait]
pub trait RenderCallback: Send + Sync {
    async fn render(
        &self,
        request: &FetchRequest,
        session: &mut dyn RenderSession,
    ) -> Result<Page, RenderError>;
}

/// Named render callbacks of a target
pub type RenderCallbacks = HashMap<String, Arc<dyn RenderCallback>>;

/// Launches the default browser session
#[cfg(feature = "browser")]
pub async fn launch_session(
    settings: &CrawlSettings,
) -> Result<Box<dyn RenderSession>, RenderError> {
    let session = ChromeSession::launch(Duration::from_secs(settings.render_timeout_secs)).await?;
    Ok(Box::new(session))
}

/// Launches the default browser session
#[cfg(not(feature = "browser"))]
pub async fn launch_session(
    _settings: &CrawlSettings,
) -> Result<Box<dyn RenderSession>, RenderError> {
    Err(RenderError::Launch(
        "trawl was built without the `browser` feature".to_string(),
    ))
}

/// Substitutes rendered pages for network fetches
pub struct RenderLayer {
    session: Option<Mutex<Box<dyn RenderSession>>>,
    callbacks: RenderCallbacks,
    timeout: Duration,
}

impl RenderLayer {
    /// A layer that never renders
    pub fn disabled() -> Self {
        Self {
            session: None,
            callbacks: HashMap::new(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Creates a layer around an existing session
    pub fn with_session(session: Box<dyn RenderSession>, callbacks: RenderCallbacks) -> Self {
        Self {
            session: Some(Mutex::new(session)),
            callbacks,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Starts the layer for a crawl of `target`
    ///
    /// A browser is only launched when the target uses a render directive.
    /// Failing to launch it is a configuration error.
    pub async fn start(target: &Target, settings: &CrawlSettings) -> Result<Self, ConfigError> {
        if !target.definition().uses_rendering() {
            return Ok(Self::disabled());
        }

        tracing::info!("Target {} renders pages, starting browser session", target.kind());
        let session = launch_session(settings)
            .await
            .map_err(|e| ConfigError::RenderSession(e.to_string()))?;

        Ok(Self::with_session(session, target.callbacks().clone())
            .with_timeout(Duration::from_secs(settings.render_timeout_secs)))
    }

    /// Whether a session is running
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Renders `request` if it carries a directive
    ///
    /// Returns `Ok(None)` when the request should go through plain HTTP.
    pub async fn maybe_render(&self, request: &FetchRequest) -> Result<Option<Page>, RenderError> {
        let Some(directive) = &request.render else {
            return Ok(None);
        };

        let session = self.session.as_ref().ok_or(RenderError::NoSession)?;
        let mut session = session.lock().await;

        let render = async {
            match directive {
                RenderDirective::Browser(options) => {
                    render_default(&mut **session, &request.url, options).await
                }
                RenderDirective::Callback { name } => {
                    let callback = self
                        .callbacks
                        .get(name)
                        .ok_or_else(|| RenderError::UnknownCallback(name.clone()))?;
                    callback.render(request, &mut **session).await
                }
            }
        };

        match tokio::time::timeout(self.timeout, render).await {
            Ok(page) => page.map(Some),
            Err(_) => Err(RenderError::Timeout {
                url: request.url.to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Tears the session down
    pub async fn shutdown(self) {
        if let Some(session) = self.session {
            let mut session = session.into_inner();
            if let Err(e) = session.close().await {
                tracing::warn!("Failed to close render session: {}", e);
            }
        }
    }
}

async fn render_default(
    session: &mut dyn RenderSession,
    url: &Url,
    options: &BrowserRender,
) -> Result<Page, RenderError> {
    tracing::debug!("Rendering {}", url);
    session.navigate(url).await?;

    if options.wait_ms > 0 {
        tokio::time::sleep(Duration::from_millis(options.wait_ms)).await;
    }

    if options.scroll_to_bottom {
        session.evaluate(SCROLL_TO_BOTTOM).await?;
        if options.scroll_wait_ms > 0 {
            tokio::time::sleep(Duration::from_millis(options.scroll_wait_ms)).await;
        }
    }

    let body = session.page_source().await?;
    Ok(Page::rendered(url.clone(), body))
}
