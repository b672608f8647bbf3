//! Fetch requests and the pages they produce

use crate::render::RenderDirective;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Priority of requests produced by the content matcher
pub const CONTENT_PRIORITY: i32 = 0;

/// Priority of requests produced by the navigation matcher
pub const NAVIGATION_PRIORITY: i32 = 10;

/// Which matcher produced a link
///
/// Content pages are handed to the target's extractor; navigation pages are
/// only mined for further links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkKind {
    Content,
    Navigation,
}

impl LinkKind {
    /// Default scheduling priority for this link class (lower is fetched first)
    pub fn priority(self) -> i32 {
        match self {
            Self::Content => CONTENT_PRIORITY,
            Self::Navigation => NAVIGATION_PRIORITY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Navigation => "navigation",
        }
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request waiting to be fetched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: Url,

    /// The link class that produced this request
    pub kind: LinkKind,

    /// Scheduling priority (lower is fetched first)
    pub priority: i32,

    /// How to obtain the page; `None` means a plain HTTP fetch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render: Option<RenderDirective>,
}

impl FetchRequest {
    /// Creates a request at the default priority of its link class
    pub fn new(url: Url, kind: LinkKind) -> Self {
        Self {
            url,
            kind,
            priority: kind.priority(),
            render: None,
        }
    }

    pub fn with_render(mut self, render: Option<RenderDirective>) -> Self {
        self.render = render;
        self
    }
}

/// A fetched or rendered page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL of the page, used to resolve relative links
    pub url: Url,

    /// HTTP status (rendered pages report 200)
    pub status: u16,

    pub body: String,

    /// Whether the body is a browser DOM snapshot
    pub rendered: bool,
}

impl Page {
    pub fn new(url: Url, status: u16, body: impl Into<String>) -> Self {
        Self {
            url,
            status,
            body: body.into(),
            rendered: false,
        }
    }

    /// Creates a page from a browser DOM snapshot
    pub fn rendered(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            status: 200,
            body: body.into(),
            rendered: true,
        }
    }

    /// Parses the body as an HTML document
    pub fn document(&self) -> Html {
        Html::parse_document(&self.body)
    }
}
