//! Link-classification frontier
//!
//! For every handled page the frontier runs the target's extractor when the
//! page came from a content link, then sorts the page's outgoing links into
//! content and navigation requests. It also enforces the item budget: once
//! the budget is met no further extraction or link discovery happens.

use crate::crawler::budget::{BudgetKind, BudgetState, TerminationReason};
use crate::crawler::parser::extract_links;
use crate::crawler::request::{FetchRequest, LinkKind, Page};
use crate::target::{ExtractionError, Record, Target};
use url::Url;

/// What to do after a page was handled
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Keep crawling
    Continue {
        /// Extraction result for content pages, `None` for navigation pages
        record: Option<Result<Record, ExtractionError>>,
        /// New requests, content requests first
        requests: Vec<FetchRequest>,
    },
    /// Stop dispatching; the page was not processed
    Terminate(TerminationReason),
}

/// Classifies links and extracts records for one target
#[derive(Debug, Clone)]
pub struct Frontier {
    target: Target,
}

impl Frontier {
    pub fn new(target: Target) -> Self {
        Self { target }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Requests for the target's start URLs
    ///
    /// Start URLs are fetched as navigation pages with the navigation render
    /// directive.
    pub fn start_requests(&self) -> Vec<FetchRequest> {
        let definition = self.target.definition();
        definition
            .start_urls
            .iter()
            .map(|url| {
                FetchRequest::new(url.clone(), LinkKind::Navigation)
                    .with_render(definition.render(LinkKind::Navigation).cloned())
            })
            .collect()
    }

    /// Handles one fetched page
    ///
    /// Identical pages and identical counters always produce identical
    /// outcomes. `budget.items_emitted` is incremented only when an
    /// extraction succeeds.
    pub fn handle_page(&self, page: &Page, kind: LinkKind, budget: &mut BudgetState) -> PageOutcome {
        if budget.items_reached() {
            return PageOutcome::Terminate(TerminationReason::BudgetReached(BudgetKind::Items));
        }

        let record = match kind {
            LinkKind::Content => {
                let result = self.target.extract(page);
                if result.is_ok() {
                    budget.items_emitted += 1;
                }
                Some(result)
            }
            LinkKind::Navigation => None,
        };

        // The record that met the budget is the last one; no tail requests
        if budget.items_reached() {
            return PageOutcome::Continue {
                record,
                requests: Vec::new(),
            };
        }

        let links = extract_links(&page.document(), &page.url);
        PageOutcome::Continue {
            record,
            requests: self.classify(&links),
        }
    }

    /// Turns links into requests: content matches first, then navigation
    pub fn classify(&self, links: &[Url]) -> Vec<FetchRequest> {
        let definition = self.target.definition();
        let mut requests = Vec::new();

        for kind in [LinkKind::Content, LinkKind::Navigation] {
            let matcher = definition.matcher(kind);
            let render = definition.render(kind);

            requests.extend(
                links
                    .iter()
                    .filter(|url| matcher.matches(url))
                    .map(|url| FetchRequest::new(url.clone(), kind).with_render(render.cloned())),
            );
        }

        requests
    }
}
