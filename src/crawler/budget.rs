//! Crawl budgets and termination reasons

use crate::config::RunLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Which budget stopped a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BudgetKind {
    Items,
    Pages,
    Errors,
    Time,
}

impl fmt::Display for BudgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Items => "items",
            Self::Pages => "pages",
            Self::Errors => "errors",
            Self::Time => "time",
        };
        f.write_str(name)
    }
}

/// Why a crawl stopped
///
/// Reaching a budget is a normal way to finish and never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "budget", rename_all = "kebab-case")]
pub enum TerminationReason {
    /// No requests were left to fetch
    FrontierExhausted,
    /// A budget was reached
    BudgetReached(BudgetKind),
    /// The crawl was stopped by a signal
    Interrupted,
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrontierExhausted => f.write_str("frontier exhausted"),
            Self::BudgetReached(kind) => write!(f, "{} budget reached", kind),
            Self::Interrupted => f.write_str("interrupted"),
        }
    }
}

/// Per-run counters checked against the limits
#[derive(Debug, Clone)]
pub struct BudgetState {
    pub limits: RunLimits,
    pub items_emitted: u64,
    pub pages_fetched: u64,
    pub errors: u64,
    pub started: Instant,
}

impl BudgetState {
    pub fn new(limits: RunLimits) -> Self {
        Self {
            limits,
            items_emitted: 0,
            pages_fetched: 0,
            errors: 0,
            started: Instant::now(),
        }
    }

    /// Whether the item budget is non-zero and met
    pub fn items_reached(&self) -> bool {
        self.limits.items > 0 && self.items_emitted >= self.limits.items
    }

    /// The first count budget that is met, checked as items, pages, errors
    pub fn exceeded(&self) -> Option<BudgetKind> {
        if self.items_reached() {
            Some(BudgetKind::Items)
        } else if self.limits.pages > 0 && self.pages_fetched >= self.limits.pages {
            Some(BudgetKind::Pages)
        } else if self.limits.errors > 0 && self.errors >= self.limits.errors {
            Some(BudgetKind::Errors)
        } else {
            None
        }
    }

    /// When the wall-clock budget runs out, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.limits.timeout().map(|t| self.started + t)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
