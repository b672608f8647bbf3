//! Scheduler for the crawl frontier
//!
//! This module handles:
//! - Priority queue management for requests to fetch
//! - De-duplication of `(link kind, canonical URL)` pairs within a job
//! - Per-domain download delays

use crate::crawler::request::{FetchRequest, LinkKind};
use crate::url::{canonicalize, extract_domain};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// A request queued for fetching
#[derive(Debug, Clone)]
struct QueuedRequest {
    request: FetchRequest,

    /// Domain used for the download delay
    domain: String,

    /// Insertion order, keeps requests of equal priority FIFO
    seq: u64,
}

// Lower priority values and earlier insertions are popped first from the max-heap
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .request
            .priority
            .cmp(&self.request.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedRequest {}

/// Result of asking the scheduler for work
#[derive(Debug)]
pub enum Ready {
    /// A request that may be fetched now
    Request(FetchRequest),

    /// Requests are queued but every domain is still in its delay
    Wait(Duration),

    /// Nothing is queued
    Empty,
}

/// Key used to remember which requests were already scheduled
pub type SeenKey = (LinkKind, String);

/// Scheduler manages the frontier queue and download delays
pub struct Scheduler {
    queue: BinaryHeap<QueuedRequest>,
    seen: HashSet<SeenKey>,
    last_request: HashMap<String, Instant>,
    delay: Duration,
    next_seq: u64,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `delay` - Minimum time between two requests to the same domain
    pub fn new(delay: Duration) -> Self {
        Self {
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            last_request: HashMap::new(),
            delay,
            next_seq: 0,
        }
    }

    /// Restores the seen set of a previous run
    pub fn with_seen(mut self, seen: impl IntoIterator<Item = SeenKey>) -> Self {
        self.seen.extend(seen);
        self
    }

    /// Adds a request unless the same link was already scheduled
    ///
    /// Returns whether the request was queued.
    pub fn enqueue(&mut self, request: FetchRequest) -> bool {
        let Ok(url) = canonicalize(request.url.clone()) else {
            tracing::debug!("Dropping non-canonical request {}", request.url);
            return false;
        };

        if !self.seen.insert((request.kind, url.to_string())) {
            tracing::trace!("Already scheduled: {} {}", request.kind, url);
            return false;
        }

        self.push(request);
        true
    }

    /// Adds a request without checking for duplicates
    ///
    /// Used for start URLs and for requests restored from a previous run. The
    /// request is still recorded as seen.
    pub fn force_enqueue(&mut self, request: FetchRequest) {
        if let Ok(url) = canonicalize(request.url.clone()) {
            self.seen.insert((request.kind, url.to_string()));
        }
        self.push(request);
    }

    fn push(&mut self, request: FetchRequest) {
        let domain = extract_domain(&request.url).unwrap_or_default();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.queue.push(QueuedRequest {
            request,
            domain,
            seq,
        });
    }

    /// Pops the best request whose domain is out of its delay
    pub fn next_ready(&mut self, now: Instant) -> Ready {
        if self.queue.is_empty() {
            return Ready::Empty;
        }

        if self.delay.is_zero() {
            return match self.queue.pop() {
                Some(queued) => Ready::Request(queued.request),
                None => Ready::Empty,
            };
        }

        let mut not_ready = Vec::new();
        let mut found = None;
        let mut min_wait = self.delay;

        // Requests are popped in priority order
        while let Some(queued) = self.queue.pop() {
            match self.time_until_ready(&queued.domain, now) {
                None => {
                    found = Some(queued);
                    break;
                }
                Some(wait) => {
                    min_wait = min_wait.min(wait);
                    not_ready.push(queued);
                }
            }
        }

        // Put back the requests we couldn't use
        self.queue.extend(not_ready);

        match found {
            Some(queued) => {
                self.last_request.insert(queued.domain, now);
                Ready::Request(queued.request)
            }
            None => Ready::Wait(min_wait),
        }
    }

    fn time_until_ready(&self, domain: &str, now: Instant) -> Option<Duration> {
        let last = self.last_request.get(domain)?;
        let elapsed = now.saturating_duration_since(*last);
        (elapsed < self.delay).then(|| self.delay - elapsed)
    }

    /// Removes and returns every queued request in priority order
    pub fn drain(&mut self) -> Vec<FetchRequest> {
        let mut requests = Vec::with_capacity(self.queue.len());
        while let Some(queued) = self.queue.pop() {
            requests.push(queued.request);
        }
        requests
    }

    /// Every `(link kind, canonical URL)` scheduled so far
    pub fn seen(&self) -> &HashSet<SeenKey> {
        &self.seen
    }

    /// Returns the number of queued requests
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
