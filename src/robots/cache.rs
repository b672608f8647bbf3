//! Per-host robots.txt cache for one crawl run

use crate::robots::RobotsRules;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use url::Url;

/// Fetches robots.txt once per origin and remembers the rules
#[derive(Debug, Default)]
pub struct RobotsCache {
    rules: Mutex<HashMap<String, Arc<RobotsRules>>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn cached(&self, origin: &str) -> Option<Arc<RobotsRules>> {
        self.rules.lock().ok()?.get(origin).cloned()
    }

    fn store(&self, origin: String, rules: Arc<RobotsRules>) {
        if let Ok(mut map) = self.rules.lock() {
            map.insert(origin, rules);
        }
    }

    /// Checks `url` against its host's robots.txt, fetching it on first use
    ///
    /// A robots.txt that cannot be fetched, or that does not answer with a
    /// success status, allows everything.
    pub async fn is_allowed(&self, client: &Client, url: &Url, user_agent: &str) -> bool {
        let origin = url.origin().ascii_serialization();

        let rules = match self.cached(&origin) {
            Some(rules) => rules,
            None => {
                let rules = Arc::new(fetch_robots(client, &origin).await);
                self.store(origin, rules.clone());
                rules
            }
        };

        rules.is_allowed(url.as_str(), user_agent)
    }
}

/// Fetches and parses robots.txt for an origin such as `https://example.com`
pub async fn fetch_robots(client: &Client, origin: &str) -> RobotsRules {
    let robots_url = format!("{}/robots.txt", origin);

    let response = match client.get(&robots_url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("Failed to fetch {}: {}", robots_url, e);
            return RobotsRules::allow_all();
        }
    };

    if !response.status().is_success() {
        tracing::debug!("{} answered {}", robots_url, response.status());
        return RobotsRules::allow_all();
    }

    match response.text().await {
        Ok(content) => RobotsRules::from_content(&content),
        Err(e) => {
            tracing::debug!("Failed to read {}: {}", robots_url, e);
            RobotsRules::allow_all()
        }
    }
}
