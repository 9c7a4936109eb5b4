//! Per-host crawl rules + delay, fetched on demand, LRU-bounded.
//!
//! A single mutex guards cache hit, miss, fetch, and LRU bookkeeping
//! together, so concurrent misses for the same host collapse into one
//! `robots.txt` fetch instead of a stampede.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::normalize::host_key;

/// Parsed `robots.txt` rules for the `*` user-agent group, or the absence
/// of a usable policy (`None` entries in the cache — robots.txt missing or
/// unreachable, treated as permissive with the default delay).
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// (is_allow, path_prefix) pairs from the `*` group, longest-prefix-wins.
    rules: Vec<(bool, String)>,
    crawl_delay: Option<f64>,
}

impl RobotsRules {
    fn parse(body: &str) -> Self {
        let mut rules = Vec::new();
        let mut crawl_delay = None;
        let mut in_wildcard_group = false;

        for raw_line in body.lines() {
            let line = match raw_line.split('#').next() {
                Some(l) => l.trim(),
                None => continue,
            };
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_lowercase();
            let value = value.trim();

            match directive.as_str() {
                "user-agent" => {
                    in_wildcard_group = value == "*";
                }
                "disallow" if in_wildcard_group && !value.is_empty() => {
                    rules.push((false, value.to_string()));
                }
                "allow" if in_wildcard_group && !value.is_empty() => {
                    rules.push((true, value.to_string()));
                }
                "crawl-delay" if in_wildcard_group => {
                    if let Ok(secs) = value.parse::<f64>() {
                        crawl_delay = Some(secs);
                    }
                }
                _ => {}
            }
        }

        Self { rules, crawl_delay }
    }

    /// Longest matching `Allow`/`Disallow` prefix wins; no match -> allowed.
    fn can_fetch(&self, path: &str) -> bool {
        let mut best: Option<(usize, bool)> = None;
        for (is_allow, prefix) in &self.rules {
            if path.starts_with(prefix.as_str()) {
                let len = prefix.len();
                if best.map(|(best_len, _)| len > best_len).unwrap_or(true) {
                    best = Some((len, *is_allow));
                }
            }
        }
        best.map(|(_, is_allow)| is_allow).unwrap_or(true)
    }
}

struct CacheInner {
    order: VecDeque<String>,
    entries: HashMap<String, Option<RobotsRules>>,
    capacity: usize,
}

impl CacheInner {
    fn touch(&mut self, host: &str) {
        if let Some(pos) = self.order.iter().position(|h| h == host) {
            self.order.remove(pos);
        }
        self.order.push_back(host.to_string());
    }

    fn insert(&mut self, host: String, rules: Option<RobotsRules>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&host) {
            if let Some(lru) = self.order.pop_front() {
                self.entries.remove(&lru);
            }
        }
        self.entries.insert(host.clone(), rules);
        self.touch(&host);
    }
}

pub struct PolicyCache {
    client: reqwest::Client,
    inner: Mutex<CacheInner>,
    default_delay: Duration,
}

impl PolicyCache {
    pub fn new(capacity: usize, default_delay: Duration, robots_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(robots_timeout)
            .build()
            .expect("robots client builds with static config");
        Self {
            client,
            inner: Mutex::new(CacheInner {
                order: VecDeque::new(),
                entries: HashMap::new(),
                capacity: capacity.max(1),
            }),
            default_delay,
        }
    }

    /// Returns whether `url` may be fetched per its host's robots.txt.
    pub async fn can_fetch(&self, url: &str) -> bool {
        let Some(host) = host_key(url) else {
            return false;
        };
        let path = Url::parse(url)
            .map(|u| {
                let mut p = u.path().to_string();
                if let Some(q) = u.query() {
                    p.push('?');
                    p.push_str(q);
                }
                p
            })
            .unwrap_or_else(|_| "/".to_string());

        let rules = self.rules_for_host(&host).await;
        rules.map(|r| r.can_fetch(&path)).unwrap_or(true)
    }

    /// Returns the crawl delay for `url`'s host: parsed `Crawl-delay`, or
    /// the configured default when absent or robots.txt is unreachable.
    pub async fn crawl_delay(&self, url: &str) -> Duration {
        let Some(host) = host_key(url) else {
            return self.default_delay;
        };
        let rules = self.rules_for_host(&host).await;
        match rules.and_then(|r| r.crawl_delay) {
            Some(secs) if secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => self.default_delay,
        }
    }

    async fn rules_for_host(&self, host: &str) -> Option<RobotsRules> {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.get(host).cloned() {
            inner.touch(host);
            return entry;
        }

        // The lock is held across the fetch itself (not just the cache
        // bookkeeping either side of it) so two concurrent misses for the
        // same host collapse into one robots.txt request instead of racing.
        let rules = self.fetch_robots(host).await;
        inner.insert(host.to_string(), rules.clone());
        rules
    }

    async fn fetch_robots(&self, host: &str) -> Option<RobotsRules> {
        let robots_url = format!("{host}/robots.txt");
        match self.client.get(&robots_url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => {
                    debug!(host, "fetched robots.txt");
                    Some(RobotsRules::parse(&body))
                }
                Err(e) => {
                    warn!(host, error = %e, "robots.txt body read failed");
                    None
                }
            },
            Ok(resp) => {
                debug!(host, status = %resp.status(), "robots.txt not available");
                None
            }
            Err(e) => {
                warn!(host, error = %e, "robots.txt fetch failed");
                None
            }
        }
    }
}
