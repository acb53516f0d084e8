//! Robots fetch-and-cache layer

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;

use crate::robots::rules::RobotsRules;

/// LRU capacity for cached robots entries
const CACHE_CAPACITY: usize = 4096;

/// Cached robots data for a host, with the fetch timestamp
///
/// Entries go stale after 24 hours so operator changes to robots.txt are
/// picked up within a day.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub rules: RobotsRules,
    pub fetched_at: DateTime<Utc>,
}

impl CachedRobots {
    pub fn new(rules: RobotsRules) -> Self {
        Self {
            rules,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > Duration::hours(24)
    }
}

/// Fetches and caches robots.txt per host
///
/// Fetch order is `https` then `http`; a 404 means the site has no robots
/// policy (allow-all), and any other failure also degrades to allow-all so
/// the pipeline never stalls on a host's robots hiccups.
pub struct RobotsCache {
    client: reqwest::Client,
    cache: Mutex<LruCache<String, CachedRobots>>,
    ua: String,
}

impl RobotsCache {
    pub fn new(client: reqwest::Client, ua: &str) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).unwrap();
        Self {
            client,
            cache: Mutex::new(LruCache::new(capacity)),
            ua: ua.to_string(),
        }
    }

    /// Returns the robots rules for `host`, fetching on miss or staleness
    pub async fn get(&self, host: &str) -> RobotsRules {
        {
            let mut cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(host) {
                if !entry.is_stale() {
                    return entry.rules.clone();
                }
            }
        }

        let rules = self.fetch(host).await;
        let mut cache = self.cache.lock().unwrap();
        cache.put(host.to_string(), CachedRobots::new(rules.clone()));
        rules
    }

    async fn fetch(&self, host: &str) -> RobotsRules {
        for scheme in ["https", "http"] {
            let url = format!("{scheme}://{host}/robots.txt");
            let response = match self
                .client
                .get(&url)
                .header(reqwest::header::USER_AGENT, self.ua.as_str())
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(host, scheme, error = %e, "robots fetch failed");
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 404 {
                return RobotsRules::allow_all();
            }
            if status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return RobotsRules::from_content(&body);
            }
            tracing::debug!(host, scheme, status = status.as_u16(), "robots fetch non-2xx");
        }
        RobotsRules::allow_all()
    }

    #[cfg(test)]
    fn insert(&self, host: &str, entry: CachedRobots) {
        self.cache.lock().unwrap().put(host.to_string(), entry);
    }
}
