//! Per-host request rate limiting
//!
//! Each host gets its own token bucket, created lazily on first use. The
//! map is bounded: a janitor task wakes every five minutes and, whenever
//! the map has grown past the cap, drops buckets that have sat idle for
//! over an hour. Buckets are cheap, so the bound is about memory across a
//! long crawl of millions of hosts, not about correctness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Maximum number of host buckets kept before the janitor starts evicting
const MAX_HOSTS: usize = 10_000;

/// How long a bucket may sit unused before eviction
const IDLE_EVICT_AFTER: Duration = Duration::from_secs(60 * 60);

/// Janitor wake interval
const JANITOR_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Token bucket with float tokens, refilled on access
///
/// Starts full so a host's first `burst` requests pass without waiting.
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    rate_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64, burst: u32) -> Self {
        let capacity = f64::from(burst.max(1));
        Self {
            tokens: capacity,
            capacity,
            rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    /// Tries to take one token; on failure returns how long until one
    /// should be available
    fn try_consume(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate_per_sec).min(self.capacity);
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - self.tokens;
            Some(Duration::from_secs_f64(deficit / self.rate_per_sec))
        }
    }
}

struct BucketEntry {
    bucket: TokenBucket,
    last_used: Instant,
}

/// Host-keyed rate limiter with a bounded bucket map
pub struct HostRateLimiter {
    buckets: Arc<Mutex<HashMap<String, BucketEntry>>>,
    rate_per_sec: f64,
    burst: u32,
}

impl HostRateLimiter {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            buckets: Arc::new(Mutex::new(HashMap::new())),
            rate_per_sec: rate_per_sec.max(f64::MIN_POSITIVE),
            burst,
        }
    }

    /// Spawns the eviction janitor; it stops when the token is cancelled
    pub fn spawn_janitor(&self, cancel: CancellationToken) {
        let buckets = Arc::clone(&self.buckets);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_PERIOD);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = evict_idle(&buckets, MAX_HOSTS, IDLE_EVICT_AFTER);
                        if evicted > 0 {
                            tracing::debug!(evicted, "rate limiter janitor evicted idle hosts");
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    /// Consumes one token if available; never blocks
    pub fn allow(&self, host: &str) -> bool {
        self.consume(host).is_none()
    }

    /// Suspends until a token for `host` is available
    ///
    /// Callers for different hosts only contend on the brief map lookup;
    /// the sleep happens with no locks held.
    pub async fn wait(&self, host: &str) {
        loop {
            match self.consume(host) {
                None => return,
                Some(retry_after) => tokio::time::sleep(retry_after).await,
            }
        }
    }

    fn consume(&self, host: &str) -> Option<Duration> {
        let mut buckets = self.buckets.lock().unwrap();
        let now = Instant::now();
        let entry = buckets.entry(host.to_string()).or_insert_with(|| BucketEntry {
            bucket: TokenBucket::new(self.rate_per_sec, self.burst),
            last_used: now,
        });
        entry.last_used = now;
        entry.bucket.try_consume()
    }

    pub fn tracked_hosts(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

fn evict_idle(
    buckets: &Mutex<HashMap<String, BucketEntry>>,
    cap: usize,
    idle_after: Duration,
) -> usize {
    let mut buckets = buckets.lock().unwrap();
    if buckets.len() <= cap {
        return 0;
    }
    let cutoff = Instant::now() - idle_after;
    let before = buckets.len();
    buckets.retain(|_, entry| entry.last_used >= cutoff);
    before - buckets.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_honored_then_exhausted() {
        let limiter = HostRateLimiter::new(1.0, 3);
        assert!(limiter.allow("example.com"));
        assert!(limiter.allow("example.com"));
        assert!(limiter.allow("example.com"));
        assert!(!limiter.allow("example.com"));
    }

    #[test]
    fn test_hosts_do_not_share_buckets() {
        let limiter = HostRateLimiter::new(1.0, 1);
        assert!(limiter.allow("a.example"));
        assert!(!limiter.allow("a.example"));
        assert!(limiter.allow("b.example"));
    }

    #[test]
    fn test_bucket_refills_over_time() {
        let mut bucket = TokenBucket::new(1000.0, 1);
        assert!(bucket.try_consume().is_none());
        let wait = bucket.try_consume().expect("bucket should be empty");
        std::thread::sleep(wait + Duration::from_millis(5));
        assert!(bucket.try_consume().is_none());
    }

    #[test]
    fn test_retry_after_reflects_rate() {
        let mut bucket = TokenBucket::new(2.0, 1);
        assert!(bucket.try_consume().is_none());
        let wait = bucket.try_consume().unwrap();
        // One token at 2/sec takes about half a second
        assert!(wait <= Duration::from_millis(520), "wait was {wait:?}");
    }

    #[tokio::test]
    async fn test_wait_returns_once_token_available() {
        let limiter = HostRateLimiter::new(50.0, 1);
        limiter.wait("example.com").await;
        let start = Instant::now();
        limiter.wait("example.com").await;
        // Second wait needs a refill at 50/sec, so roughly 20ms
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_eviction_only_past_cap() {
        let limiter = HostRateLimiter::new(1.0, 1);
        limiter.allow("a.example");
        limiter.allow("b.example");
        // Under the cap: nothing is evicted no matter how idle
        let evicted = evict_idle(&limiter.buckets, 10, Duration::ZERO);
        assert_eq!(evicted, 0);
        assert_eq!(limiter.tracked_hosts(), 2);
    }

    #[test]
    fn test_eviction_drops_idle_entries_over_cap() {
        let limiter = HostRateLimiter::new(1.0, 1);
        for i in 0..4 {
            limiter.allow(&format!("host{i}.example"));
        }
        {
            // Age two entries past the idle window
            let mut buckets = limiter.buckets.lock().unwrap();
            for host in ["host0.example", "host1.example"] {
                buckets.get_mut(host).unwrap().last_used =
                    Instant::now() - Duration::from_secs(2 * 60 * 60);
            }
        }
        let evicted = evict_idle(&limiter.buckets, 2, IDLE_EVICT_AFTER);
        assert_eq!(evicted, 2);
        assert_eq!(limiter.tracked_hosts(), 2);
    }
}
