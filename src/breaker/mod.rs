//! Per-host circuit breakers
//!
//! A host that keeps failing gets its calls short-circuited instead of
//! burning sockets and worker time. Each host owns a small tri-state
//! machine:
//!
//! - **Closed**: calls pass; failures are counted against a rolling
//!   interval. Enough traffic with a high enough failure ratio opens the
//!   breaker.
//! - **Open**: calls are rejected immediately until the cooldown elapses.
//! - **Half-open**: a handful of trial calls are admitted; one failure
//!   reopens, a full set of successes closes.
//!
//! What counts as a failure is decided by the caller (the resilient HTTP
//! client treats transport errors and 5xx as failures, 4xx as success).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half-open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Minimum completed requests in the interval before evaluating
    pub threshold: u32,
    /// Failure ratio at or above which the breaker opens
    pub failure_ratio: f64,
    /// How long the breaker stays open before admitting trials
    pub timeout: Duration,
    /// Rolling interval over which closed-state counters accumulate
    pub interval: Duration,
    /// Trial calls admitted while half-open
    pub max_requests: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            threshold: 5,
            failure_ratio: 0.6,
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(60),
            max_requests: 3,
        }
    }
}

#[derive(Debug)]
struct Core {
    state: BreakerState,
    requests: u32,
    failures: u32,
    /// In half-open: trial calls admitted so far
    trials: u32,
    /// In half-open: trial calls that succeeded
    trial_successes: u32,
    /// In open: earliest instant a trial may be admitted
    not_before: Instant,
    /// Start of the current closed-state counting interval
    interval_start: Instant,
}

/// Tri-state breaker for a single host
pub struct CircuitBreaker {
    config: BreakerConfig,
    core: Mutex<Core>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        let now = Instant::now();
        Self {
            config,
            core: Mutex::new(Core {
                state: BreakerState::Closed,
                requests: 0,
                failures: 0,
                trials: 0,
                trial_successes: 0,
                not_before: now,
                interval_start: now,
            }),
        }
    }

    /// Asks permission to issue one call
    ///
    /// Returns false when the breaker is open (or half-open with all trial
    /// slots taken). A true result must be paired with a later
    /// [`record`](Self::record).
    pub fn try_acquire(&self) -> bool {
        let mut core = self.core.lock().unwrap();
        let now = Instant::now();
        self.roll_interval(&mut core, now);

        match core.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if now >= core.not_before {
                    core.state = BreakerState::HalfOpen;
                    core.trials = 1;
                    core.trial_successes = 0;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if core.trials < self.config.max_requests {
                    core.trials += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records the outcome of an admitted call
    pub fn record(&self, success: bool) {
        let mut core = self.core.lock().unwrap();
        let now = Instant::now();
        self.roll_interval(&mut core, now);

        core.requests += 1;
        if !success {
            core.failures += 1;
        }

        match core.state {
            BreakerState::Closed => {
                if core.requests >= self.config.threshold {
                    let ratio = f64::from(core.failures) / f64::from(core.requests);
                    if ratio >= self.config.failure_ratio {
                        self.open(&mut core, now);
                    }
                }
            }
            BreakerState::HalfOpen => {
                if success {
                    core.trial_successes += 1;
                    if core.trial_successes >= self.config.max_requests {
                        self.close(&mut core, now);
                    }
                } else {
                    self.open(&mut core, now);
                }
            }
            // A straggler finishing after the cooldown started; counts are
            // reset on the next transition anyway
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        let mut core = self.core.lock().unwrap();
        let now = Instant::now();
        // Surface Open -> HalfOpen eligibility without mutating admission
        if core.state == BreakerState::Open && now >= core.not_before {
            return BreakerState::HalfOpen;
        }
        self.roll_interval(&mut core, now);
        core.state
    }

    /// Completed requests and failures in the current window
    pub fn counters(&self) -> (u32, u32) {
        let core = self.core.lock().unwrap();
        (core.requests, core.failures)
    }

    fn open(&self, core: &mut Core, now: Instant) {
        core.state = BreakerState::Open;
        core.not_before = now + self.config.timeout;
        core.requests = 0;
        core.failures = 0;
        core.trials = 0;
        core.trial_successes = 0;
    }

    fn close(&self, core: &mut Core, now: Instant) {
        core.state = BreakerState::Closed;
        core.requests = 0;
        core.failures = 0;
        core.trials = 0;
        core.trial_successes = 0;
        core.interval_start = now;
    }

    /// In the closed state, counters live only for one interval
    fn roll_interval(&self, core: &mut Core, now: Instant) {
        if core.state == BreakerState::Closed
            && now.duration_since(core.interval_start) > self.config.interval
        {
            core.requests = 0;
            core.failures = 0;
            core.interval_start = now;
        }
    }
}

/// Per-host snapshot for observability
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub host: String,
    pub state: &'static str,
    pub requests: u32,
    pub failures: u32,
}

/// Host-keyed breaker map, created lazily like the rate-limiter buckets
pub struct HostBreakers {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl HostBreakers {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn breaker(&self, host: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        Arc::clone(
            breakers
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(CircuitBreaker::new(self.config.clone()))),
        )
    }

    pub fn state(&self, host: &str) -> BreakerState {
        self.breaker(host).state()
    }

    /// Drops a host's breaker, returning it to a fresh closed state
    pub fn reset(&self, host: &str) {
        self.breakers.lock().unwrap().remove(host);
    }

    pub fn stats(&self) -> Vec<BreakerStats> {
        let breakers = self.breakers.lock().unwrap();
        breakers
            .iter()
            .map(|(host, breaker)| {
                let (requests, failures) = breaker.counters();
                BreakerStats {
                    host: host.clone(),
                    state: breaker.state().as_str(),
                    requests,
                    failures,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            threshold: 5,
            failure_ratio: 0.6,
            timeout: Duration::from_millis(50),
            interval: Duration::from_secs(60),
            max_requests: 3,
        }
    }

    fn fail_n(breaker: &CircuitBreaker, n: u32) {
        for _ in 0..n {
            assert!(breaker.try_acquire());
            breaker.record(false);
        }
    }

    #[test]
    fn test_stays_closed_under_threshold() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 4);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_opens_at_threshold_with_high_ratio() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 5);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_low_failure_ratio_keeps_closed() {
        // 2 failures in 6 requests stays well under the 0.6 ratio
        let breaker = CircuitBreaker::new(fast_config());
        for success in [true, true, true, true, false, false] {
            assert!(breaker.try_acquire());
            breaker.record(success);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_timeout() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 5);
        assert!(!breaker.try_acquire());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 5);
        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.try_acquire());
        breaker.record(false);
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_half_open_successes_close() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 5);
        std::thread::sleep(Duration::from_millis(60));

        for _ in 0..3 {
            assert!(breaker.try_acquire());
            breaker.record(true);
        }
        assert_eq!(breaker.state(), BreakerState::Closed);
        let (requests, failures) = breaker.counters();
        assert_eq!((requests, failures), (0, 0));
    }

    #[test]
    fn test_half_open_caps_trial_calls() {
        let breaker = CircuitBreaker::new(fast_config());
        fail_n(&breaker, 5);
        std::thread::sleep(Duration::from_millis(60));

        assert!(breaker.try_acquire());
        assert!(breaker.try_acquire());
        assert!(breaker.try_acquire());
        // All trial slots taken, none recorded yet
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_interval_roll_resets_closed_counters() {
        let config = BreakerConfig {
            interval: Duration::from_millis(30),
            ..fast_config()
        };
        let breaker = CircuitBreaker::new(config);
        fail_n(&breaker, 4);
        assert_eq!(breaker.counters().0, 4);

        std::thread::sleep(Duration::from_millis(40));
        // The stale window no longer counts toward opening
        assert!(breaker.try_acquire());
        breaker.record(false);
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.counters(), (1, 1));
    }

    #[test]
    fn test_host_breakers_isolated_and_resettable() {
        let breakers = HostBreakers::new(fast_config());
        let flaky = breakers.breaker("flaky.example");
        for _ in 0..5 {
            assert!(flaky.try_acquire());
            flaky.record(false);
        }
        assert_eq!(breakers.state("flaky.example"), BreakerState::Open);
        assert_eq!(breakers.state("healthy.example"), BreakerState::Closed);

        breakers.reset("flaky.example");
        assert_eq!(breakers.state("flaky.example"), BreakerState::Closed);
    }

    #[test]
    fn test_stats_snapshot() {
        let breakers = HostBreakers::new(fast_config());
        let breaker = breakers.breaker("a.example");
        assert!(breaker.try_acquire());
        breaker.record(false);

        let stats = breakers.stats();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].host, "a.example");
        assert_eq!(stats[0].state, "closed");
        assert_eq!(stats[0].failures, 1);
    }
}
