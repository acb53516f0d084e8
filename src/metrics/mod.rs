//! Process-wide counters
//!
//! One handle is created at startup and threaded through the components
//! that record events. Counters are logged once during drain; there is no
//! network-facing metrics surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Metrics {
    pub tasks_ok: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_panicked: AtomicU64,
    pub robots_blocked: AtomicU64,
    pub tld_skipped: AtomicU64,
    pub breaker_rejected: AtomicU64,
    pub dedup_errors: AtomicU64,
    pub queue_errors: AtomicU64,
    pub batches_flushed: AtomicU64,
    pub batches_spooled: AtomicU64,
    pub spool_replayed: AtomicU64,
    pub edges_emitted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Logs a one-line summary of every counter
    pub fn log_summary(&self) {
        tracing::info!(
            tasks_ok = self.tasks_ok.load(Ordering::Relaxed),
            tasks_failed = self.tasks_failed.load(Ordering::Relaxed),
            tasks_panicked = self.tasks_panicked.load(Ordering::Relaxed),
            robots_blocked = self.robots_blocked.load(Ordering::Relaxed),
            tld_skipped = self.tld_skipped.load(Ordering::Relaxed),
            breaker_rejected = self.breaker_rejected.load(Ordering::Relaxed),
            dedup_errors = self.dedup_errors.load(Ordering::Relaxed),
            queue_errors = self.queue_errors.load(Ordering::Relaxed),
            batches_flushed = self.batches_flushed.load(Ordering::Relaxed),
            batches_spooled = self.batches_spooled.load(Ordering::Relaxed),
            spool_replayed = self.spool_replayed.load(Ordering::Relaxed),
            edges_emitted = self.edges_emitted.load(Ordering::Relaxed),
            "run counters"
        );
    }
}
