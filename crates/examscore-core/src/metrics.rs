//! Global atomic counters for examscore.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a job).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Relaxed atomic counters.
pub struct Metrics {
    rows_scored: AtomicU64,
    score_fallbacks: AtomicU64,
    credentials_issued: AtomicU64,
    credentials_degraded: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            rows_scored: AtomicU64::new(0),
            score_fallbacks: AtomicU64::new(0),
            credentials_issued: AtomicU64::new(0),
            credentials_degraded: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
        }
    }

    /// A row went through the row processor (fallbacks included).
    pub fn inc_rows_scored(&self) {
        self.rows_scored.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rows_scored", "counter incremented");
    }

    /// A row fell back to score 0 because the reply was unusable.
    pub fn inc_score_fallbacks(&self) {
        self.score_fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "score_fallbacks", "counter incremented");
    }

    pub fn inc_credentials_issued(&self) {
        self.credentials_issued.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "credentials_issued", "counter incremented");
    }

    pub fn inc_credentials_degraded(&self) {
        self.credentials_degraded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "credentials_degraded", "counter incremented");
    }

    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_completed", "counter incremented");
    }

    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "jobs_failed", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a job) rather than on every
    /// increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            rows_scored = self.rows_scored(),
            score_fallbacks = self.score_fallbacks(),
            credentials_issued = self.credentials_issued(),
            credentials_degraded = self.credentials_degraded(),
            jobs_completed = self.jobs_completed(),
            jobs_failed = self.jobs_failed(),
        );
    }

    pub fn rows_scored(&self) -> u64 {
        self.rows_scored.load(Ordering::Relaxed)
    }

    pub fn score_fallbacks(&self) -> u64 {
        self.score_fallbacks.load(Ordering::Relaxed)
    }

    pub fn credentials_issued(&self) -> u64 {
        self.credentials_issued.load(Ordering::Relaxed)
    }

    pub fn credentials_degraded(&self) -> u64 {
        self.credentials_degraded.load(Ordering::Relaxed)
    }

    pub fn jobs_completed(&self) -> u64 {
        self.jobs_completed.load(Ordering::Relaxed)
    }

    pub fn jobs_failed(&self) -> u64 {
        self.jobs_failed.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.rows_scored.store(0, Ordering::Relaxed);
        self.score_fallbacks.store(0, Ordering::Relaxed);
        self.credentials_issued.store(0, Ordering::Relaxed);
        self.credentials_degraded.store(0, Ordering::Relaxed);
        self.jobs_completed.store(0, Ordering::Relaxed);
        self.jobs_failed.store(0, Ordering::Relaxed);
    }
}
