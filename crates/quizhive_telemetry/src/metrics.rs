//! Supply-engine metrics.
//!
//! Plain data, lock-free atomics, single writer per site, any number of
//! readers via `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the generation pipeline. All fields are atomic so handlers
/// and workers can increment without coordination.
pub struct Metrics {
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    questions_generated: AtomicU64,
    duplicates_skipped: AtomicU64,
    auto_triggers: AtomicU64,
    manual_triggers: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_enqueued: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            questions_generated: AtomicU64::new(0),
            duplicates_skipped: AtomicU64::new(0),
            auto_triggers: AtomicU64::new(0),
            manual_triggers: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn inc_jobs_enqueued(&self) {
        self.jobs_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_jobs_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_questions_generated(&self) {
        self.questions_generated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_duplicates_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_auto_triggers(&self) {
        self.auto_triggers.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_manual_triggers(&self) {
        self.manual_triggers.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a coherent-enough snapshot of all counters plus uptime.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            questions_generated: self.questions_generated.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            auto_triggers: self.auto_triggers.load(Ordering::Relaxed),
            manual_triggers: self.manual_triggers.load(Ordering::Relaxed),
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

/// Immutable snapshot of metrics for reading.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_enqueued: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub questions_generated: u64,
    pub duplicates_skipped: u64,
    pub auto_triggers: u64,
    pub manual_triggers: u64,
    pub uptime_seconds: f64,
}

impl MetricsSnapshot {
    /// Completed jobs as a percentage of enqueued jobs (0-100).
    pub fn success_rate(&self) -> f64 {
        self.jobs_completed as f64 / self.jobs_enqueued.max(1) as f64 * 100.0
    }

    /// Generation throughput over the process lifetime.
    pub fn questions_per_minute(&self) -> f64 {
        let uptime_minutes = self.uptime_seconds / 60.0;
        self.questions_generated as f64 / uptime_minutes.max(1.0)
    }

    /// Share of generator output that collided with existing content (0-100).
    pub fn duplicate_ratio(&self) -> f64 {
        let attempts = self.questions_generated + self.duplicates_skipped;
        if attempts == 0 {
            return 0.0;
        }
        self.duplicates_skipped as f64 / attempts as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let metrics = Metrics::new();
        metrics.inc_jobs_enqueued();
        metrics.inc_jobs_enqueued();
        metrics.inc_jobs_completed();
        metrics.inc_questions_generated();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.jobs_enqueued, 2);
        assert_eq!(snapshot.jobs_completed, 1);
        assert_eq!(snapshot.questions_generated, 1);
        assert_eq!(snapshot.jobs_failed, 0);
    }

    #[test]
    fn test_success_rate_guards_division() {
        let metrics = Metrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.success_rate(), 0.0);

        metrics.inc_jobs_enqueued();
        metrics.inc_jobs_completed();
        assert_eq!(metrics.snapshot().success_rate(), 100.0);
    }

    #[test]
    fn test_duplicate_ratio() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().duplicate_ratio(), 0.0);

        metrics.inc_questions_generated();
        metrics.inc_duplicates_skipped();
        assert_eq!(metrics.snapshot().duplicate_ratio(), 50.0);

        metrics.inc_duplicates_skipped();
        metrics.inc_duplicates_skipped();
        assert_eq!(metrics.snapshot().duplicate_ratio(), 75.0);
    }
}
