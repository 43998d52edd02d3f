//! Threshold-based alerting over live metrics.
//!
//! Thresholds are configuration with documented defaults; evaluation is a
//! pure function over a `SystemSample` so it can run from the alerts
//! endpoint, the health probe, and tests without touching shared state.

use serde::Serialize;

use crate::metrics::MetricsSnapshot;
use crate::SystemStatus;

/// Success-rate alerts only fire once enough jobs have finished to make
/// the percentage meaningful.
const MIN_COMPLETIONS_FOR_RATE_ALERT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Critical,
}

/// A single fired alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub message: String,
    pub value: f64,
    pub threshold: f64,
}

/// Everything alert evaluation needs, gathered by the caller.
#[derive(Debug, Clone)]
pub struct SystemSample {
    pub metrics: MetricsSnapshot,
    pub active_jobs: usize,
    pub push_streams: usize,
}

/// Alert thresholds (defaults per operations runbook).
#[derive(Debug, Clone)]
pub struct AlertThresholds {
    pub max_active_jobs: usize,
    pub min_success_rate: f64,
    pub max_duplicate_ratio: f64,
    pub max_push_streams: usize,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_active_jobs: 15,
            min_success_rate: 80.0,
            max_duplicate_ratio: 50.0,
            max_push_streams: 100,
        }
    }
}

impl AlertThresholds {
    /// Evaluate all thresholds against a sample.
    pub fn check(&self, sample: &SystemSample) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if sample.active_jobs > self.max_active_jobs {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                kind: "high_active_jobs",
                message: format!(
                    "High number of active jobs: {} (threshold: {})",
                    sample.active_jobs, self.max_active_jobs
                ),
                value: sample.active_jobs as f64,
                threshold: self.max_active_jobs as f64,
            });
        }

        let success_rate = sample.metrics.success_rate();
        if success_rate < self.min_success_rate
            && sample.metrics.jobs_completed > MIN_COMPLETIONS_FOR_RATE_ALERT
        {
            alerts.push(Alert {
                level: AlertLevel::Critical,
                kind: "low_success_rate",
                message: format!(
                    "Low success rate: {:.1}% (threshold: {}%)",
                    success_rate, self.min_success_rate
                ),
                value: success_rate,
                threshold: self.min_success_rate,
            });
        }

        if sample.metrics.questions_generated > 0 {
            let duplicate_ratio = sample.metrics.duplicate_ratio();
            if duplicate_ratio > self.max_duplicate_ratio {
                alerts.push(Alert {
                    level: AlertLevel::Warning,
                    kind: "high_duplicate_ratio",
                    message: format!(
                        "High duplicate ratio: {:.1}% (threshold: {}%)",
                        duplicate_ratio, self.max_duplicate_ratio
                    ),
                    value: duplicate_ratio,
                    threshold: self.max_duplicate_ratio,
                });
            }
        }

        if sample.push_streams > self.max_push_streams {
            alerts.push(Alert {
                level: AlertLevel::Warning,
                kind: "high_push_streams",
                message: format!(
                    "High number of push streams: {} (threshold: {})",
                    sample.push_streams, self.max_push_streams
                ),
                value: sample.push_streams as f64,
                threshold: self.max_push_streams as f64,
            });
        }

        alerts
    }
}

/// Overall status implied by a set of fired alerts.
pub fn status_from_alerts(alerts: &[Alert]) -> SystemStatus {
    if alerts.iter().any(|a| a.level == AlertLevel::Critical) {
        SystemStatus::Unhealthy
    } else if !alerts.is_empty() {
        SystemStatus::Warning
    } else {
        SystemStatus::Healthy
    }
}
