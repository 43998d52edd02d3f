//! Telemetry for the question supply engine.
//!
//! In-memory counters plus threshold-based alerting. All counters are
//! monotonic atomics; readers take immutable snapshots. There is no global
//! instance - the server owns one `Metrics` and threads it through.

pub mod alerts;
pub mod metrics;

pub use alerts::{Alert, AlertLevel, AlertThresholds, SystemSample};
pub use metrics::{Metrics, MetricsSnapshot};

use serde::Serialize;

/// Aggregate status used by alerting and the detailed health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Healthy,
    Warning,
    Unhealthy,
}

impl SystemStatus {
    /// Combine two statuses, keeping the worse one.
    pub fn worst(self, other: SystemStatus) -> SystemStatus {
        use SystemStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Warning, _) | (_, Warning) => Warning,
            _ => Healthy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Healthy => "healthy",
            SystemStatus::Warning => "warning",
            SystemStatus::Unhealthy => "unhealthy",
        }
    }
}
