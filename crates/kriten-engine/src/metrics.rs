//! Metrics for the execution engine.
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `kriten_invocations_total` | Counter | `mode` | Workloads launched (job, cronjob, deployment) |
//! | `kriten_sync_waits_total` | Counter | `outcome` | Synchronous wait outcomes |
//! | `kriten_sync_wait_seconds` | Histogram | `outcome` | Time spent waiting for synchronous jobs |
//! | `kriten_result_extractions_total` | Counter | `outcome` | Embedded result extraction outcomes |
//! | `kriten_validation_rejections_total` | Counter | - | Invocations rejected by schema validation |
//!
//! Metrics go through the `metrics` facade; without an installed recorder
//! every call is a no-op.

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: workloads launched.
    pub const INVOCATIONS_TOTAL: &str = "kriten_invocations_total";
    /// Counter: synchronous wait outcomes.
    pub const SYNC_WAITS_TOTAL: &str = "kriten_sync_waits_total";
    /// Histogram: synchronous wait duration in seconds.
    pub const SYNC_WAIT_SECONDS: &str = "kriten_sync_wait_seconds";
    /// Counter: result extraction outcomes.
    pub const RESULT_EXTRACTIONS_TOTAL: &str = "kriten_result_extractions_total";
    /// Counter: schema validation rejections.
    pub const VALIDATION_REJECTIONS_TOTAL: &str = "kriten_validation_rejections_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Workload kind (job, cronjob, deployment).
    pub const MODE: &str = "mode";
    /// Outcome of the measured operation.
    pub const OUTCOME: &str = "outcome";
}

/// Records engine metrics with consistent labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineMetrics;

impl EngineMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Records a launched workload.
    pub fn record_invocation(self, mode: &'static str) {
        counter!(names::INVOCATIONS_TOTAL, labels::MODE => mode).increment(1);
    }

    /// Records how a synchronous wait ended and how long it took.
    pub fn record_sync_wait(self, outcome: &'static str, waited: Duration) {
        counter!(names::SYNC_WAITS_TOTAL, labels::OUTCOME => outcome).increment(1);
        histogram!(names::SYNC_WAIT_SECONDS, labels::OUTCOME => outcome)
            .record(waited.as_secs_f64());
    }

    /// Records a result extraction outcome.
    pub fn record_extraction(self, outcome: &'static str) {
        counter!(names::RESULT_EXTRACTIONS_TOTAL, labels::OUTCOME => outcome).increment(1);
    }

    /// Records an input rejected by schema validation.
    pub fn record_validation_rejection(self) {
        counter!(names::VALIDATION_REJECTIONS_TOTAL).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        let metrics = EngineMetrics::new();
        metrics.record_invocation("job");
        metrics.record_sync_wait("completed", Duration::from_millis(250));
        metrics.record_extraction("parsed");
        metrics.record_validation_rejection();
    }
}
