//! # Injection Metrics
//!
//! Per-target injection and recovery outcomes.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

static INJECTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chaos_controller_injections_total",
            "Per-target injections by experiment kind and outcome (success, failure, cancelled)",
        ),
        &["kind", "outcome"],
    )
    .expect("Failed to create INJECTIONS_TOTAL metric - this should never happen")
});

static RECOVERIES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chaos_controller_recoveries_total",
            "Per-target recoveries by experiment kind and outcome (success, failure, gone)",
        ),
        &["kind", "outcome"],
    )
    .expect("Failed to create RECOVERIES_TOTAL metric - this should never happen")
});

static INJECTION_BATCH_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "chaos_controller_injection_batch_duration_seconds",
            "Duration of concurrent injection batches in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 15.0, 60.0]),
        &["kind"],
    )
    .expect("Failed to create INJECTION_BATCH_DURATION metric - this should never happen")
});

pub(super) fn register(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(INJECTIONS_TOTAL.clone()))?;
    registry.register(Box::new(RECOVERIES_TOTAL.clone()))?;
    registry.register(Box::new(INJECTION_BATCH_DURATION.clone()))?;
    Ok(())
}

pub fn increment_injections(kind: &str, outcome: &str) {
    INJECTIONS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn increment_recoveries(kind: &str, outcome: &str) {
    RECOVERIES_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn observe_injection_batch_duration(kind: &str, duration: f64) {
    INJECTION_BATCH_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_injections() {
        let before = INJECTIONS_TOTAL
            .with_label_values(&["NetworkChaos", "failure"])
            .get();
        increment_injections("NetworkChaos", "failure");
        let after = INJECTIONS_TOTAL
            .with_label_values(&["NetworkChaos", "failure"])
            .get();
        assert_eq!(after, before + 1u64);
    }

    #[test]
    fn test_observe_injection_batch_duration() {
        observe_injection_batch_duration("PodChaos", 0.3);
        // Just verify it doesn't panic
    }
}
