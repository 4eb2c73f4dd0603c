//! # Controller Metrics
//!
//! Reconciliation counters, durations and requeues.

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry};
use std::sync::LazyLock;

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chaos_controller_reconciliations_total",
            "Total number of reconciliation passes by experiment kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chaos_controller_reconciliation_errors_total",
            "Total number of failed reconciliation passes by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "chaos_controller_reconciliation_duration_seconds",
            "Duration of reconciliation passes in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "chaos_controller_requeues_total",
            "Total number of requeues by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static TRACKED_TARGETS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "chaos_controller_tracked_targets",
            "Targets currently tracked for recovery, per experiment",
        ),
        &["kind", "namespace", "name"],
    )
    .expect("Failed to create TRACKED_TARGETS metric - this should never happen")
});

pub(super) fn register(registry: &Registry) -> prometheus::Result<()> {
    registry.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    registry.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    registry.register(Box::new(REQUEUES_TOTAL.clone()))?;
    registry.register(Box::new(TRACKED_TARGETS.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}

pub fn set_tracked_targets(kind: &str, namespace: &str, name: &str, count: usize) {
    TRACKED_TARGETS
        .with_label_values(&[kind, namespace, name])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

/// Drop the series of an experiment that is gone
pub fn remove_tracked_targets(kind: &str, namespace: &str, name: &str) {
    // Missing series is fine: the object may never have tracked anything
    let _ = TRACKED_TARGETS.remove_label_values(&[kind, namespace, name]);
}
