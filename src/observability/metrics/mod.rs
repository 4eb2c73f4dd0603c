//! # Metrics
//!
//! Prometheus metrics exposed on `/metrics`.
//!
//! Metrics are `LazyLock` statics registered once in [`register_metrics`].
//! Call sites use the free functions re-exported here.

mod controller_metrics;
mod injection_metrics;
pub mod registry;

pub use controller_metrics::{
    increment_reconciliation_errors, increment_reconciliations, increment_requeues_total,
    observe_reconciliation_duration, remove_tracked_targets, set_tracked_targets,
};
pub use injection_metrics::{
    increment_injections, increment_recoveries, observe_injection_batch_duration,
};
pub use registry::{gather, register_metrics};
