//! # Observability
//!
//! Prometheus metrics for reconciliation, injection and recovery.

pub mod metrics;
