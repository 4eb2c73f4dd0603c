//! # Reconciler
//!
//! Drives one experiment object per pass: looks up the endpoint for its kind,
//! resolves targets, applies or recovers the fault and records the outcome in
//! status and events.

mod reconcile;
mod status;
mod types;

pub use reconcile::{reconcile, NO_TARGETS_SELECTED};
pub use types::{backoff_key, Reconciler, ReconcilerError};
