//! # Controller
//!
//! Reconciliation core: target selection, finalizer tracking, per-kind
//! endpoints, concurrent dispatch and the reconciler state machine, plus the
//! events, backoff and HTTP server around them.

pub mod backoff;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod finalizer;
pub mod reconciler;
pub mod registry;
pub mod selector;
pub mod server;
