//! # Error Policy
//!
//! Requeue cadence for failed reconciliation passes. This is the only retry
//! loop: a pass itself never retries, it fails and is requeued here.

use crate::constants;
use crate::controller::backoff::BackoffState;
use crate::controller::reconciler::{backoff_key, Reconciler, ReconcilerError};
use crate::observability;
use kube::{Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Minimum error backoff (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 30;
/// Maximum error backoff (seconds)
pub const ERROR_BACKOFF_MAX_SECS: u64 = 600;

/// Requeue a failed pass with per-resource Fibonacci backoff
///
/// Backoff state is keyed per experiment so one failing experiment never
/// slows down another. A successful pass drops the state.
pub fn error_policy<K>(obj: Arc<K>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&()).to_string();
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind,
        resource.name = %name,
        resource.namespace = %namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    observability::metrics::increment_reconciliation_errors(error.reason());

    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(backoff_key(&kind, &namespace, &name))
                .or_insert_with(|| {
                    BackoffState::new(ERROR_BACKOFF_MIN_SECS, ERROR_BACKOFF_MAX_SECS)
                });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!(
                "Failed to lock backoff_states: {}, using default backoff",
                e
            );
            (constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS, 0)
        }
    };

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or(i64::MAX));
    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: error-backoff)",
        backoff_seconds, error_count
    );
    info!(
        "Next retry scheduled: {} (in {}s, trigger source: error-backoff)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(std::time::Duration::from_secs(backoff_seconds))
}
