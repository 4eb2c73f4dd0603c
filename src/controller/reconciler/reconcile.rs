//! # Reconciliation Pass
//!
//! One pass drives an experiment through its lifecycle:
//!
//! ```text
//! Selecting -> Applying -> Applied                 (active)
//! Applying | Applied -> Recovering -> Recovered    (deleted or paused)
//! ```
//!
//! A failed apply leaves the experiment in `Applying` with its target keys
//! persisted, so the next pass retries the same targets. Retry cadence comes
//! from the watch loop's error policy; a pass never loops internally.

use crate::controller::endpoint::{Endpoint, ReconcileRequest};
use crate::controller::error::ChaosError;
use crate::controller::events::{actions, reasons};
use crate::controller::finalizer::tracked_keys;
use crate::controller::reconciler::types::{backoff_key, Reconciler, ReconcilerError};
use crate::crd::{condition_types, ChaosPhase, ChaosStatus, Experiment};
use crate::observability::metrics;
use kube::runtime::events::EventType;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

/// Description recorded when no pod matched any selector
pub const NO_TARGETS_SELECTED: &str = "no targets selected";

/// Watch-loop entry point for every experiment kind
///
/// # Errors
///
/// Returns the pass failure; the error policy decides when to retry.
pub async fn reconcile<K>(obj: Arc<K>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError>
where
    K: Clone + Into<Experiment>,
{
    let experiment: Experiment = obj.as_ref().clone().into();
    let span = tracing::info_span!(
        "controller.reconcile",
        resource.kind = %experiment.kind(),
        resource.namespace = experiment.namespace(),
        resource.name = experiment.name(),
    );
    ctx.reconcile_experiment(experiment).instrument(span).await
}

impl Reconciler {
    /// Run one reconciliation pass for `experiment`
    ///
    /// # Errors
    ///
    /// Returns selection, dispatch, recovery and status-write failures.
    pub async fn reconcile_experiment(
        &self,
        mut experiment: Experiment,
    ) -> Result<Action, ReconcilerError> {
        let start = Instant::now();
        let request = ReconcileRequest::of(&experiment);
        metrics::increment_reconciliations(request.kind.as_str());

        let result = self.run_pass(&request, &mut experiment).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        let tracked = tracked_keys(&experiment).len();
        if result.is_ok() && experiment.is_deleting() && tracked == 0 {
            metrics::remove_tracked_targets(
                request.kind.as_str(),
                &request.namespace,
                &request.name,
            );
        } else {
            metrics::set_tracked_targets(
                request.kind.as_str(),
                &request.namespace,
                &request.name,
                tracked,
            );
        }
        if result.is_ok() {
            self.reset_backoff(&backoff_key(
                request.kind.as_str(),
                &request.namespace,
                &request.name,
            ));
        }
        result
    }

    async fn run_pass(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
    ) -> Result<Action, ReconcilerError> {
        let binding = self.registry.lookup(experiment)?;
        let endpoint = binding.endpoint(Arc::clone(&self.endpoint_ctx));

        if experiment.is_deleting() || experiment.is_paused() {
            return self.recover(request, endpoint.as_ref(), experiment).await;
        }

        match ChaosStatus::current_phase(experiment.status()) {
            ChaosPhase::Applied => {
                debug!("{} already applied", request);
                Ok(Action::await_change())
            }
            _ => self.select_and_apply(request, endpoint.as_ref(), experiment).await,
        }
    }

    async fn select_and_apply(
        &self,
        request: &ReconcileRequest,
        endpoint: &dyn Endpoint,
        experiment: &mut Experiment,
    ) -> Result<Action, ReconcilerError> {
        let selectors = endpoint.selectors(experiment)?;

        let mut groups = Vec::with_capacity(selectors.len());
        for selector in &selectors {
            match self.lister.select_targets(selector).await {
                Ok(group) => groups.push(group),
                Err(e) => {
                    warn!("Target selection failed for {}: {}", request, e);
                    self.update_status(experiment, |status| {
                        status.failed_message = Some(e.to_string());
                        status.set_condition(
                            condition_types::SELECTED,
                            false,
                            e.reason(),
                            Some(e.to_string()),
                        );
                    })
                    .await?;
                    return Err(e.into());
                }
            }
        }

        let total: usize = groups.iter().map(|group| group.pods.len()).sum();
        if total == 0 {
            info!("No targets selected for {}", request);
            self.update_status(experiment, |status| {
                status.description = Some(NO_TARGETS_SELECTED.to_string());
                status.set_condition(condition_types::SELECTED, false, "NoTargets", None);
                clear_paused(status);
            })
            .await?;
            let delay = self.config.no_targets_requeue();
            info!(
                "Requeueing {} in {}s (trigger source: no-targets)",
                request,
                delay.as_secs()
            );
            metrics::increment_requeues_total("no-targets");
            return Ok(Action::requeue(delay));
        }

        self.update_status(experiment, |status| {
            status.phase = Some(ChaosPhase::Applying);
            status.description = Some(format!("injecting into {total} target(s)"));
            status.set_condition(
                condition_types::SELECTED,
                true,
                "TargetsSelected",
                Some(format!("{total} target(s) in {} group(s)", groups.len())),
            );
            clear_paused(status);
        })
        .await?;

        match endpoint.apply(request, experiment, groups).await {
            Ok(()) => {
                info!("Fault applied for {} to {} target(s)", request, total);
                self.update_status(experiment, |status| {
                    status.phase = Some(ChaosPhase::Applied);
                    status.description = Some(format!("fault injected into {total} target(s)"));
                    status.failed_message = None;
                    status.set_condition(condition_types::ALL_INJECTED, true, "Injected", None);
                })
                .await?;
                self.events
                    .publish(
                        &experiment.object_ref(),
                        EventType::Normal,
                        reasons::APPLIED_SUCCESSFULLY,
                        actions::APPLY,
                        Some(format!("Injected into {total} target(s)")),
                    )
                    .await;
                Ok(Action::await_change())
            }
            Err(e) => {
                warn!("Apply failed for {}: {}", request, e);
                self.record_failure(
                    experiment,
                    &e,
                    condition_types::ALL_INJECTED,
                    reasons::APPLY_FAILED,
                    actions::APPLY,
                )
                .await?;
                Err(e.into())
            }
        }
    }

    async fn recover(
        &self,
        request: &ReconcileRequest,
        endpoint: &dyn Endpoint,
        experiment: &mut Experiment,
    ) -> Result<Action, ReconcilerError> {
        let paused = experiment.is_paused();
        let phase = ChaosStatus::current_phase(experiment.status());

        if tracked_keys(experiment).is_empty()
            && matches!(phase, ChaosPhase::NotInjected | ChaosPhase::Recovered)
        {
            debug!("Nothing to recover for {}", request);
            self.update_status(experiment, |status| {
                status.set_condition(
                    condition_types::PAUSED,
                    paused,
                    if paused { "Paused" } else { "Deleting" },
                    None,
                );
            })
            .await?;
            return Ok(Action::await_change());
        }

        info!(
            "Recovering {} ({})",
            request,
            if paused { "paused" } else { "deleting" }
        );
        self.update_status(experiment, |status| {
            status.phase = Some(ChaosPhase::Recovering);
            status.description = Some("recovering tracked targets".to_string());
        })
        .await?;

        match endpoint.recover(request, experiment).await {
            Ok(()) => {
                info!("Recovered every target of {}", request);
                self.update_status(experiment, |status| {
                    status.phase = Some(ChaosPhase::Recovered);
                    status.description = Some("all targets recovered".to_string());
                    status.failed_message = None;
                    status.set_condition(condition_types::ALL_RECOVERED, true, "Recovered", None);
                    status.set_condition(
                        condition_types::PAUSED,
                        paused,
                        if paused { "Paused" } else { "Deleting" },
                        None,
                    );
                })
                .await?;
                self.events
                    .publish(
                        &experiment.object_ref(),
                        EventType::Normal,
                        reasons::CHAOS_RECOVERED,
                        actions::RECOVER,
                        None,
                    )
                    .await;
                Ok(Action::await_change())
            }
            Err(e) => {
                warn!("Recovery failed for {}: {}", request, e);
                self.record_failure(
                    experiment,
                    &e,
                    condition_types::ALL_RECOVERED,
                    reasons::RECOVERY_FAILED,
                    actions::RECOVER,
                )
                .await?;
                Err(e.into())
            }
        }
    }

    /// Surface a failed apply or recovery on the object and as an event
    async fn record_failure(
        &self,
        experiment: &mut Experiment,
        error: &ChaosError,
        condition: &str,
        reason: &str,
        action: &str,
    ) -> Result<(), ReconcilerError> {
        let message = error.to_string();
        self.update_status(experiment, |status| {
            status.failed_message = Some(message.clone());
            status.set_condition(condition, false, error.reason(), Some(message.clone()));
        })
        .await?;
        self.events
            .publish(
                &experiment.object_ref(),
                EventType::Warning,
                reason,
                action,
                Some(message),
            )
            .await;
        Ok(())
    }
}

/// Drop a stale `Paused=True` once the experiment is active again
fn clear_paused(status: &mut ChaosStatus) {
    if status
        .condition(condition_types::PAUSED)
        .is_some_and(|c| c.status == "True")
    {
        status.set_condition(condition_types::PAUSED, false, "Resumed", None);
    }
}
