//! # Concurrent Dispatch
//!
//! Fans a per-target operation out over a batch of pods.
//!
//! Apply protocol:
//! 1. One conditional write adds a finalizer key for every pod in the batch.
//! 2. One unit per pod runs with bounded concurrency under a batch token, a
//!    child of the controller's shutdown token. The first failure, the batch
//!    deadline or shutdown cancels it; units that have not started yet report
//!    `Cancelled`, units already running finish.
//! 3. The batch succeeds only if every unit succeeded. Keys stay in place
//!    either way, so recovery later covers every target that may be faulted.
//!
//! Recovery runs over the keys tracked on the experiment and removes only
//! the keys whose recovery succeeded. A pod that no longer exists, or was
//! never scheduled onto a node, has nothing to recover.

use crate::config::ControllerConfig;
use crate::controller::error::ChaosError;
use crate::controller::finalizer::{finalizer_key, tracked_keys, FinalizerTracker, TargetKey};
use crate::crd::Experiment;
use crate::injector::host_ip;
use crate::observability::metrics;
use crate::store::TargetStore;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reason string of a unit failure without the batch wrapper
fn unit_reason(err: &ChaosError) -> String {
    match err {
        ChaosError::Injection { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}

/// Drives apply and recovery batches for endpoints
#[derive(Clone)]
pub struct Dispatcher {
    tracker: FinalizerTracker,
    targets: Arc<dyn TargetStore>,
    max_concurrent: usize,
    timeout: Duration,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tracker", &self.tracker)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Batches run under child tokens of `shutdown`, so cancelling it stops
    /// new dispatch in every running batch.
    pub fn new(
        tracker: FinalizerTracker,
        targets: Arc<dyn TargetStore>,
        max_concurrent: usize,
        timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            tracker,
            targets,
            max_concurrent: max_concurrent.max(1),
            timeout,
            shutdown,
        }
    }

    pub fn from_config(
        tracker: FinalizerTracker,
        targets: Arc<dyn TargetStore>,
        config: &ControllerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self::new(
            tracker,
            targets,
            config.max_concurrent_injections,
            config.injection_timeout(),
            shutdown,
        )
    }

    pub fn targets(&self) -> &Arc<dyn TargetStore> {
        &self.targets
    }

    /// Mark every pod, then run `unit` against each one concurrently
    ///
    /// Pods appearing more than once are dispatched once.
    ///
    /// # Errors
    ///
    /// Returns the finalizer write error (nothing dispatched), or
    /// [`ChaosError::Injection`] citing the first failed unit, or
    /// [`ChaosError::Timeout`] when the deadline left units undispatched, or
    /// [`ChaosError::Interrupted`] when shutdown did.
    pub async fn apply_all<F, Fut>(
        &self,
        experiment: &mut Experiment,
        pods: Vec<Pod>,
        unit: F,
    ) -> Result<(), ChaosError>
    where
        F: Fn(Pod) -> Fut,
        Fut: Future<Output = Result<(), ChaosError>>,
    {
        let mut seen = HashSet::new();
        let pods: Vec<Pod> = pods
            .into_iter()
            .filter(|pod| seen.insert(finalizer_key(pod)))
            .collect();
        let total = pods.len();
        if total == 0 {
            return Ok(());
        }

        let keys: Vec<String> = pods.iter().map(finalizer_key).collect();
        self.tracker.track(experiment, &keys).await?;
        debug!(
            "Tracked {} target(s) on {} before dispatch",
            total,
            experiment.key()
        );

        let kind = experiment.kind().as_str();
        let batch = self.shutdown.child_token();
        let started = Instant::now();

        let units = stream::iter(pods)
            .map(|pod| {
                let batch = &batch;
                let unit = &unit;
                async move {
                    let key = finalizer_key(&pod);
                    if batch.is_cancelled() {
                        debug!("Skipping {}: batch cancelled", key);
                        metrics::increment_injections(kind, "cancelled");
                        return (key, Err(ChaosError::Cancelled));
                    }
                    let result = unit(pod).await;
                    match &result {
                        Ok(()) => metrics::increment_injections(kind, "success"),
                        Err(err) => {
                            batch.cancel();
                            warn!("Injection into {} failed: {}", key, err);
                            metrics::increment_injections(kind, "failure");
                        }
                    }
                    (key, result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect::<Vec<(String, Result<(), ChaosError>)>>();
        tokio::pin!(units);
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        // The deadline only stops new dispatch; in-flight units still finish
        let outcomes = tokio::select! {
            outcomes = &mut units => outcomes,
            () = &mut deadline => {
                warn!(
                    "Injection batch for {} reached its {}s deadline, waiting for in-flight units",
                    experiment.key(),
                    self.timeout.as_secs()
                );
                batch.cancel();
                units.await
            }
        };

        metrics::observe_injection_batch_duration(kind, started.elapsed().as_secs_f64());

        let is_failure = |result: &Result<(), ChaosError>| {
            matches!(result, Err(err) if !matches!(err, ChaosError::Cancelled))
        };
        let failed = outcomes.iter().filter(|(_, r)| is_failure(r)).count();
        let skipped = outcomes
            .iter()
            .filter(|(_, r)| matches!(r, Err(ChaosError::Cancelled)))
            .count();

        // Completion order, so the first failure here is the first one observed
        if let Some((target, Err(err))) = outcomes.into_iter().find(|(_, r)| is_failure(r)) {
            error!(
                "Injection batch for {} failed on {} of {} target(s)",
                experiment.key(),
                failed,
                total
            );
            return Err(ChaosError::Injection {
                target,
                reason: unit_reason(&err),
                failed,
                total,
            });
        }
        if skipped > 0 {
            if self.shutdown.is_cancelled() {
                warn!(
                    "Shutdown interrupted injection batch for {}, {} target(s) not attempted",
                    experiment.key(),
                    skipped
                );
                return Err(ChaosError::Interrupted {
                    pending: skipped,
                    total,
                });
            }
            return Err(ChaosError::Timeout {
                secs: self.timeout.as_secs(),
                pending: skipped,
                total,
            });
        }

        info!("Injected {} target(s) for {}", total, experiment.key());
        Ok(())
    }

    /// Run `unit` against every tracked target still present, then release
    /// the keys that recovered
    ///
    /// # Errors
    ///
    /// Returns the finalizer write error, or [`ChaosError::Recovery`] citing
    /// the first target that failed (its key stays tracked).
    pub async fn recover_tracked<F, Fut>(
        &self,
        experiment: &mut Experiment,
        unit: F,
    ) -> Result<(), ChaosError>
    where
        F: Fn(Pod) -> Fut,
        Fut: Future<Output = Result<(), ChaosError>>,
    {
        let keys = tracked_keys(experiment);
        if keys.is_empty() {
            debug!("No tracked targets on {}", experiment.key());
            return Ok(());
        }

        let kind = experiment.kind().as_str();
        let results: Vec<(TargetKey, Result<(), ChaosError>)> = stream::iter(keys)
            .map(|key| {
                let unit = &unit;
                async move {
                    let result = match self.targets.get_pod(&key.namespace, &key.name).await {
                        Ok(None) => {
                            debug!("Target {} is gone, nothing to recover", key);
                            Ok(())
                        }
                        Ok(Some(pod)) if host_ip(&pod).is_none() => {
                            debug!("Target {} was never scheduled, nothing to recover", key);
                            Ok(())
                        }
                        Ok(Some(pod)) => unit(pod).await.map_err(|e| ChaosError::Recovery {
                            key: key.to_string(),
                            reason: unit_reason(&e),
                        }),
                        Err(e) => Err(ChaosError::Recovery {
                            key: key.to_string(),
                            reason: e.to_string(),
                        }),
                    };
                    match &result {
                        Ok(()) => metrics::increment_recoveries(kind, "success"),
                        Err(_) => metrics::increment_recoveries(kind, "failure"),
                    }
                    (key, result)
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        let mut recovered = Vec::new();
        let mut first_error = None;
        for (key, result) in results {
            match result {
                Ok(()) => recovered.push(key.to_string()),
                Err(err) => {
                    warn!("{}", err);
                    first_error.get_or_insert(err);
                }
            }
        }

        self.tracker.release(experiment, &recovered).await?;
        info!(
            "Recovered {} target(s) for {}",
            recovered.len(),
            experiment.key()
        );

        first_error.map_or(Ok(()), Err)
    }
}
