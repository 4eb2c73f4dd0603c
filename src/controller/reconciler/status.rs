//! # Status Management
//!
//! Writes experiment status through the status subresource.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ChaosStatus, Experiment};
use tracing::debug;

impl Reconciler {
    /// Apply `mutate` to the experiment's status and persist the result
    ///
    /// Stamps `observedGeneration`, and `lastTransitionTime` when the phase
    /// changes. Skips the write when nothing changed so status updates do not
    /// trigger extra watch events. On success `experiment` holds the stored
    /// object, including its new `resourceVersion`.
    ///
    /// # Errors
    ///
    /// Returns an error when the patch fails for any reason other than the
    /// object being gone.
    pub(crate) async fn update_status<F>(
        &self,
        experiment: &mut Experiment,
        mutate: F,
    ) -> Result<(), ReconcilerError>
    where
        F: FnOnce(&mut ChaosStatus),
    {
        let current = experiment.status().cloned().unwrap_or_default();
        let mut next = current.clone();
        mutate(&mut next);
        if next.phase != current.phase {
            next.last_transition_time = Some(chrono::Utc::now().to_rfc3339());
        }
        next.observed_generation = experiment.meta().generation;

        if next == current {
            debug!(
                "Skipping status update for {} - unchanged (phase={:?})",
                experiment.key(),
                next.phase
            );
            return Ok(());
        }

        match self.store.patch_status(experiment, &next).await {
            Ok(updated) => {
                *experiment = updated;
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                debug!(
                    "{} disappeared before its status could be written",
                    experiment.key()
                );
                *experiment.status_mut() = Some(next);
                Ok(())
            }
            Err(source) => Err(ReconcilerError::Status {
                key: experiment.key(),
                source,
            }),
        }
    }
}
