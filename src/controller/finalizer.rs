//! # Finalizer Tracker
//!
//! Records which targets may carry an injected fault, as finalizer keys on the
//! experiment object itself.
//!
//! A key is written before the fault is dispatched and removed only after its
//! recovery succeeded, so the object cannot be deleted while any target may
//! still be faulted. Writes are conditional on `resourceVersion`; a conflict
//! re-reads the object and re-applies the delta.

use crate::controller::error::ChaosError;
use crate::crd::Experiment;
use crate::store::{ExperimentStore, StoreError};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// DNS-1123 label; rules out domain-prefixed finalizers such as `example.com/x`
static NAMESPACE_LABEL: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]{0,61}[a-z0-9])?$").ok());

/// Identity of one target inside cluster scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub namespace: String,
    pub name: String,
}

impl TargetKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of(pod: &Pod) -> Self {
        Self::new(pod.namespace().unwrap_or_default(), pod.name_any())
    }

    /// Parse a finalizer into a target key; `None` for finalizers owned by others
    pub fn parse(finalizer: &str) -> Option<Self> {
        let (namespace, name) = finalizer.split_once('/')?;
        if name.is_empty() || name.contains('/') {
            return None;
        }
        let is_label = NAMESPACE_LABEL
            .as_ref()
            .is_some_and(|re| re.is_match(namespace));
        is_label.then(|| Self::new(namespace, name))
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Finalizer key of a pod
pub fn finalizer_key(pod: &Pod) -> String {
    TargetKey::of(pod).to_string()
}

/// Target keys currently tracked on the experiment
pub fn tracked_keys(experiment: &Experiment) -> Vec<TargetKey> {
    experiment
        .finalizers()
        .iter()
        .filter_map(|f| TargetKey::parse(f))
        .collect()
}

/// Union of `existing` and `keys`, `None` when nothing would change
fn with_keys(existing: &[String], keys: &[String]) -> Option<Vec<String>> {
    let mut merged = existing.to_vec();
    for key in keys {
        if !merged.contains(key) {
            merged.push(key.clone());
        }
    }
    (merged.len() != existing.len()).then_some(merged)
}

/// `existing` minus `keys`, `None` when nothing would change
fn without_keys(existing: &[String], keys: &[String]) -> Option<Vec<String>> {
    let remaining: Vec<String> = existing
        .iter()
        .filter(|f| !keys.contains(f))
        .cloned()
        .collect();
    (remaining.len() != existing.len()).then_some(remaining)
}

/// Adds and removes finalizer keys with optimistic concurrency
#[derive(Clone)]
pub struct FinalizerTracker {
    store: Arc<dyn ExperimentStore>,
    max_conflict_retries: u32,
}

impl fmt::Debug for FinalizerTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizerTracker")
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl FinalizerTracker {
    pub fn new(store: Arc<dyn ExperimentStore>, max_conflict_retries: u32) -> Self {
        Self {
            store,
            max_conflict_retries,
        }
    }

    /// Persist `keys` on the experiment in a single conditional write
    ///
    /// On success `experiment` holds the stored object.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails or conflicts more often than allowed.
    pub async fn track(&self, experiment: &mut Experiment, keys: &[String]) -> Result<(), ChaosError> {
        self.update(experiment, |existing| with_keys(existing, keys))
            .await
    }

    /// Remove recovered `keys` in a single conditional write
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails or conflicts more often than allowed.
    pub async fn release(&self, experiment: &mut Experiment, keys: &[String]) -> Result<(), ChaosError> {
        self.update(experiment, |existing| without_keys(existing, keys))
            .await
    }

    async fn update<F>(&self, experiment: &mut Experiment, delta: F) -> Result<(), ChaosError>
    where
        F: Fn(&[String]) -> Option<Vec<String>> + Send + Sync,
    {
        let mut attempt = 0;
        loop {
            let Some(finalizers) = delta(experiment.finalizers()) else {
                debug!("Finalizers of {} already up to date", experiment.key());
                return Ok(());
            };

            let mut desired = experiment.clone();
            desired.set_finalizers(finalizers);

            match self.store.replace(&desired).await {
                Ok(stored) => {
                    *experiment = stored;
                    return Ok(());
                }
                Err(err) if err.is_conflict() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        "Conflict updating finalizers of {} (attempt {}/{}), re-reading",
                        experiment.key(),
                        attempt,
                        self.max_conflict_retries
                    );
                    *experiment = self
                        .store
                        .get(experiment.kind(), experiment.namespace(), experiment.name())
                        .await?
                        .ok_or_else(|| StoreError::NotFound {
                            kind: experiment.kind().to_string(),
                            key: experiment.key(),
                        })?;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
