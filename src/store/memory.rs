//! # In-Memory Store
//!
//! Implements [`TargetStore`] and [`ExperimentStore`] over process memory.
//!
//! Writes bump `resourceVersion` and `replace` is conditional on it, so
//! optimistic-concurrency behavior matches the API server. Failure knobs let
//! callers force conflicts and outages.

use super::{ExperimentStore, StoreError, TargetStore};
use crate::crd::{ChaosStatus, Experiment, ExperimentKind, PodSelectorSpec};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String);

#[derive(Default)]
struct State {
    pods: BTreeMap<ObjectKey, Pod>,
    services: BTreeMap<ObjectKey, Service>,
    experiments: BTreeMap<(ExperimentKind, String, String), Experiment>,
    deleted_pods: Vec<String>,
    next_version: u64,
    pending_conflicts: usize,
    unavailable: bool,
    replace_count: usize,
    status_patch_count: usize,
}

impl State {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

/// Process-local resource store
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl std::fmt::Debug for InMemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryStore")
            .field("pods", &state.pods.len())
            .field("services", &state.services.len())
            .field("experiments", &state.experiments.len())
            .finish()
    }
}

fn pod_key(pod: &Pod) -> ObjectKey {
    (pod.namespace().unwrap_or_default(), pod.name_any())
}

fn experiment_key(experiment: &Experiment) -> (ExperimentKind, String, String) {
    (
        experiment.kind(),
        experiment.namespace().to_string(),
        experiment.name().to_string(),
    )
}

/// Field selectors supported by the API server for pods
fn pod_field(pod: &Pod, field: &str) -> Option<String> {
    match field {
        "metadata.name" => pod.metadata.name.clone(),
        "metadata.namespace" => pod.metadata.namespace.clone(),
        "spec.nodeName" => pod.spec.as_ref().and_then(|s| s.node_name.clone()),
        "status.phase" => pod.status.as_ref().and_then(|s| s.phase.clone()),
        "status.podIP" => pod.status.as_ref().and_then(|s| s.pod_ip.clone()),
        _ => None,
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_pod(&self, mut pod: Pod) {
        let mut state = self.lock();
        pod.metadata.resource_version = Some(state.bump_version());
        state.pods.insert(pod_key(&pod), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.lock()
            .pods
            .remove(&(namespace.to_string(), name.to_string()))
    }

    pub fn insert_service(&self, service: Service) {
        let key = (service.namespace().unwrap_or_default(), service.name_any());
        self.lock().services.insert(key, service);
    }

    /// Store an experiment as-is (creation), assigning a fresh resourceVersion
    pub fn insert_experiment(&self, experiment: impl Into<Experiment>) -> Experiment {
        let mut experiment = experiment.into();
        let mut state = self.lock();
        experiment.meta_mut().resource_version = Some(state.bump_version());
        if experiment.meta().uid.is_none() {
            experiment.meta_mut().uid = Some(format!("uid-{}", state.next_version));
        }
        if experiment.meta().generation.is_none() {
            experiment.meta_mut().generation = Some(1);
        }
        state
            .experiments
            .insert(experiment_key(&experiment), experiment.clone());
        experiment
    }

    /// Snapshot of the stored experiment
    pub fn experiment(&self, kind: ExperimentKind, namespace: &str, name: &str) -> Option<Experiment> {
        self.lock()
            .experiments
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Request deletion; the object stays until its finalizers are empty
    pub fn mark_deleting(&self, kind: ExperimentKind, namespace: &str, name: &str) -> Option<Experiment> {
        let mut state = self.lock();
        let version = state.bump_version();
        let key = (kind, namespace.to_string(), name.to_string());
        let experiment = state.experiments.get_mut(&key)?;
        // Parsed from RFC3339 so the timestamp type stays opaque here
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        experiment.meta_mut().deletion_timestamp =
            serde_json::from_value(serde_json::Value::String(now)).ok();
        experiment.meta_mut().resource_version = Some(version);
        let snapshot = experiment.clone();
        if snapshot.finalizers().is_empty() {
            state.experiments.remove(&key);
        }
        Some(snapshot)
    }

    /// Mutate a stored experiment out of band, as another writer would
    pub fn update_experiment<F>(&self, kind: ExperimentKind, namespace: &str, name: &str, f: F)
    where
        F: FnOnce(&mut Experiment),
    {
        let mut state = self.lock();
        let version = state.bump_version();
        if let Some(experiment) = state
            .experiments
            .get_mut(&(kind, namespace.to_string(), name.to_string()))
        {
            f(experiment);
            experiment.meta_mut().resource_version = Some(version);
        }
    }

    /// Fail the next `n` replace calls with a conflict
    pub fn conflict_next_replaces(&self, n: usize) {
        self.lock().pending_conflicts = n;
    }

    /// Make every request fail with [`StoreError::Unavailable`]
    pub fn fail_requests(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Replace calls that reached the store, including conflicting ones
    pub fn replace_count(&self) -> usize {
        self.lock().replace_count
    }

    pub fn status_patch_count(&self) -> usize {
        self.lock().status_patch_count
    }

    /// `namespace/name` of every pod deleted through the store
    pub fn deleted_pods(&self) -> Vec<String> {
        self.lock().deleted_pods.clone()
    }
}

#[async_trait]
impl TargetStore for InMemoryStore {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: &PodSelectorSpec,
    ) -> Result<Vec<Pod>, StoreError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .pods
            .iter()
            .filter(|((ns, _), _)| namespace.map_or(true, |wanted| wanted == ns))
            .filter(|(_, pod)| selector.matches_labels(pod.labels()))
            .filter(|(_, pod)| {
                selector
                    .field_selectors
                    .iter()
                    .all(|(field, value)| pod_field(pod, field).as_deref() == Some(value.as_str()))
            })
            .map(|(_, pod)| pod.clone())
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        _grace_period_secs: i64,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.check_available()?;
        if state
            .pods
            .remove(&(namespace.to_string(), name.to_string()))
            .is_some()
        {
            state.deleted_pods.push(format!("{namespace}/{name}"));
        }
        Ok(())
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, StoreError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .services
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}

#[async_trait]
impl ExperimentStore for InMemoryStore {
    async fn get(
        &self,
        kind: ExperimentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Experiment>, StoreError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .experiments
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn replace(&self, experiment: &Experiment) -> Result<Experiment, StoreError> {
        let mut state = self.lock();
        state.check_available()?;
        state.replace_count += 1;

        let key = experiment_key(experiment);
        let conflict = || StoreError::Conflict {
            kind: experiment.kind().to_string(),
            key: experiment.key(),
        };
        if state.pending_conflicts > 0 {
            state.pending_conflicts -= 1;
            return Err(conflict());
        }

        let stored = state.experiments.get(&key).ok_or_else(|| StoreError::NotFound {
            kind: experiment.kind().to_string(),
            key: experiment.key(),
        })?;
        if stored.resource_version() != experiment.resource_version() {
            return Err(conflict());
        }

        let mut updated = experiment.clone();
        // Status is only writable through the status subresource
        *updated.status_mut() = stored.status().cloned();
        updated.meta_mut().deletion_timestamp = stored.meta().deletion_timestamp.clone();
        updated.meta_mut().resource_version = Some(state.bump_version());

        if updated.is_deleting() && updated.finalizers().is_empty() {
            state.experiments.remove(&key);
        } else {
            state.experiments.insert(key, updated.clone());
        }
        Ok(updated)
    }

    async fn patch_status(
        &self,
        experiment: &Experiment,
        status: &ChaosStatus,
    ) -> Result<Experiment, StoreError> {
        let mut state = self.lock();
        state.check_available()?;
        state.status_patch_count += 1;

        let version = state.bump_version();
        let stored = state
            .experiments
            .get_mut(&experiment_key(experiment))
            .ok_or_else(|| StoreError::NotFound {
                kind: experiment.kind().to_string(),
                key: experiment.key(),
            })?;
        *stored.status_mut() = Some(status.clone());
        stored.meta_mut().resource_version = Some(version);
        Ok(stored.clone())
    }
}
