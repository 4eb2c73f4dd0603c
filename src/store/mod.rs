//! # Resource Store
//!
//! Contracts for the external resource store the controller reads targets
//! from and persists experiment state to.
//!
//! - [`TargetStore`] - pods and services; the controller never owns these
//! - [`ExperimentStore`] - experiment objects, with conditional writes
//!
//! [`KubeTargetStore`]/[`KubeExperimentStore`] talk to the Kubernetes API.
//! [`InMemoryStore`] implements both contracts without a cluster.

mod kube;
mod memory;

pub use self::kube::{KubeExperimentStore, KubeTargetStore};
pub use memory::InMemoryStore;

use crate::crd::{ChaosStatus, Experiment, ExperimentKind, PodSelectorSpec};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use thiserror::Error;

/// Store failures
///
/// `Conflict` is not fatal: callers re-read and retry their mutation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} was modified concurrently (stale resourceVersion)")]
    Conflict { kind: String, key: String },
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },
    #[error("store request failed: {0}")]
    Api(#[from] ::kube::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Read access to candidate targets and auxiliary resources
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// List pods matching the label, expression and field constraints of
    /// `selector`, in `namespace` or across all namespaces when `None`
    ///
    /// Annotation, phase and namespace-policy filtering are the caller's job.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: &PodSelectorSpec,
    ) -> Result<Vec<Pod>, StoreError>;

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError>;

    /// Delete a pod; an already-absent pod is success
    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: i64,
    ) -> Result<(), StoreError>;

    async fn get_service(&self, namespace: &str, name: &str)
        -> Result<Option<Service>, StoreError>;
}

/// Persistence of experiment objects
#[async_trait]
pub trait ExperimentStore: Send + Sync {
    async fn get(
        &self,
        kind: ExperimentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Experiment>, StoreError>;

    /// Write the object's metadata and spec, conditional on its
    /// `resourceVersion`; a stale version yields [`StoreError::Conflict`]
    async fn replace(&self, experiment: &Experiment) -> Result<Experiment, StoreError>;

    /// Merge-patch the status subresource and return the updated object
    async fn patch_status(
        &self,
        experiment: &Experiment,
        status: &ChaosStatus,
    ) -> Result<Experiment, StoreError>;
}
