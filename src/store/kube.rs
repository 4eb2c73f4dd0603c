//! # Kubernetes Store
//!
//! [`TargetStore`] and [`ExperimentStore`] backed by the Kubernetes API.

use super::{ExperimentStore, StoreError, TargetStore};
use crate::constants::CONTROLLER_NAME;
use crate::crd::{
    ChaosStatus, Experiment, ExperimentKind, HTTPChaos, NetworkChaos, PodChaos, PodSelectorSpec,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

/// Map API status codes onto the store taxonomy
fn classify(err: kube::Error, kind: &str, key: &str) -> StoreError {
    match err {
        kube::Error::Api(ref api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            key: key.to_string(),
        },
        kube::Error::Api(ref api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        },
        other => StoreError::Api(other),
    }
}

/// Pods and services via the Kubernetes API
#[derive(Clone)]
pub struct KubeTargetStore {
    client: Client,
}

impl std::fmt::Debug for KubeTargetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeTargetStore").finish_non_exhaustive()
    }
}

impl KubeTargetStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TargetStore for KubeTargetStore {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: &PodSelectorSpec,
    ) -> Result<Vec<Pod>, StoreError> {
        let api: Api<Pod> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut params = ListParams::default();
        if let Some(labels) = selector.label_selector() {
            params = params.labels(&labels);
        }
        if let Some(fields) = selector.field_selector() {
            params = params.fields(&fields);
        }

        let list = api
            .list(&params)
            .await
            .map_err(|e| classify(e, "Pod", namespace.unwrap_or("*")))?;
        debug!(
            namespace = namespace.unwrap_or("*"),
            count = list.items.len(),
            "listed candidate pods"
        );
        Ok(list.items)
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "Pod", &format!("{namespace}/{name}")))
    }

    async fn delete_pod(
        &self,
        namespace: &str,
        name: &str,
        grace_period_secs: i64,
    ) -> Result<(), StoreError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = DeleteParams {
            grace_period_seconds: Some(u32::try_from(grace_period_secs.max(0)).unwrap_or(u32::MAX)),
            ..DeleteParams::default()
        };
        match api.delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!("Pod {}/{} already gone", namespace, name);
                Ok(())
            }
            Err(e) => Err(classify(e, "Pod", &format!("{namespace}/{name}"))),
        }
    }

    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, StoreError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "Service", &format!("{namespace}/{name}")))
    }
}

/// Experiment objects via the Kubernetes API
#[derive(Clone)]
pub struct KubeExperimentStore {
    client: Client,
}

impl std::fmt::Debug for KubeExperimentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeExperimentStore").finish_non_exhaustive()
    }
}

impl KubeExperimentStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_as<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &K::kind(&()), &format!("{namespace}/{name}")))
    }

    /// `replace` sends the object's resourceVersion, so the API server
    /// rejects the write with 409 when someone else updated it first
    async fn replace_as<K>(&self, obj: &K) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + Serialize
            + DeserializeOwned
            + Debug,
    {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let name = obj.name_any();
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| classify(e, &K::kind(&()), &format!("{namespace}/{name}")))
    }

    async fn patch_status_as<K>(&self, obj: &K, status: &ChaosStatus) -> Result<K, StoreError>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let name = obj.name_any();
        let patch = serde_json::json!({
            "status": status
        });
        self.api::<K>(&namespace)
            .patch_status(
                &name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| classify(e, &K::kind(&()), &format!("{namespace}/{name}")))
    }
}

#[async_trait]
impl ExperimentStore for KubeExperimentStore {
    async fn get(
        &self,
        kind: ExperimentKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Experiment>, StoreError> {
        Ok(match kind {
            ExperimentKind::Http => self
                .get_as::<HTTPChaos>(namespace, name)
                .await?
                .map(Experiment::from),
            ExperimentKind::Network => self
                .get_as::<NetworkChaos>(namespace, name)
                .await?
                .map(Experiment::from),
            ExperimentKind::Pod => self
                .get_as::<PodChaos>(namespace, name)
                .await?
                .map(Experiment::from),
        })
    }

    async fn replace(&self, experiment: &Experiment) -> Result<Experiment, StoreError> {
        Ok(match experiment {
            Experiment::Http(chaos) => self.replace_as(chaos).await?.into(),
            Experiment::Network(chaos) => self.replace_as(chaos).await?.into(),
            Experiment::Pod(chaos) => self.replace_as(chaos).await?.into(),
        })
    }

    async fn patch_status(
        &self,
        experiment: &Experiment,
        status: &ChaosStatus,
    ) -> Result<Experiment, StoreError> {
        Ok(match experiment {
            Experiment::Http(chaos) => self.patch_status_as(chaos, status).await?.into(),
            Experiment::Network(chaos) => self.patch_status_as(chaos, status).await?.into(),
            Experiment::Pod(chaos) => self.patch_status_as(chaos, status).await?.into(),
        })
    }
}
