//! # Target Lister
//!
//! Resolves a [`PodSelectorSpec`] into concrete target pods.
//!
//! Candidates come from the store (explicit pods or a label/field query), are
//! filtered client-side by annotations and phase, and finally by the
//! [`NamespacePolicy`]. The auxiliary DNS service is attached to every group.
//!
//! A store failure is a [`ChaosError::Selection`], never an empty result.

mod namespace;

pub use namespace::NamespacePolicy;

use crate::config::{ConfigError, ControllerConfig};
use crate::controller::error::ChaosError;
use crate::crd::PodSelectorSpec;
use crate::store::TargetStore;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};

/// One resolved target group
#[derive(Debug, Clone, Default)]
pub struct ChaosTarget {
    pub pods: Vec<Pod>,
    pub dns_service: Option<Service>,
}

impl ChaosTarget {
    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }
}

/// Auxiliary service looked up for every target group
#[derive(Debug, Clone)]
struct DnsLookup {
    namespace: String,
    name: String,
    required: bool,
}

pub struct ChaosTargetLister {
    store: Arc<dyn TargetStore>,
    policy: NamespacePolicy,
    dns: Option<DnsLookup>,
}

impl std::fmt::Debug for ChaosTargetLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaosTargetLister")
            .field("policy", &self.policy)
            .field("dns", &self.dns)
            .finish_non_exhaustive()
    }
}

impl ChaosTargetLister {
    /// # Errors
    ///
    /// Returns an error when a namespace pattern is invalid.
    pub fn new(store: Arc<dyn TargetStore>, config: &ControllerConfig) -> Result<Self, ConfigError> {
        let dns = config.dns_service_name.as_ref().map(|name| DnsLookup {
            namespace: config.namespace.clone(),
            name: name.clone(),
            required: config.dns_service_required,
        });
        Ok(Self {
            store,
            policy: NamespacePolicy::from_config(config)?,
            dns,
        })
    }

    pub fn policy(&self) -> &NamespacePolicy {
        &self.policy
    }

    /// Resolve one selector into a target group
    ///
    /// # Errors
    ///
    /// Returns [`ChaosError::Selection`] when a store query fails or the DNS
    /// service is required but absent.
    pub async fn select_targets(&self, selector: &PodSelectorSpec) -> Result<ChaosTarget, ChaosError> {
        let candidates = if selector.has_explicit_pods() {
            self.explicit_pods(selector).await?
        } else {
            self.query_pods(selector).await?
        };

        let pods: Vec<Pod> = self
            .policy
            .filter_pods(candidates)
            .into_iter()
            .filter(|pod| selector.matches_annotations(pod.annotations()))
            .filter(|pod| {
                selector.matches_phase(pod.status.as_ref().and_then(|s| s.phase.as_deref()))
            })
            .collect();

        debug!(count = pods.len(), "resolved target pods");

        Ok(ChaosTarget {
            pods,
            dns_service: self.dns_service().await?,
        })
    }

    async fn explicit_pods(&self, selector: &PodSelectorSpec) -> Result<Vec<Pod>, ChaosError> {
        let mut pods = Vec::new();
        for (namespace, names) in &selector.pods {
            if !self.policy.permits(namespace) {
                debug!("Skipping explicit pods in namespace {} (not permitted)", namespace);
                continue;
            }
            for name in names {
                match self
                    .store
                    .get_pod(namespace, name)
                    .await
                    .map_err(|e| ChaosError::Selection(e.to_string()))?
                {
                    Some(pod) => pods.push(pod),
                    None => warn!("Selected pod {}/{} not found, skipping", namespace, name),
                }
            }
        }
        Ok(pods)
    }

    async fn query_pods(&self, selector: &PodSelectorSpec) -> Result<Vec<Pod>, ChaosError> {
        let namespaces: Vec<Option<&str>> = if !selector.namespaces.is_empty() {
            selector
                .namespaces
                .iter()
                .filter(|ns| self.policy.permits(ns))
                .map(|ns| Some(ns.as_str()))
                .collect()
        } else {
            // Cluster scoped lists everywhere; otherwise only the one namespace
            vec![self.policy.scope()]
        };

        let mut pods = Vec::new();
        for namespace in namespaces {
            let found = self
                .store
                .list_pods(namespace, selector)
                .await
                .map_err(|e| ChaosError::Selection(e.to_string()))?;
            pods.extend(found);
        }
        Ok(pods)
    }

    async fn dns_service(&self) -> Result<Option<Service>, ChaosError> {
        let Some(dns) = &self.dns else {
            return Ok(None);
        };
        let service = self
            .store
            .get_service(&dns.namespace, &dns.name)
            .await
            .map_err(|e| ChaosError::Selection(e.to_string()))?;
        match service {
            Some(service) => Ok(Some(service)),
            None if dns.required => Err(ChaosError::Selection(format!(
                "required service {}/{} not found",
                dns.namespace, dns.name
            ))),
            None => {
                warn!(
                    "DNS service {}/{} not found, continuing without it",
                    dns.namespace, dns.name
                );
                Ok(None)
            }
        }
    }
}
