//! # Chaos Daemon Injector
//!
//! Delivers faults to the chaos daemon running on the target pod's node.

use super::{host_ip, InjectError, InjectionRequest, PodIdentity, PodInjector};
use crate::crd::ExperimentRef;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use reqwest::{Client as ReqwestClient, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const FAULTS_PATH: &str = "/api/v1/faults";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InjectionPayload<'a> {
    pod: PodIdentity,
    #[serde(flatten)]
    request: &'a InjectionRequest,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecoveryPayload<'a> {
    pod: PodIdentity,
    experiment: &'a ExperimentRef,
}

/// HTTP client for the per-node chaos daemon
#[derive(Debug, Clone)]
pub struct DaemonInjector {
    http_client: ReqwestClient,
    port: u16,
}

impl DaemonInjector {
    /// # Errors
    ///
    /// Returns an error when the HTTP client cannot be built.
    pub fn new(port: u16, timeout: Duration) -> Result<Self, InjectError> {
        let http_client = ReqwestClient::builder().timeout(timeout).build()?;
        Ok(Self { http_client, port })
    }

    fn faults_url(&self, pod: &Pod) -> Result<String, InjectError> {
        let host_ip = host_ip(pod).ok_or_else(|| {
            InjectError::NoHost(format!(
                "{}/{}",
                pod.namespace().unwrap_or_default(),
                pod.name_any()
            ))
        })?;
        Ok(daemon_url(host_ip, self.port))
    }
}

/// Daemon endpoint for a node address; IPv6 hosts are bracketed
fn daemon_url(host_ip: &str, port: u16) -> String {
    if host_ip.contains(':') {
        format!("http://[{host_ip}]:{port}{FAULTS_PATH}")
    } else {
        format!("http://{host_ip}:{port}{FAULTS_PATH}")
    }
}

async fn rejected(response: reqwest::Response) -> InjectError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    InjectError::Rejected { status, body }
}

#[async_trait]
impl PodInjector for DaemonInjector {
    async fn inject(&self, pod: &Pod, request: &InjectionRequest) -> Result<(), InjectError> {
        let url = self.faults_url(pod)?;
        debug!(url = %url, experiment = %request.experiment, fault = request.fault.name(), "Injecting fault");

        let response = self
            .http_client
            .post(&url)
            .json(&InjectionPayload {
                pod: PodIdentity::of(pod),
                request,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(())
    }

    async fn recover(&self, pod: &Pod, experiment: &ExperimentRef) -> Result<(), InjectError> {
        let url = self.faults_url(pod)?;
        debug!(url = %url, experiment = %experiment, "Recovering fault");

        let response = self
            .http_client
            .delete(&url)
            .json(&RecoveryPayload {
                pod: PodIdentity::of(pod),
                experiment,
            })
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                warn!(
                    "No fault from {} installed on {}/{}, treating as recovered",
                    experiment,
                    pod.namespace().unwrap_or_default(),
                    pod.name_any()
                );
                Ok(())
            }
            _ => Err(rejected(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;

    #[test]
    fn test_daemon_url_brackets_ipv6() {
        assert_eq!(
            daemon_url("10.1.2.3", 31767),
            "http://10.1.2.3:31767/api/v1/faults"
        );
        assert_eq!(
            daemon_url("fd00::1", 31767),
            "http://[fd00::1]:31767/api/v1/faults"
        );
    }

    #[test]
    fn test_unscheduled_pod_has_no_daemon() {
        let injector = DaemonInjector::new(31767, Duration::from_secs(5)).unwrap();
        let pod = Pod {
            status: Some(PodStatus::default()),
            ..Pod::default()
        };
        assert!(matches!(
            injector.faults_url(&pod),
            Err(InjectError::NoHost(_))
        ));
    }
}
