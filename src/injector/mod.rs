//! # Fault Injection
//!
//! Channel used to apply and clear a fault on a single target pod.
//!
//! - [`DaemonInjector`] - HTTP calls to the chaos daemon on the pod's node
//! - [`LoggingInjector`] - dry run, logs what would be injected
//!
//! The daemon contract:
//!
//! ```text
//! POST   http://<hostIP>:<port>/api/v1/faults   body: InjectionPayload
//! DELETE http://<hostIP>:<port>/api/v1/faults   body: RecoveryPayload
//! ```
//!
//! Faults are tagged with the experiment identity so recovery clears exactly
//! what that experiment installed. Clearing a fault that is not installed
//! answers 404, which counts as recovered.

mod daemon;

pub use daemon::DaemonInjector;

use crate::config::{ControllerConfig, InjectorMode};
use crate::crd::{
    DelaySpec, Direction, ExperimentRef, HttpTarget, LossSpec, NetworkAction,
};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Per-target injection failures
#[derive(Debug, Error)]
pub enum InjectError {
    #[error("pod {0} has no host IP (not scheduled yet)")]
    NoHost(String),
    #[error("failed to reach chaos daemon: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chaos daemon rejected the request: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// Type-specific fault parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Fault {
    #[serde(rename_all = "camelCase")]
    Http {
        target: HttpTarget,
        port: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        abort: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<i32>,
    },
    #[serde(rename_all = "camelCase")]
    Network {
        action: NetworkAction,
        direction: Direction,
        /// Pod IPs of the other group; empty means all traffic
        peers: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        delay: Option<DelaySpec>,
        #[serde(skip_serializing_if = "Option::is_none")]
        loss: Option<LossSpec>,
    },
    #[serde(rename_all = "camelCase")]
    ContainerKill { containers: Vec<String> },
}

impl Fault {
    pub fn name(&self) -> &'static str {
        match self {
            Fault::Http { .. } => "http",
            Fault::Network { .. } => "network",
            Fault::ContainerKill { .. } => "container-kill",
        }
    }
}

/// One fault for one pod on behalf of one experiment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionRequest {
    pub experiment: ExperimentRef,
    pub fault: Fault,
}

/// Node address of a scheduled pod; `None` until the pod is bound to a node
pub fn host_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.host_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// Identity of the target pod as sent to the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodIdentity {
    pub namespace: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Container runtime IDs, used by the daemon to enter the pod's namespaces
    pub container_ids: Vec<String>,
}

impl PodIdentity {
    pub fn of(pod: &Pod) -> Self {
        let container_ids = pod
            .status
            .as_ref()
            .and_then(|s| s.container_statuses.as_ref())
            .map(|statuses| {
                statuses
                    .iter()
                    .filter_map(|cs| cs.container_id.clone())
                    .collect()
            })
            .unwrap_or_default();
        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            uid: pod.uid(),
            container_ids,
        }
    }
}

/// Applies and clears faults on a single pod
#[async_trait]
pub trait PodInjector: Send + Sync {
    async fn inject(&self, pod: &Pod, request: &InjectionRequest) -> Result<(), InjectError>;

    /// Clear every fault `experiment` installed on `pod`; nothing installed is success
    async fn recover(&self, pod: &Pod, experiment: &ExperimentRef) -> Result<(), InjectError>;
}

/// Dry-run injector
#[derive(Debug, Default, Clone)]
pub struct LoggingInjector;

#[async_trait]
impl PodInjector for LoggingInjector {
    async fn inject(&self, pod: &Pod, request: &InjectionRequest) -> Result<(), InjectError> {
        info!(
            pod = %format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any()),
            experiment = %request.experiment,
            fault = request.fault.name(),
            "dry run: would inject fault"
        );
        Ok(())
    }

    async fn recover(&self, pod: &Pod, experiment: &ExperimentRef) -> Result<(), InjectError> {
        info!(
            pod = %format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any()),
            experiment = %experiment,
            "dry run: would recover fault"
        );
        Ok(())
    }
}

/// Build the injector selected by `INJECTOR_MODE`
///
/// # Errors
///
/// Returns an error when the HTTP client cannot be constructed.
pub fn from_config(config: &ControllerConfig) -> Result<Arc<dyn PodInjector>, InjectError> {
    Ok(match config.injector_mode {
        InjectorMode::Daemon => Arc::new(DaemonInjector::new(
            config.chaos_daemon_port,
            config.injection_timeout(),
        )?),
        InjectorMode::Log => Arc::new(LoggingInjector),
    })
}
