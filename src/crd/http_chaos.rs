//! # HTTPChaos
//!
//! Injects HTTP faults (abort, delay, status code replacement) into the
//! traffic of the selected pods.

use super::{ChaosStatus, PodSelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// HTTPChaos Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: chaos-mesh.org/v1alpha1
/// kind: HTTPChaos
/// metadata:
///   name: payments-abort
///   namespace: checkout
/// spec:
///   selector:
///     labelSelectors:
///       app: payments
///   target: Request
///   port: 8080
///   path: /api/*
///   abort: true
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "HTTPChaos",
    group = "chaos-mesh.org",
    version = "v1alpha1",
    namespaced,
    status = "ChaosStatus",
    derive = "PartialEq",
    shortname = "httpchaos",
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}, {"name":"Description", "type":"string", "jsonPath":".status.description"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct HTTPChaosSpec {
    /// Pods that receive the fault
    pub selector: PodSelectorSpec,
    /// Whether the fault applies to requests or responses
    #[serde(default)]
    pub target: HttpTarget,
    /// Port of the HTTP server inside the pod
    #[serde(default = "default_http_port")]
    pub port: i32,
    /// Path pattern the fault applies to (all paths when unset)
    #[serde(default)]
    pub path: Option<String>,
    /// HTTP method the fault applies to (all methods when unset)
    #[serde(default)]
    pub method: Option<String>,
    /// Abort matching connections
    #[serde(default)]
    pub abort: bool,
    /// Delay before forwarding matching traffic (e.g. "200ms")
    #[serde(default)]
    pub delay: Option<String>,
    /// Replace the response status code
    #[serde(default)]
    pub code: Option<i32>,
}

/// Side of the HTTP exchange that is faulted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum HttpTarget {
    #[default]
    Request,
    Response,
}

fn default_http_port() -> i32 {
    80
}
