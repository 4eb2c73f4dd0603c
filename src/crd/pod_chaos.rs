//! # PodChaos
//!
//! Kills the selected pods or containers inside them.

use super::{ChaosStatus, PodSelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// PodChaos Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: chaos-mesh.org/v1alpha1
/// kind: PodChaos
/// metadata:
///   name: kill-workers
///   namespace: batch
/// spec:
///   action: PodKill
///   selector:
///     labelSelectors:
///       role: worker
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "PodChaos",
    group = "chaos-mesh.org",
    version = "v1alpha1",
    namespaced,
    status = "ChaosStatus",
    derive = "PartialEq",
    shortname = "podchaos",
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PodChaosSpec {
    /// What to kill
    pub action: PodAction,
    /// Pods that receive the fault
    pub selector: PodSelectorSpec,
    /// Containers to kill, required for `ContainerKill`
    #[serde(default)]
    pub container_names: Vec<String>,
    /// Grace period for `PodKill` deletions (seconds)
    #[serde(default)]
    pub grace_period: i64,
}

/// Pod fault kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum PodAction {
    PodKill,
    ContainerKill,
}
