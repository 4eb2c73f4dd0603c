//! # NetworkChaos
//!
//! Partitions, delays or drops traffic between the selected pods and an
//! optional second group of target pods.

use super::{ChaosStatus, PodSelectorSpec};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// NetworkChaos Custom Resource Definition
///
/// `selector` resolves the source group. When `target` is set it resolves a
/// second group, and the fault is scoped to traffic between the two groups.
///
/// # Example
///
/// ```yaml
/// apiVersion: chaos-mesh.org/v1alpha1
/// kind: NetworkChaos
/// metadata:
///   name: split-brain
///   namespace: storage
/// spec:
///   action: Partition
///   direction: Both
///   selector:
///     labelSelectors:
///       zone: a
///   target:
///     labelSelectors:
///       zone: b
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "NetworkChaos",
    group = "chaos-mesh.org",
    version = "v1alpha1",
    namespaced,
    status = "ChaosStatus",
    derive = "PartialEq",
    shortname = "netchaos",
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}, {"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct NetworkChaosSpec {
    /// Kind of network fault
    pub action: NetworkAction,
    /// Source pods
    pub selector: PodSelectorSpec,
    /// Peer pods; when unset the fault applies to all traffic of the source pods
    #[serde(default)]
    pub target: Option<PodSelectorSpec>,
    /// Traffic direction relative to the source pods
    #[serde(default)]
    pub direction: Direction,
    /// Delay parameters, required for `Delay`
    #[serde(default)]
    pub delay: Option<DelaySpec>,
    /// Loss parameters, required for `Loss`
    #[serde(default)]
    pub loss: Option<LossSpec>,
}

/// Network fault kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum NetworkAction {
    Partition,
    Delay,
    Loss,
}

/// Traffic direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Direction {
    #[default]
    To,
    From,
    Both,
}

/// Delay parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DelaySpec {
    /// Added latency (e.g. "100ms")
    pub latency: String,
    /// Jitter around the latency
    #[serde(default)]
    pub jitter: Option<String>,
}

/// Loss parameters
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LossSpec {
    /// Loss percentage (e.g. "25")
    pub loss: String,
}

impl Direction {
    /// Whether the peer group also needs rules installed
    pub fn affects_peers(self) -> bool {
        matches!(self, Direction::From | Direction::Both)
    }
}
