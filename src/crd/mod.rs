//! # Custom Resource Definitions
//!
//! CRD types for the chaos controller.
//!
//! Every experiment kind embeds one or more [`PodSelectorSpec`] and shares the
//! [`ChaosStatus`] status type. [`Experiment`] wraps the concrete kinds so the
//! reconciler can treat them uniformly.

mod experiment;
mod http_chaos;
mod network_chaos;
mod pod_chaos;
mod selector;
mod status;

pub use experiment::{Experiment, ExperimentKind, ExperimentRef};
pub use http_chaos::{HTTPChaos, HTTPChaosSpec, HttpTarget};
pub use network_chaos::{
    DelaySpec, Direction, LossSpec, NetworkAction, NetworkChaos, NetworkChaosSpec,
};
pub use pod_chaos::{PodAction, PodChaos, PodChaosSpec};
pub use selector::{ExpressionRequirement, PodSelectorSpec, SelectorOperator};
pub use status::{condition_types, ChaosPhase, ChaosStatus, Condition};
