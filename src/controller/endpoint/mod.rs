//! # Experiment Endpoints
//!
//! One [`Endpoint`] per experiment kind. An endpoint extracts the kind's
//! selectors, applies the fault to the resolved target groups and recovers
//! every tracked target.
//!
//! Every operation first checks the concrete kind of the object it was handed
//! and, for apply, the number of target groups. Both checks happen before any
//! write or dispatch.

mod http_chaos;
mod network_chaos;
mod pod_chaos;

pub use http_chaos::HttpChaosEndpoint;
pub use network_chaos::NetworkChaosEndpoint;
pub use pod_chaos::PodChaosEndpoint;

use crate::controller::dispatch::Dispatcher;
use crate::controller::error::ChaosError;
use crate::controller::selector::ChaosTarget;
use crate::crd::{Experiment, ExperimentKind, PodSelectorSpec};
use crate::injector::PodInjector;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Identity of the object a reconciliation pass was triggered for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub kind: ExperimentKind,
    pub namespace: String,
    pub name: String,
}

impl ReconcileRequest {
    pub fn of(experiment: &Experiment) -> Self {
        Self {
            kind: experiment.kind(),
            namespace: experiment.namespace().to_string(),
            name: experiment.name().to_string(),
        }
    }
}

impl fmt::Display for ReconcileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Shared collaborators handed to every endpoint
pub struct EndpointContext {
    pub dispatcher: Dispatcher,
    pub injector: Arc<dyn PodInjector>,
}

impl fmt::Debug for EndpointContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointContext")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Per-kind plugin contract
#[async_trait]
pub trait Endpoint: Send + Sync {
    fn kind(&self) -> ExperimentKind;

    /// Selectors declared by the experiment, in target-group order
    ///
    /// # Errors
    ///
    /// Returns [`ChaosError::TypeMismatch`] for an object of another kind.
    fn selectors(&self, experiment: &Experiment) -> Result<Vec<PodSelectorSpec>, ChaosError>;

    /// Inject the fault into `targets`, one group per declared selector
    async fn apply(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
        targets: Vec<ChaosTarget>,
    ) -> Result<(), ChaosError>;

    /// Reverse the fault on every target tracked on the experiment
    async fn recover(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
    ) -> Result<(), ChaosError>;

    /// Empty object of this endpoint's kind
    fn object(&self) -> Experiment;
}

/// Reject an object of another kind; logged as a defect, never applied
pub(crate) fn ensure_kind(expected: ExperimentKind, experiment: &Experiment) -> Result<(), ChaosError> {
    if experiment.kind() == expected {
        return Ok(());
    }
    error!(
        "{} endpoint invoked with {} {}; refusing to touch it",
        expected,
        experiment.kind(),
        experiment.key()
    );
    Err(ChaosError::TypeMismatch {
        expected,
        found: experiment.kind(),
    })
}

pub(crate) fn ensure_groups(
    kind: ExperimentKind,
    expected: usize,
    targets: &[ChaosTarget],
) -> Result<(), ChaosError> {
    if targets.len() == expected {
        Ok(())
    } else {
        Err(ChaosError::Cardinality {
            kind,
            expected,
            found: targets.len(),
        })
    }
}

/// Pod IPs of a target group, used as network peers
pub(crate) fn pod_ips(group: &ChaosTarget) -> Vec<String> {
    group
        .pods
        .iter()
        .filter_map(|pod| pod.status.as_ref().and_then(|s| s.pod_ip.clone()))
        .collect()
}
