//! # NetworkChaos Endpoint
//!
//! One source group plus an optional peer group. Source pods get rules
//! scoped to the peer group's IPs. When the direction is `From` or `Both`
//! the peer pods get the mirrored rules as well.

use super::{ensure_groups, ensure_kind, pod_ips, Endpoint, EndpointContext, ReconcileRequest};
use crate::controller::error::ChaosError;
use crate::controller::finalizer::finalizer_key;
use crate::controller::selector::ChaosTarget;
use crate::crd::{
    Direction, Experiment, ExperimentKind, NetworkAction, NetworkChaos, NetworkChaosSpec,
    PodSelectorSpec,
};
use crate::injector::{Fault, InjectionRequest};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct NetworkChaosEndpoint {
    ctx: Arc<EndpointContext>,
}

impl NetworkChaosEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }

    pub fn boxed(ctx: Arc<EndpointContext>) -> Box<dyn Endpoint> {
        Box::new(Self::new(ctx))
    }

    pub fn empty() -> Experiment {
        NetworkChaos::new(
            "",
            NetworkChaosSpec {
                action: NetworkAction::Partition,
                selector: PodSelectorSpec::default(),
                target: None,
                direction: Direction::default(),
                delay: None,
                loss: None,
            },
        )
        .into()
    }

    fn spec(experiment: &Experiment) -> Result<&NetworkChaosSpec, ChaosError> {
        ensure_kind(ExperimentKind::Network, experiment)?;
        experiment
            .as_network()
            .map(|chaos| &chaos.spec)
            .ok_or(ChaosError::TypeMismatch {
                expected: ExperimentKind::Network,
                found: experiment.kind(),
            })
    }
}

/// Action parameters must be present for the chosen action
fn validate(spec: &NetworkChaosSpec) -> Result<(), ChaosError> {
    let missing = match spec.action {
        NetworkAction::Delay if spec.delay.is_none() => Some("delay action requires spec.delay"),
        NetworkAction::Loss if spec.loss.is_none() => Some("loss action requires spec.loss"),
        _ => None,
    };
    match missing {
        Some(reason) => Err(ChaosError::InvalidSpec {
            kind: ExperimentKind::Network,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

fn fault(spec: &NetworkChaosSpec, peers: Vec<String>) -> Fault {
    Fault::Network {
        action: spec.action,
        direction: spec.direction,
        peers,
        delay: spec.delay.clone(),
        loss: spec.loss.clone(),
    }
}

#[async_trait]
impl Endpoint for NetworkChaosEndpoint {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::Network
    }

    fn selectors(&self, experiment: &Experiment) -> Result<Vec<PodSelectorSpec>, ChaosError> {
        let spec = Self::spec(experiment)?;
        let mut selectors = vec![spec.selector.clone()];
        selectors.extend(spec.target.clone());
        Ok(selectors)
    }

    async fn apply(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
        targets: Vec<ChaosTarget>,
    ) -> Result<(), ChaosError> {
        let spec = Self::spec(experiment)?.clone();
        ensure_groups(
            ExperimentKind::Network,
            1 + usize::from(spec.target.is_some()),
            &targets,
        )?;
        validate(&spec)?;

        let mut groups = targets.into_iter();
        let source = groups.next().unwrap_or_default();
        let peers = groups.next();
        // An empty peer list in the fault means all traffic
        if peers.as_ref().is_some_and(|group| group.pods.is_empty()) {
            return Err(ChaosError::EmptyGroup {
                kind: ExperimentKind::Network,
                group: "target",
            });
        }

        let source_keys: HashSet<String> = source.pods.iter().map(finalizer_key).collect();
        let source_fault = InjectionRequest {
            experiment: experiment.reference(),
            fault: fault(&spec, peers.as_ref().map(pod_ips).unwrap_or_default()),
        };
        let peer_fault = InjectionRequest {
            experiment: experiment.reference(),
            fault: fault(&spec, pod_ips(&source)),
        };

        let mut pods = source.pods;
        if let Some(peers) = peers.filter(|_| spec.direction.affects_peers()) {
            pods.extend(peers.pods);
        }

        info!(
            "Applying {:?} network fault for {} to {} pod(s)",
            spec.action,
            request,
            pods.len()
        );
        let injector = Arc::clone(&self.ctx.injector);
        self.ctx
            .dispatcher
            .apply_all(experiment, pods, |pod| {
                let injector = Arc::clone(&injector);
                let key = finalizer_key(&pod);
                let injection = if source_keys.contains(&key) {
                    source_fault.clone()
                } else {
                    peer_fault.clone()
                };
                async move {
                    injector
                        .inject(&pod, &injection)
                        .await
                        .map_err(|e| ChaosError::injection(key, &e))
                }
            })
            .await
    }

    async fn recover(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
    ) -> Result<(), ChaosError> {
        Self::spec(experiment)?;
        info!("Recovering network fault for {}", request);

        let reference = experiment.reference();
        let injector = Arc::clone(&self.ctx.injector);
        self.ctx
            .dispatcher
            .recover_tracked(experiment, |pod| {
                let injector = Arc::clone(&injector);
                let reference = reference.clone();
                async move {
                    injector
                        .recover(&pod, &reference)
                        .await
                        .map_err(|e| ChaosError::injection(finalizer_key(&pod), &e))
                }
            })
            .await
    }

    fn object(&self) -> Experiment {
        Self::empty()
    }
}
