//! # PodChaos Endpoint
//!
//! `PodKill` deletes the pods through the store. `ContainerKill` asks the
//! chaos daemon to kill the named containers. Neither leaves anything to
//! reverse, so recovery only releases the tracked keys.

use super::{ensure_groups, ensure_kind, Endpoint, EndpointContext, ReconcileRequest};
use crate::controller::error::ChaosError;
use crate::controller::finalizer::finalizer_key;
use crate::controller::selector::ChaosTarget;
use crate::crd::{Experiment, ExperimentKind, PodAction, PodChaos, PodChaosSpec, PodSelectorSpec};
use crate::injector::{Fault, InjectionRequest};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct PodChaosEndpoint {
    ctx: Arc<EndpointContext>,
}

impl PodChaosEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }

    pub fn boxed(ctx: Arc<EndpointContext>) -> Box<dyn Endpoint> {
        Box::new(Self::new(ctx))
    }

    pub fn empty() -> Experiment {
        PodChaos::new(
            "",
            PodChaosSpec {
                action: PodAction::PodKill,
                selector: PodSelectorSpec::default(),
                container_names: Vec::new(),
                grace_period: 0,
            },
        )
        .into()
    }

    fn spec(experiment: &Experiment) -> Result<&PodChaosSpec, ChaosError> {
        ensure_kind(ExperimentKind::Pod, experiment)?;
        experiment
            .as_pod()
            .map(|chaos| &chaos.spec)
            .ok_or(ChaosError::TypeMismatch {
                expected: ExperimentKind::Pod,
                found: experiment.kind(),
            })
    }
}

#[async_trait]
impl Endpoint for PodChaosEndpoint {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::Pod
    }

    fn selectors(&self, experiment: &Experiment) -> Result<Vec<PodSelectorSpec>, ChaosError> {
        Ok(vec![Self::spec(experiment)?.selector.clone()])
    }

    async fn apply(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
        targets: Vec<ChaosTarget>,
    ) -> Result<(), ChaosError> {
        let spec = Self::spec(experiment)?.clone();
        ensure_groups(ExperimentKind::Pod, 1, &targets)?;
        if spec.action == PodAction::ContainerKill && spec.container_names.is_empty() {
            return Err(ChaosError::InvalidSpec {
                kind: ExperimentKind::Pod,
                reason: "ContainerKill requires spec.containerNames".to_string(),
            });
        }
        let Some(group) = targets.into_iter().next() else {
            return Ok(());
        };

        info!(
            "Applying {:?} for {} to {} pod(s)",
            spec.action,
            request,
            group.pods.len()
        );

        match spec.action {
            PodAction::PodKill => {
                let store = Arc::clone(self.ctx.dispatcher.targets());
                let grace_period = spec.grace_period;
                self.ctx
                    .dispatcher
                    .apply_all(experiment, group.pods, |pod| {
                        let store = Arc::clone(&store);
                        async move {
                            store
                                .delete_pod(
                                    &pod.namespace().unwrap_or_default(),
                                    &pod.name_any(),
                                    grace_period,
                                )
                                .await
                                .map_err(|e| ChaosError::Injection {
                                    target: finalizer_key(&pod),
                                    reason: e.to_string(),
                                    failed: 1,
                                    total: 1,
                                })
                        }
                    })
                    .await
            }
            PodAction::ContainerKill => {
                let injection = InjectionRequest {
                    experiment: experiment.reference(),
                    fault: Fault::ContainerKill {
                        containers: spec.container_names.clone(),
                    },
                };
                let injector = Arc::clone(&self.ctx.injector);
                self.ctx
                    .dispatcher
                    .apply_all(experiment, group.pods, |pod| {
                        let injector = Arc::clone(&injector);
                        let injection = injection.clone();
                        async move {
                            injector
                                .inject(&pod, &injection)
                                .await
                                .map_err(|e| ChaosError::injection(finalizer_key(&pod), &e))
                        }
                    })
                    .await
            }
        }
    }

    async fn recover(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
    ) -> Result<(), ChaosError> {
        Self::spec(experiment)?;
        info!("Releasing killed targets of {}", request);
        self.ctx
            .dispatcher
            .recover_tracked(experiment, |pod| async move {
                debug!("Nothing to reverse on {}", finalizer_key(&pod));
                Ok(())
            })
            .await
    }

    fn object(&self) -> Experiment {
        Self::empty()
    }
}
