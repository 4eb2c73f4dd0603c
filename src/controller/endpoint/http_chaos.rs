//! # HTTPChaos Endpoint
//!
//! Exactly one target group; every pod gets the same HTTP fault.

use super::{ensure_groups, ensure_kind, Endpoint, EndpointContext, ReconcileRequest};
use crate::controller::error::ChaosError;
use crate::controller::finalizer::finalizer_key;
use crate::controller::selector::ChaosTarget;
use crate::crd::{
    Experiment, ExperimentKind, HTTPChaos, HTTPChaosSpec, HttpTarget, PodSelectorSpec,
};
use crate::injector::{Fault, InjectionRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct HttpChaosEndpoint {
    ctx: Arc<EndpointContext>,
}

impl HttpChaosEndpoint {
    pub fn new(ctx: Arc<EndpointContext>) -> Self {
        Self { ctx }
    }

    pub fn boxed(ctx: Arc<EndpointContext>) -> Box<dyn Endpoint> {
        Box::new(Self::new(ctx))
    }

    /// Empty HTTPChaos object
    pub fn empty() -> Experiment {
        HTTPChaos::new(
            "",
            HTTPChaosSpec {
                selector: PodSelectorSpec::default(),
                target: HttpTarget::default(),
                port: 80,
                path: None,
                method: None,
                abort: false,
                delay: None,
                code: None,
            },
        )
        .into()
    }

    fn spec(experiment: &Experiment) -> Result<&HTTPChaosSpec, ChaosError> {
        ensure_kind(ExperimentKind::Http, experiment)?;
        experiment
            .as_http()
            .map(|chaos| &chaos.spec)
            .ok_or(ChaosError::TypeMismatch {
                expected: ExperimentKind::Http,
                found: experiment.kind(),
            })
    }
}

fn fault(spec: &HTTPChaosSpec) -> Fault {
    Fault::Http {
        target: spec.target,
        port: spec.port,
        path: spec.path.clone(),
        method: spec.method.clone(),
        abort: spec.abort,
        delay: spec.delay.clone(),
        code: spec.code,
    }
}

#[async_trait]
impl Endpoint for HttpChaosEndpoint {
    fn kind(&self) -> ExperimentKind {
        ExperimentKind::Http
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
        let injection = InjectionRequest {
            experiment: experiment.reference(),
            fault: fault(Self::spec(experiment)?),
        };
        ensure_groups(ExperimentKind::Http, 1, &targets)?;
        let Some(group) = targets.into_iter().next() else {
            return Ok(());
        };

        info!(
            "Applying HTTP fault for {} to {} pod(s)",
            request,
            group.pods.len()
        );
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

    async fn recover(
        &self,
        request: &ReconcileRequest,
        experiment: &mut Experiment,
    ) -> Result<(), ChaosError> {
        Self::spec(experiment)?;
        info!("Recovering HTTP fault for {}", request);

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
