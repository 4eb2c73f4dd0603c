//! # Endpoint Registry
//!
//! Maps experiment kinds to their endpoint. Built once at start-up, passed to
//! the reconciler and never mutated afterwards.

use crate::controller::endpoint::{
    Endpoint, EndpointContext, HttpChaosEndpoint, NetworkChaosEndpoint, PodChaosEndpoint,
};
use crate::controller::error::ChaosError;
use crate::crd::{Experiment, ExperimentKind};
use std::sync::Arc;

/// Empty object of a kind
pub type ObjectFactory = fn() -> Experiment;
/// Whether a binding handles a particular object
pub type Applicability = fn(&Experiment) -> bool;
/// Builds the endpoint from the shared context
pub type EndpointConstructor = fn(Arc<EndpointContext>) -> Box<dyn Endpoint>;

#[derive(Clone, Copy)]
pub struct Binding {
    pub kind: ExperimentKind,
    pub factory: ObjectFactory,
    pub applies: Applicability,
    pub constructor: EndpointConstructor,
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Binding {
    pub fn endpoint(&self, ctx: Arc<EndpointContext>) -> Box<dyn Endpoint> {
        (self.constructor)(ctx)
    }
}

fn always(_: &Experiment) -> bool {
    true
}

#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    bindings: Vec<Binding>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in experiment kind
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register(
                ExperimentKind::Http,
                HttpChaosEndpoint::empty,
                always,
                HttpChaosEndpoint::boxed,
            )
            .register(
                ExperimentKind::Network,
                NetworkChaosEndpoint::empty,
                always,
                NetworkChaosEndpoint::boxed,
            )
            .register(
                ExperimentKind::Pod,
                PodChaosEndpoint::empty,
                always,
                PodChaosEndpoint::boxed,
            );
        registry
    }

    pub fn register(
        &mut self,
        kind: ExperimentKind,
        factory: ObjectFactory,
        applies: Applicability,
        constructor: EndpointConstructor,
    ) -> &mut Self {
        self.bindings.push(Binding {
            kind,
            factory,
            applies,
            constructor,
        });
        self
    }

    /// First binding registered for the object's kind that applies to it
    ///
    /// # Errors
    ///
    /// Returns [`ChaosError::UnregisteredKind`] when no binding matches.
    pub fn lookup(&self, experiment: &Experiment) -> Result<&Binding, ChaosError> {
        let kind = experiment.kind();
        self.bindings
            .iter()
            .find(|b| b.kind == kind && (b.applies)(experiment))
            .ok_or(ChaosError::UnregisteredKind(kind))
    }

    /// Empty object for a registered kind
    pub fn object(&self, kind: ExperimentKind) -> Option<Experiment> {
        self.bindings
            .iter()
            .find(|b| b.kind == kind)
            .map(|b| (b.factory)())
    }

    pub fn kinds(&self) -> Vec<ExperimentKind> {
        let mut kinds: Vec<ExperimentKind> = self.bindings.iter().map(|b| b.kind).collect();
        kinds.dedup();
        kinds
    }
}
