//! # Reconciler Types
//!
//! The reconciler context shared by every watch stream, and its error type.

use crate::config::{ConfigError, ControllerConfig};
use crate::controller::backoff::BackoffState;
use crate::controller::dispatch::Dispatcher;
use crate::controller::endpoint::EndpointContext;
use crate::controller::error::ChaosError;
use crate::controller::events::EventPublisher;
use crate::controller::finalizer::FinalizerTracker;
use crate::controller::registry::EndpointRegistry;
use crate::controller::selector::ChaosTargetLister;
use crate::injector::PodInjector;
use crate::store::{ExperimentStore, StoreError, TargetStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Chaos(#[from] ChaosError),

    #[error("failed to update status of {key}: {source}")]
    Status {
        key: String,
        #[source]
        source: StoreError,
    },
}

impl ReconcilerError {
    /// Metrics label for the failure
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::Chaos(e) => e.reason(),
            ReconcilerError::Status { .. } => "StatusUpdateFailed",
        }
    }
}

/// Backoff map key for one experiment object
pub fn backoff_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{kind}/{namespace}/{name}")
}

/// Reconciler context
///
/// Built once at start-up and shared by the watch streams of every
/// experiment kind. Passes for distinct experiments run concurrently.
pub struct Reconciler {
    pub(crate) store: Arc<dyn ExperimentStore>,
    pub(crate) lister: ChaosTargetLister,
    pub(crate) registry: EndpointRegistry,
    pub(crate) endpoint_ctx: Arc<EndpointContext>,
    pub(crate) events: Arc<dyn EventPublisher>,
    pub(crate) config: ControllerConfig,
    shutdown: CancellationToken,
    /// Per-resource error backoff, owned by the error policy
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("lister", &self.lister)
            .field("registry", &self.registry)
            .field("endpoint_ctx", &self.endpoint_ctx)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// # Errors
    ///
    /// Returns an error when the namespace policy in `config` is invalid.
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        targets: Arc<dyn TargetStore>,
        injector: Arc<dyn PodInjector>,
        events: Arc<dyn EventPublisher>,
        registry: EndpointRegistry,
        config: ControllerConfig,
    ) -> Result<Self, ConfigError> {
        let tracker = FinalizerTracker::new(
            Arc::clone(&experiments),
            config.finalizer_conflict_retries,
        );
        let shutdown = CancellationToken::new();
        let dispatcher = Dispatcher::from_config(
            tracker,
            Arc::clone(&targets),
            &config,
            shutdown.child_token(),
        );
        let lister = ChaosTargetLister::new(targets, &config)?;

        Ok(Self {
            store: experiments,
            lister,
            registry,
            endpoint_ctx: Arc::new(EndpointContext {
                dispatcher,
                injector,
            }),
            events,
            config,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Cancelling this token stops new injections in every running batch
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Forget the error history of a resource after a successful pass
    pub(crate) fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}
