//! # Initialization
//!
//! Controller start-up: rustls setup, tracing, metrics, server startup,
//! Kubernetes client and reconciler construction.

use crate::config::{load_config, ServerConfig};
use crate::constants;
use crate::controller::events::KubeEventPublisher;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::registry::EndpointRegistry;
use crate::controller::server::{start_server, ServerState};
use crate::crd::{Experiment, HTTPChaos, NetworkChaos, PodChaos};
use crate::injector;
use crate::observability;
use crate::runtime::watch_loop::experiment_api;
use crate::store::{KubeExperimentStore, KubeTargetStore};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};

/// Components the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("reconciler", &self.reconciler)
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// # Errors
///
/// Returns an error when the crypto provider, metrics, HTTP server,
/// Kubernetes client or configuration cannot be set up.
pub async fn initialize() -> Result<InitializationResult> {
    // Must happen before any rustls client is built
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider, one is already installed: {existing:?}")
        })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chaos_controller=info".into()),
        )
        .init();

    info!("Starting Chaos Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let (controller_config, server_config) = load_config();
    controller_config
        .validate()
        .context("Invalid controller configuration")?;
    info!(
        "Configuration: namespace={}, cluster_scoped={}, injector={:?}, max_concurrent_injections={}, injection_timeout={}s",
        controller_config.namespace,
        controller_config.cluster_scoped,
        controller_config.injector_mode,
        controller_config.max_concurrent_injections,
        controller_config.injection_timeout_secs
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Readiness probes should pass before the first pass runs
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default().await?;

    let injector = injector::from_config(&controller_config)
        .context("Failed to build pod injector")?;
    let events = Arc::new(KubeEventPublisher::new(
        client.clone(),
        constants::CONTROLLER_NAME,
    ));
    let registry = EndpointRegistry::with_defaults();
    info!("Registered experiment kinds: {:?}", registry.kinds());

    let reconciler = Arc::new(
        Reconciler::new(
            Arc::new(KubeExperimentStore::new(client.clone())),
            Arc::new(KubeTargetStore::new(client.clone())),
            injector,
            events,
            registry,
            controller_config,
        )
        .context("Failed to build reconciler")?,
    );

    // Experiments created before the controller started get a pass before the watch begins
    let config = reconciler.config().clone();
    reconcile_existing_resources(
        &experiment_api::<HTTPChaos>(client.clone(), &config),
        &reconciler,
    )
    .await;
    reconcile_existing_resources(
        &experiment_api::<NetworkChaos>(client.clone(), &config),
        &reconciler,
    )
    .await;
    reconcile_existing_resources(
        &experiment_api::<PodChaos>(client.clone(), &config),
        &reconciler,
    )
    .await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let poll_interval = config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state
            .is_ready
            .load(std::sync::atomic::Ordering::Relaxed)
        {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

/// Reconcile existing experiments of one kind before starting the watch
///
/// A kind whose CRD is not installed is logged and skipped.
async fn reconcile_existing_resources<K>(api: &Api<K>, reconciler: &Arc<Reconciler>)
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Into<Experiment>,
{
    let kind = K::kind(&()).to_string();
    let span = tracing::span!(
        tracing::Level::INFO,
        "controller.startup.reconcile_existing",
        resource.kind = %kind
    );
    async {
        let list = match api.list(&ListParams::default()).await {
            Ok(list) => list,
            Err(e) => {
                error!("{} CRD is not queryable; {:?}. Is the CRD installed?", kind, e);
                error!("Installation: crdgen | kubectl apply -f -");
                warn!("Continuing without startup pass for {} - the watch will retry", kind);
                return;
            }
        };

        if list.items.is_empty() {
            info!("No existing {} resources found", kind);
            return;
        }

        let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for item in &list.items {
            by_namespace
                .entry(item.namespace().unwrap_or_default())
                .or_default()
                .push(item.name_any());
        }

        info!("Startup resource summary for {}", kind);
        info!("Total Resources: {}", list.items.len());
        for (namespace, mut names) in by_namespace {
            names.sort();
            info!(
                "  {} ({}): {}",
                namespace,
                names.len(),
                if names.len() <= 3 {
                    names.join(", ")
                } else {
                    format!("{}, ... ({} total)", names[..3].join(", "), names.len())
                }
            );
        }

        for item in list.items {
            let name = item.name_any();
            let namespace = item.namespace().unwrap_or_default();
            match reconcile(Arc::new(item), Arc::clone(reconciler)).await {
                Ok(_action) => info!(
                    resource.name = %name,
                    resource.namespace = %namespace,
                    "reconciliation.success"
                ),
                Err(e) => error!(
                    resource.name = %name,
                    resource.namespace = %namespace,
                    error = %e,
                    "reconciliation.error"
                ),
            }
        }
    }
    .instrument(span)
    .await;
}
