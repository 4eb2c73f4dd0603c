//! # Watch Loop
//!
//! One `kube_runtime::Controller` per experiment kind, all sharing the same
//! reconciler. Runs until a shutdown signal arrives; the same signal cancels
//! the reconciler's shutdown token so running injection batches stop
//! dispatching new targets.

use crate::config::ControllerConfig;
use crate::constants::WATCH_TIMEOUT_SECS;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{Experiment, HTTPChaos, NetworkChaos, PodChaos};
use crate::runtime::error_policy::error_policy;
use anyhow::Result;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Client, Resource};
use kube_runtime::Controller;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Experiment API for the namespaces the controller serves
pub fn experiment_api<K>(client: Client, config: &ControllerConfig) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
{
    if config.cluster_scoped {
        Api::all(client)
    } else {
        Api::namespaced(client, &config.target_namespace)
    }
}

/// Cancel `token` on SIGTERM or SIGINT
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "Failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, cancelling injection batches"),
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for SIGINT");
                        return;
                    }
                    info!("Received SIGINT, cancelling injection batches");
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl+C");
                return;
            }
            info!("Received Ctrl+C, cancelling injection batches");
        }

        token.cancel();
    });
}

async fn run_controller<K>(api: Api<K>, reconciler: Arc<Reconciler>)
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + Into<Experiment>
        + 'static,
{
    let kind = K::kind(&()).to_string();
    info!("- {} controller", kind);
    Controller::new(api, WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, reconciler)
        .for_each(|result| {
            match result {
                Ok((object, action)) => {
                    debug!(?action, "{} {} reconciliation completed", kind, object.name);
                }
                Err(e) => error!(error = ?e, "{} reconciliation error", kind),
            }
            std::future::ready(())
        })
        .await;
}

/// Run the watch streams of every experiment kind until shutdown
///
/// # Errors
///
/// Currently infallible; kept fallible for the binary's `?` chain.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<()> {
    let config = reconciler.config().clone();
    cancel_on_signal(reconciler.shutdown_token());
    info!("Starting controllers:");

    tokio::join!(
        run_controller(
            experiment_api::<HTTPChaos>(client.clone(), &config),
            Arc::clone(&reconciler),
        ),
        run_controller(
            experiment_api::<NetworkChaos>(client.clone(), &config),
            Arc::clone(&reconciler),
        ),
        run_controller(experiment_api::<PodChaos>(client, &config), reconciler),
    );

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller stopped");
    Ok(())
}
