//! # chaosctl
//!
//! Command-line interface for chaos experiments managed by the chaos
//! controller.
//!
//! ## Usage
//!
//! ```bash
//! # List experiments of every kind
//! chaosctl list
//!
//! # Show status of one experiment
//! chaosctl status --kind NetworkChaos --namespace shop --name partition-db
//!
//! # Pause (recover all targets, keep the object) and resume an experiment
//! chaosctl pause --kind PodChaos --namespace shop --name kill-web
//! chaosctl resume --kind PodChaos --namespace shop --name kill-web
//! ```

use anyhow::{Context, Result};
use chaos_controller::constants::PAUSE_ANNOTATION;
use chaos_controller::controller::finalizer::tracked_keys;
use chaos_controller::crd::{Experiment, ExperimentKind, HTTPChaos, NetworkChaos, PodChaos};
use chaos_controller::ChaosStatus;
use clap::{Parser, Subcommand};
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;

/// Chaos controller CLI
#[derive(Parser)]
#[command(name = "chaosctl")]
#[command(about = "Inspect, pause and resume chaos experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Kubernetes namespace (defaults to "default", or all namespaces for list)
    #[arg(short, long, global = true)]
    namespace: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List experiments
    List {
        /// Only list this kind (HTTPChaos, NetworkChaos, PodChaos)
        #[arg(short, long)]
        kind: Option<ExperimentKind>,
    },
    /// Show status of an experiment
    Status {
        #[arg(short, long)]
        kind: ExperimentKind,
        #[arg(long)]
        name: String,
    },
    /// Pause an experiment; the controller recovers every target
    Pause {
        #[arg(short, long)]
        kind: ExperimentKind,
        #[arg(long)]
        name: String,
    },
    /// Resume a paused experiment; the controller selects targets again
    Resume {
        #[arg(short, long)]
        kind: ExperimentKind,
        #[arg(long)]
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chaosctl=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Ensure kubeconfig is configured.")?;

    match cli.command {
        Commands::List { kind } => list_command(&client, kind, cli.namespace.as_deref()).await,
        Commands::Status { kind, name } => {
            let ns = cli.namespace.as_deref().unwrap_or("default");
            status_command(&client, kind, ns, &name).await
        }
        Commands::Pause { kind, name } => {
            let ns = cli.namespace.as_deref().unwrap_or("default");
            set_paused(&client, kind, ns, &name, true).await
        }
        Commands::Resume { kind, name } => {
            let ns = cli.namespace.as_deref().unwrap_or("default");
            set_paused(&client, kind, ns, &name, false).await
        }
    }
}

fn api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn list_kind<K>(client: &Client, namespace: Option<&str>) -> Result<Vec<Experiment>>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + DeserializeOwned
        + Debug
        + Into<Experiment>,
{
    let list = api::<K>(client, namespace)
        .list(&ListParams::default())
        .await
        .with_context(|| format!("Failed to list {} resources", K::kind(&())))?;
    Ok(list.items.into_iter().map(Into::into).collect())
}

async fn get_experiment(
    client: &Client,
    kind: ExperimentKind,
    namespace: &str,
    name: &str,
) -> Result<Experiment> {
    let experiment = match kind {
        ExperimentKind::Http => api::<HTTPChaos>(client, Some(namespace))
            .get(name)
            .await
            .map(Experiment::from),
        ExperimentKind::Network => api::<NetworkChaos>(client, Some(namespace))
            .get(name)
            .await
            .map(Experiment::from),
        ExperimentKind::Pod => api::<PodChaos>(client, Some(namespace))
            .get(name)
            .await
            .map(Experiment::from),
    };
    experiment.with_context(|| format!("Failed to get {kind} '{namespace}/{name}'"))
}

/// List experiments with their phase and tracked target count
async fn list_command(
    client: &Client,
    kind: Option<ExperimentKind>,
    namespace: Option<&str>,
) -> Result<()> {
    let kinds = kind.map_or_else(|| ExperimentKind::ALL.to_vec(), |k| vec![k]);

    let mut experiments = Vec::new();
    for kind in kinds {
        let items = match kind {
            ExperimentKind::Http => list_kind::<HTTPChaos>(client, namespace).await?,
            ExperimentKind::Network => list_kind::<NetworkChaos>(client, namespace).await?,
            ExperimentKind::Pod => list_kind::<PodChaos>(client, namespace).await?,
        };
        experiments.extend(items);
    }

    if experiments.is_empty() {
        println!("No chaos experiments found.");
        return Ok(());
    }

    println!(
        "\n{:<14} {:<30} {:<20} {:<12} {:<8} {:<7}",
        "KIND", "NAME", "NAMESPACE", "PHASE", "TARGETS", "PAUSED"
    );
    println!("{}", "-".repeat(95));
    for experiment in &experiments {
        println!(
            "{:<14} {:<30} {:<20} {:<12} {:<8} {:<7}",
            experiment.kind(),
            experiment.name(),
            experiment.namespace(),
            ChaosStatus::current_phase(experiment.status()),
            tracked_keys(experiment).len(),
            experiment.is_paused()
        );
    }

    Ok(())
}

/// Show detailed status of an experiment
async fn status_command(
    client: &Client,
    kind: ExperimentKind,
    namespace: &str,
    name: &str,
) -> Result<()> {
    let experiment = get_experiment(client, kind, namespace, name).await?;

    println!("Status for {} '{}/{}':\n", kind, namespace, name);
    println!("Metadata:");
    if let Some(generation) = experiment.meta().generation {
        println!("  Generation: {}", generation);
    }
    println!("  Paused: {}", experiment.is_paused());
    println!("  Deleting: {}", experiment.is_deleting());

    let tracked = tracked_keys(&experiment);
    println!("\nTracked targets ({}):", tracked.len());
    for key in &tracked {
        println!("  {}", key);
    }

    let Some(status) = experiment.status() else {
        println!("\nStatus: No status available (experiment may not have been reconciled yet)");
        return Ok(());
    };

    println!("\nStatus:");
    println!("  Phase: {}", ChaosStatus::current_phase(Some(status)));
    if let Some(ref description) = status.description {
        println!("  Description: {}", description);
    }
    if let Some(ref failed) = status.failed_message {
        println!("  Failed: {}", failed);
    }
    if let Some(generation) = status.observed_generation {
        println!("  Observed Generation: {}", generation);
    }
    if let Some(ref time) = status.last_transition_time {
        println!("  Last Transition: {}", time);
    }

    if !status.conditions.is_empty() {
        println!("\nConditions:");
        for condition in &status.conditions {
            println!("  {}: {}", condition.r#type, condition.status);
            if let Some(ref reason) = condition.reason {
                println!("    Reason: {}", reason);
            }
            if let Some(ref message) = condition.message {
                println!("    Message: {}", message);
            }
        }
    }

    Ok(())
}

/// Set or clear the pause annotation with a merge patch
async fn set_paused(
    client: &Client,
    kind: ExperimentKind,
    namespace: &str,
    name: &str,
    paused: bool,
) -> Result<()> {
    let value = if paused { json!("true") } else { serde_json::Value::Null };
    let patch = Patch::Merge(json!({
        "metadata": {
            "annotations": {
                PAUSE_ANNOTATION: value
            }
        }
    }));
    let params = PatchParams::default();

    let result = match kind {
        ExperimentKind::Http => api::<HTTPChaos>(client, Some(namespace))
            .patch(name, &params, &patch)
            .await
            .map(drop),
        ExperimentKind::Network => api::<NetworkChaos>(client, Some(namespace))
            .patch(name, &params, &patch)
            .await
            .map(drop),
        ExperimentKind::Pod => api::<PodChaos>(client, Some(namespace))
            .patch(name, &params, &patch)
            .await
            .map(drop),
    };
    result.with_context(|| format!("Failed to update {kind} '{namespace}/{name}'"))?;

    if paused {
        println!("Paused {} '{}/{}'", kind, namespace, name);
        println!("The controller will recover every tracked target shortly.");
    } else {
        println!("Resumed {} '{}/{}'", kind, namespace, name);
        println!("The controller will select targets and inject again shortly.");
    }
    Ok(())
}
