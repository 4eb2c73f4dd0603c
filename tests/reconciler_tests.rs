//! Reconciler Integration Tests
//!
//! Full passes over the in-memory store: apply, pause and resume, deletion,
//! failure reporting and error backoff.

mod common;

use chaos_controller::constants::PAUSE_ANNOTATION;
use chaos_controller::controller::error::ChaosError;
use chaos_controller::controller::events::EventPublisher;
use chaos_controller::controller::reconciler::{Reconciler, ReconcilerError, NO_TARGETS_SELECTED};
use chaos_controller::controller::registry::EndpointRegistry;
use chaos_controller::crd::{condition_types, ChaosPhase, Direction, Experiment, ExperimentKind};
use chaos_controller::injector::{DaemonInjector, PodInjector};
use chaos_controller::runtime::error_policy;
use chaos_controller::store::{ExperimentStore, InMemoryStore, TargetStore};
use chaos_controller::ChaosStatus;
use common::{
    annotations, http_chaos, partition, pod, selector, sorted_finalizers, test_config, Harness,
    RecordingEventPublisher, RecordingInjector,
};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;

const KIND: ExperimentKind = ExperimentKind::Http;

fn seed(harness: &Harness, namespace: &str, names: &[&str]) {
    for name in names {
        harness.store.insert_pod(pod(namespace, name, &[("app", "web")]));
    }
}

fn create(harness: &Harness) -> Experiment {
    harness
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])))
}

fn phase(experiment: &Experiment) -> ChaosPhase {
    ChaosStatus::current_phase(experiment.status())
}

fn condition_status(experiment: &Experiment, condition: &str) -> Option<String> {
    experiment
        .status()
        .and_then(|s| s.condition(condition))
        .map(|c| c.status.clone())
}

async fn pass(harness: &Harness) -> Result<Action, ReconcilerError> {
    harness
        .reconciler
        .reconcile_experiment(harness.stored(KIND, "shop", "abort"))
        .await
}

fn set_paused(harness: &Harness, paused: bool) {
    harness
        .store
        .update_experiment(KIND, "shop", "abort", |experiment| {
            experiment.meta_mut().annotations = if paused {
                Some(annotations(&[(PAUSE_ANNOTATION, "true")]))
            } else {
                None
            };
        });
}

#[tokio::test]
async fn test_apply_injects_every_target_and_settles() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1", "web-2"]);
    create(&harness);

    let action = pass(&harness).await.unwrap();
    assert_eq!(action, Action::await_change());

    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(phase(&stored), ChaosPhase::Applied);
    assert_eq!(sorted_finalizers(&stored), vec!["prod/web-1", "prod/web-2"]);
    assert_eq!(
        condition_status(&stored, condition_types::SELECTED).as_deref(),
        Some("True")
    );
    assert_eq!(
        condition_status(&stored, condition_types::ALL_INJECTED).as_deref(),
        Some("True")
    );
    assert_eq!(stored.status().unwrap().observed_generation, Some(1));
    assert_eq!(
        harness.events.events(),
        vec![("AppliedSuccessfully".to_string(), false)]
    );

    let action = pass(&harness).await.unwrap();
    assert_eq!(action, Action::await_change());
    assert_eq!(harness.injector.injected().len(), 2);
    assert_eq!(harness.events.events().len(), 1);
}

#[tokio::test]
async fn test_pause_recovers_and_resume_reapplies() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1", "web-2"]);
    create(&harness);
    pass(&harness).await.unwrap();

    set_paused(&harness, true);
    let action = pass(&harness).await.unwrap();
    assert_eq!(action, Action::await_change());

    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(phase(&stored), ChaosPhase::Recovered);
    assert!(stored.finalizers().is_empty());
    assert_eq!(
        condition_status(&stored, condition_types::PAUSED).as_deref(),
        Some("True")
    );
    assert_eq!(harness.injector.recovered(), vec!["prod/web-1", "prod/web-2"]);
    assert!(harness.events.reasons().contains(&"ChaosRecovered".to_string()));

    // A paused experiment with nothing tracked stays put
    let writes = harness.store.replace_count();
    pass(&harness).await.unwrap();
    assert_eq!(harness.store.replace_count(), writes);
    assert_eq!(harness.injector.recovered().len(), 2);

    set_paused(&harness, false);
    pass(&harness).await.unwrap();

    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(phase(&stored), ChaosPhase::Applied);
    assert_eq!(sorted_finalizers(&stored), vec!["prod/web-1", "prod/web-2"]);
    assert_eq!(
        condition_status(&stored, condition_types::PAUSED).as_deref(),
        Some("False")
    );
    assert_eq!(harness.injector.requests_for("prod/web-1").len(), 2);
}

#[tokio::test]
async fn test_deletion_recovers_and_lets_object_go() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1", "web-2"]);
    create(&harness);
    pass(&harness).await.unwrap();

    harness.store.mark_deleting(KIND, "shop", "abort").unwrap();
    let action = pass(&harness).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(harness.store.experiment(KIND, "shop", "abort").is_none());
    assert_eq!(harness.injector.recovered(), vec!["prod/web-1", "prod/web-2"]);
    assert_eq!(
        harness.events.reasons(),
        vec!["AppliedSuccessfully", "ChaosRecovered"]
    );
}

#[tokio::test]
async fn test_no_targets_requeues_without_mutation() {
    let harness = Harness::new();
    create(&harness);

    let action = pass(&harness).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    assert_eq!(harness.store.replace_count(), 0);
    let stored = harness.stored(KIND, "shop", "abort");
    assert!(stored.finalizers().is_empty());
    assert_eq!(
        stored.status().unwrap().description.as_deref(),
        Some(NO_TARGETS_SELECTED)
    );
    assert_eq!(
        condition_status(&stored, condition_types::SELECTED).as_deref(),
        Some("False")
    );
    assert_eq!(phase(&stored), ChaosPhase::NotInjected);
    assert!(harness.events.events().is_empty());
}

#[tokio::test]
async fn test_ignored_namespace_yields_no_targets() {
    let config = chaos_controller::config::ControllerConfig {
        ignored_namespaces: vec!["prod".to_string()],
        ..test_config()
    };
    let harness = Harness::with_config(config);
    seed(&harness, "prod", &["web-1", "web-2"]);
    create(&harness);

    let action = pass(&harness).await.unwrap();

    assert_eq!(action, Action::requeue(Duration::from_secs(30)));
    assert!(harness.stored(KIND, "shop", "abort").finalizers().is_empty());
    assert!(harness.injector.injected().is_empty());
}

#[tokio::test]
async fn test_injection_failure_is_recorded_and_retried() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1", "web-2", "web-3"]);
    harness.injector.fail_inject_on("prod/web-2");
    create(&harness);

    let result = pass(&harness).await;
    assert!(matches!(
        result,
        Err(ReconcilerError::Chaos(ChaosError::Injection { ref target, total: 3, .. }))
            if target == "prod/web-2"
    ));

    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(phase(&stored), ChaosPhase::Applying);
    assert_eq!(
        sorted_finalizers(&stored),
        vec!["prod/web-1", "prod/web-2", "prod/web-3"]
    );
    let failed = stored.status().unwrap().failed_message.clone().unwrap();
    assert!(failed.contains("prod/web-2"));
    assert_eq!(
        condition_status(&stored, condition_types::ALL_INJECTED).as_deref(),
        Some("False")
    );
    assert_eq!(harness.events.events(), vec![("ApplyFailed".to_string(), true)]);

    harness.injector.clear_failures();
    pass(&harness).await.unwrap();

    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(phase(&stored), ChaosPhase::Applied);
    assert!(stored.status().unwrap().failed_message.is_none());
    assert_eq!(sorted_finalizers(&stored).len(), 3);
}

#[tokio::test]
async fn test_failed_recovery_keeps_object_and_key() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1", "web-2"]);
    create(&harness);
    pass(&harness).await.unwrap();

    harness.injector.fail_recover_on("prod/web-1");
    harness.store.mark_deleting(KIND, "shop", "abort").unwrap();
    let result = pass(&harness).await;

    assert!(matches!(
        result,
        Err(ReconcilerError::Chaos(ChaosError::Recovery { ref key, .. })) if key == "prod/web-1"
    ));
    let stored = harness.stored(KIND, "shop", "abort");
    assert_eq!(sorted_finalizers(&stored), vec!["prod/web-1"]);
    assert_eq!(phase(&stored), ChaosPhase::Recovering);
    assert_eq!(
        harness.events.events().last(),
        Some(&("RecoveryFailed".to_string(), true))
    );

    harness.injector.clear_failures();
    pass(&harness).await.unwrap();
    assert!(harness.store.experiment(KIND, "shop", "abort").is_none());
}

#[tokio::test]
async fn test_store_outage_fails_selection_without_writes() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1"]);
    let experiment = create(&harness);
    harness.store.fail_requests(true);

    let result = harness.reconciler.reconcile_experiment(experiment).await;

    // Selection fails first, then the status write reporting it
    assert!(matches!(result, Err(ReconcilerError::Status { .. })));
    harness.store.fail_requests(false);
    assert_eq!(harness.store.replace_count(), 0);
    assert!(harness.injector.injected().is_empty());
}

#[tokio::test]
async fn test_unregistered_kind_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn ExperimentStore>,
        Arc::clone(&store) as Arc<dyn TargetStore>,
        Arc::new(RecordingInjector::default()) as Arc<dyn PodInjector>,
        Arc::new(RecordingEventPublisher::default()) as Arc<dyn EventPublisher>,
        EndpointRegistry::new(),
        test_config(),
    )
    .unwrap();
    let experiment =
        store.insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));

    let result = reconciler.reconcile_experiment(experiment).await;

    assert!(matches!(
        result,
        Err(ReconcilerError::Chaos(ChaosError::UnregisteredKind(ExperimentKind::Http)))
    ));
    assert_eq!(store.status_patch_count(), 0);
}

#[tokio::test]
async fn test_error_backoff_grows_and_resets_after_success() {
    let harness = Harness::new();
    create(&harness);
    let chaos = Arc::new(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let error = ReconcilerError::Chaos(ChaosError::Selection("store unavailable".to_string()));

    let delays: Vec<Action> = (0..3)
        .map(|_| error_policy(Arc::clone(&chaos), &error, Arc::clone(&harness.reconciler)))
        .collect();
    assert_eq!(
        delays,
        vec![
            Action::requeue(Duration::from_secs(30)),
            Action::requeue(Duration::from_secs(30)),
            Action::requeue(Duration::from_secs(60)),
        ]
    );

    pass(&harness).await.unwrap();
    assert!(harness.reconciler.backoff_states.lock().unwrap().is_empty());
    assert_eq!(
        error_policy(chaos, &error, Arc::clone(&harness.reconciler)),
        Action::requeue(Duration::from_secs(30))
    );
}

#[tokio::test]
async fn test_empty_network_target_group_fails_without_tracking() {
    let harness = Harness::new();
    seed(&harness, "shop", &["web-a"]);
    let experiment = harness.store.insert_experiment(partition(
        "shop",
        "split",
        selector(&[("app", "web")]),
        Some(selector(&[("app", "db")])),
        Direction::To,
    ));

    let result = harness.reconciler.reconcile_experiment(experiment).await;

    assert!(matches!(
        result,
        Err(ReconcilerError::Chaos(ChaosError::EmptyGroup {
            kind: ExperimentKind::Network,
            group: "target"
        }))
    ));
    let stored = harness.stored(ExperimentKind::Network, "shop", "split");
    assert!(stored.finalizers().is_empty());
    assert!(harness.injector.attempts().is_empty());
    assert_eq!(harness.events.events(), vec![("ApplyFailed".to_string(), true)]);
}

#[tokio::test]
async fn test_unscheduled_target_does_not_block_deletion() {
    let store = Arc::new(InMemoryStore::new());
    let mut unscheduled = pod("prod", "web-1", &[("app", "web")]);
    if let Some(spec) = unscheduled.spec.as_mut() {
        spec.node_name = None;
    }
    if let Some(status) = unscheduled.status.as_mut() {
        status.phase = Some("Pending".to_string());
        status.host_ip = None;
    }
    store.insert_pod(unscheduled);
    let injector = DaemonInjector::new(31767, Duration::from_secs(1)).unwrap();
    let reconciler = Reconciler::new(
        Arc::clone(&store) as Arc<dyn ExperimentStore>,
        Arc::clone(&store) as Arc<dyn TargetStore>,
        Arc::new(injector) as Arc<dyn PodInjector>,
        Arc::new(RecordingEventPublisher::default()) as Arc<dyn EventPublisher>,
        EndpointRegistry::with_defaults(),
        test_config(),
    )
    .unwrap();
    let experiment =
        store.insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));

    let result = reconciler.reconcile_experiment(experiment).await;
    assert!(matches!(
        result,
        Err(ReconcilerError::Chaos(ChaosError::Injection { ref target, .. })) if target == "prod/web-1"
    ));
    let stored = store.experiment(KIND, "shop", "abort").unwrap();
    assert_eq!(sorted_finalizers(&stored), vec!["prod/web-1"]);

    store.mark_deleting(KIND, "shop", "abort").unwrap();
    let deleting = store.experiment(KIND, "shop", "abort").unwrap();
    let action = reconciler.reconcile_experiment(deleting).await.unwrap();

    assert_eq!(action, Action::await_change());
    assert!(store.experiment(KIND, "shop", "abort").is_none());
}

#[tokio::test]
async fn test_deletion_clears_backoff_state() {
    let harness = Harness::new();
    seed(&harness, "prod", &["web-1"]);
    create(&harness);
    pass(&harness).await.unwrap();

    let chaos = Arc::new(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let error = ReconcilerError::Chaos(ChaosError::Selection("store unavailable".to_string()));
    assert_eq!(
        error_policy(chaos, &error, Arc::clone(&harness.reconciler)),
        Action::requeue(Duration::from_secs(30))
    );
    assert_eq!(harness.reconciler.backoff_states.lock().unwrap().len(), 1);

    harness.store.mark_deleting(KIND, "shop", "abort").unwrap();
    pass(&harness).await.unwrap();

    assert!(harness.store.experiment(KIND, "shop", "abort").is_none());
    assert!(harness.reconciler.backoff_states.lock().unwrap().is_empty());
}
