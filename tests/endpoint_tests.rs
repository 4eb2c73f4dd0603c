//! Endpoint Integration Tests
//!
//! Apply and recovery through the reference endpoints, with the in-memory
//! store and a recording injector standing in for the cluster.

mod common;

use chaos_controller::controller::dispatch::Dispatcher;
use chaos_controller::controller::endpoint::{
    Endpoint, EndpointContext, HttpChaosEndpoint, NetworkChaosEndpoint, PodChaosEndpoint,
    ReconcileRequest,
};
use chaos_controller::controller::error::ChaosError;
use chaos_controller::controller::finalizer::{tracked_keys, FinalizerTracker};
use chaos_controller::controller::selector::ChaosTarget;
use chaos_controller::crd::{Direction, Experiment, ExperimentKind, PodAction};
use chaos_controller::injector::{Fault, PodInjector};
use chaos_controller::store::{ExperimentStore, InMemoryStore, TargetStore};
use common::{http_chaos, partition, pod, pod_kill, selector, sorted_finalizers, RecordingInjector};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Fixture {
    store: Arc<InMemoryStore>,
    injector: Arc<RecordingInjector>,
    ctx: Arc<EndpointContext>,
}

fn fixture_with(max_concurrent: usize, timeout: Duration, shutdown: CancellationToken) -> Fixture {
    let store = Arc::new(InMemoryStore::new());
    let injector = Arc::new(RecordingInjector::default());
    let tracker = FinalizerTracker::new(Arc::clone(&store) as Arc<dyn ExperimentStore>, 5);
    let dispatcher = Dispatcher::new(
        tracker,
        Arc::clone(&store) as Arc<dyn TargetStore>,
        max_concurrent,
        timeout,
        shutdown,
    );
    let ctx = Arc::new(EndpointContext {
        dispatcher,
        injector: Arc::clone(&injector) as Arc<dyn PodInjector>,
    });
    Fixture {
        store,
        injector,
        ctx,
    }
}

fn fixture() -> Fixture {
    fixture_with(4, Duration::from_secs(60), CancellationToken::new())
}

impl Fixture {
    fn pods(&self, namespace: &str, names: &[&str]) -> Vec<Pod> {
        names
            .iter()
            .map(|name| {
                let pod = pod(namespace, name, &[("app", "web")]);
                self.store.insert_pod(pod.clone());
                pod
            })
            .collect()
    }

    fn stored(&self, experiment: &Experiment) -> Experiment {
        self.store
            .experiment(experiment.kind(), experiment.namespace(), experiment.name())
            .unwrap()
    }
}

fn group(pods: Vec<Pod>) -> ChaosTarget {
    ChaosTarget {
        pods,
        dns_service: None,
    }
}

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test]
async fn test_type_mismatch_touches_nothing() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1"]);
    let mut experiment = f
        .store
        .insert_experiment(pod_kill("shop", "kill", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    assert!(matches!(
        endpoint.selectors(&experiment),
        Err(ChaosError::TypeMismatch {
            expected: ExperimentKind::Http,
            found: ExperimentKind::Pod,
        })
    ));
    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;
    assert!(matches!(result, Err(ChaosError::TypeMismatch { .. })));
    let result = endpoint.recover(&request, &mut experiment).await;
    assert!(matches!(result, Err(ChaosError::TypeMismatch { .. })));

    assert_eq!(f.store.replace_count(), 0);
    assert!(f.injector.injected().is_empty());
    assert!(f.store.deleted_pods().is_empty());
}

#[tokio::test]
async fn test_wrong_group_count_dispatches_nothing() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let none = endpoint.apply(&request, &mut experiment, Vec::new()).await;
    assert!(matches!(
        none,
        Err(ChaosError::Cardinality {
            expected: 1,
            found: 0,
            ..
        })
    ));

    let two = endpoint
        .apply(
            &request,
            &mut experiment,
            vec![group(pods.clone()), group(pods)],
        )
        .await;
    assert!(matches!(
        two,
        Err(ChaosError::Cardinality {
            expected: 1,
            found: 2,
            ..
        })
    ));

    assert_eq!(f.store.replace_count(), 0);
    assert!(f.injector.injected().is_empty());
    assert!(f.stored(&experiment).finalizers().is_empty());
}

#[tokio::test]
async fn test_partial_failure_keeps_every_key_and_cites_failed_target() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2", "web-3"]);
    f.injector.fail_inject_on("prod/web-2");
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;

    match result {
        Err(ChaosError::Injection {
            target,
            failed,
            total,
            ..
        }) => {
            assert_eq!(target, "prod/web-2");
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("expected injection error, got {other:?}"),
    }
    assert_eq!(
        sorted_finalizers(&f.stored(&experiment)),
        keys(&["prod/web-1", "prod/web-2", "prod/web-3"])
    );
    assert!(!f.injector.injected().contains(&"prod/web-2".to_string()));
}

#[tokio::test]
async fn test_apply_sends_http_fault_to_every_target() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await
        .unwrap();

    assert_eq!(f.injector.injected(), keys(&["prod/web-1", "prod/web-2"]));
    let requests = f.injector.requests_for("prod/web-1");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].experiment.name, "abort");
    assert!(matches!(
        requests[0].fault,
        Fault::Http {
            port: 8080,
            abort: true,
            ..
        }
    ));
    assert_eq!(tracked_keys(&experiment).len(), 2);
}

#[tokio::test]
async fn test_duplicate_pods_are_dispatched_once() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let twice = vec![pods[0].clone(), pods[0].clone()];
    endpoint
        .apply(&request, &mut experiment, vec![group(twice)])
        .await
        .unwrap();

    assert_eq!(f.injector.injected(), keys(&["prod/web-1"]));
    assert_eq!(sorted_finalizers(&experiment), keys(&["prod/web-1"]));
}

#[tokio::test]
async fn test_deadline_stops_dispatch_but_keeps_keys() {
    let f = fixture_with(1, Duration::from_millis(50), CancellationToken::new());
    f.injector.delay_inject_by(Duration::from_millis(200));
    let pods = f.pods("prod", &["web-1", "web-2", "web-3"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;

    assert!(matches!(
        result,
        Err(ChaosError::Timeout {
            pending: 2,
            total: 3,
            ..
        })
    ));
    // The in-flight unit finishes, the rest never start
    assert_eq!(f.injector.attempts(), keys(&["prod/web-1"]));
    assert_eq!(f.injector.injected(), keys(&["prod/web-1"]));
    assert_eq!(
        sorted_finalizers(&f.stored(&experiment)),
        keys(&["prod/web-1", "prod/web-2", "prod/web-3"])
    );
}

#[tokio::test]
async fn test_first_failure_cancels_remaining_units() {
    let f = fixture_with(1, Duration::from_secs(60), CancellationToken::new());
    f.injector.fail_inject_on("prod/web-1");
    let pods = f.pods("prod", &["web-1", "web-2", "web-3"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;

    match result {
        Err(ChaosError::Injection {
            target,
            failed,
            total,
            ..
        }) => {
            assert_eq!(target, "prod/web-1");
            assert_eq!(failed, 1);
            assert_eq!(total, 3);
        }
        other => panic!("expected an injection error, got {other:?}"),
    }
    assert_eq!(f.injector.attempts(), keys(&["prod/web-1"]));
    assert!(f.injector.injected().is_empty());
    assert_eq!(
        sorted_finalizers(&f.stored(&experiment)),
        keys(&["prod/web-1", "prod/web-2", "prod/web-3"])
    );
}

#[tokio::test]
async fn test_shutdown_interrupts_batch_but_keeps_keys() {
    let shutdown = CancellationToken::new();
    let f = fixture_with(4, Duration::from_secs(60), shutdown.child_token());
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    shutdown.cancel();
    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;

    assert!(matches!(
        result,
        Err(ChaosError::Interrupted {
            pending: 2,
            total: 2
        })
    ));
    assert!(f.injector.attempts().is_empty());
    assert_eq!(
        sorted_finalizers(&f.stored(&experiment)),
        keys(&["prod/web-1", "prod/web-2"])
    );
}

#[tokio::test]
async fn test_recover_is_idempotent() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);
    endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await
        .unwrap();

    endpoint.recover(&request, &mut experiment).await.unwrap();
    assert_eq!(f.injector.recovered(), keys(&["prod/web-1", "prod/web-2"]));
    assert!(f.stored(&experiment).finalizers().is_empty());
    let writes = f.store.replace_count();

    endpoint.recover(&request, &mut experiment).await.unwrap();
    assert_eq!(f.injector.recovered().len(), 2);
    assert_eq!(f.store.replace_count(), writes);
}

#[tokio::test]
async fn test_vanished_target_counts_as_recovered() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);
    endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await
        .unwrap();

    f.store.remove_pod("prod", "web-2");
    endpoint.recover(&request, &mut experiment).await.unwrap();

    assert_eq!(f.injector.recovered(), keys(&["prod/web-1"]));
    assert!(tracked_keys(&f.stored(&experiment)).is_empty());
}

#[tokio::test]
async fn test_failed_recovery_keeps_only_the_failed_key() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2", "web-3"]);
    let mut experiment = f
        .store
        .insert_experiment(http_chaos("shop", "abort", selector(&[("app", "web")])));
    let endpoint = HttpChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);
    endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await
        .unwrap();

    f.injector.fail_recover_on("prod/web-1");
    let result = endpoint.recover(&request, &mut experiment).await;

    assert!(matches!(
        result,
        Err(ChaosError::Recovery { ref key, .. }) if key == "prod/web-1"
    ));
    assert_eq!(
        sorted_finalizers(&f.stored(&experiment)),
        keys(&["prod/web-1"])
    );

    f.injector.clear_failures();
    endpoint.recover(&request, &mut experiment).await.unwrap();
    assert!(f.stored(&experiment).finalizers().is_empty());
}

#[tokio::test]
async fn test_pod_kill_deletes_targets_and_releases_on_recover() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1", "web-2"]);
    let mut experiment = f
        .store
        .insert_experiment(pod_kill("shop", "kill", selector(&[("app", "web")])));
    let endpoint = PodChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await
        .unwrap();

    let mut deleted = f.store.deleted_pods();
    deleted.sort();
    assert_eq!(deleted, keys(&["prod/web-1", "prod/web-2"]));
    assert!(f.injector.injected().is_empty());
    assert_eq!(tracked_keys(&experiment).len(), 2);

    endpoint.recover(&request, &mut experiment).await.unwrap();
    assert!(tracked_keys(&f.stored(&experiment)).is_empty());
}

#[tokio::test]
async fn test_container_kill_requires_container_names() {
    let f = fixture();
    let pods = f.pods("prod", &["web-1"]);
    let mut chaos = pod_kill("shop", "kill", selector(&[("app", "web")]));
    chaos.spec.action = PodAction::ContainerKill;
    let mut experiment = f.store.insert_experiment(chaos);
    let endpoint = PodChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(&request, &mut experiment, vec![group(pods)])
        .await;

    assert!(matches!(result, Err(ChaosError::InvalidSpec { .. })));
    assert_eq!(f.store.replace_count(), 0);
}

#[tokio::test]
async fn test_network_partition_both_directions_faults_both_groups() {
    let f = fixture();
    let sources = f.pods("shop", &["web-a"]);
    let peers = f.pods("shop", &["db"]);
    let mut experiment = f.store.insert_experiment(partition(
        "shop",
        "split",
        selector(&[("app", "web")]),
        Some(selector(&[("app", "db")])),
        Direction::Both,
    ));
    let endpoint = NetworkChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    assert_eq!(endpoint.selectors(&experiment).unwrap().len(), 2);
    endpoint
        .apply(
            &request,
            &mut experiment,
            vec![group(sources.clone()), group(peers.clone())],
        )
        .await
        .unwrap();

    assert_eq!(f.injector.injected(), keys(&["shop/db", "shop/web-a"]));
    let ip = |pod: &Pod| pod.status.as_ref().and_then(|s| s.pod_ip.clone()).unwrap();
    match &f.injector.requests_for("shop/web-a")[0].fault {
        Fault::Network { peers: got, .. } => assert_eq!(got, &vec![ip(&peers[0])]),
        other => panic!("unexpected fault {other:?}"),
    }
    match &f.injector.requests_for("shop/db")[0].fault {
        Fault::Network { peers: got, .. } => assert_eq!(got, &vec![ip(&sources[0])]),
        other => panic!("unexpected fault {other:?}"),
    }
}

#[tokio::test]
async fn test_network_partition_to_only_faults_sources() {
    let f = fixture();
    let sources = f.pods("shop", &["web-a"]);
    let peers = f.pods("shop", &["db"]);
    let mut experiment = f.store.insert_experiment(partition(
        "shop",
        "split",
        selector(&[("app", "web")]),
        Some(selector(&[("app", "db")])),
        Direction::To,
    ));
    let endpoint = NetworkChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    endpoint
        .apply(&request, &mut experiment, vec![group(sources), group(peers)])
        .await
        .unwrap();

    assert_eq!(f.injector.injected(), keys(&["shop/web-a"]));
    assert_eq!(sorted_finalizers(&experiment), keys(&["shop/web-a"]));
}

#[tokio::test]
async fn test_network_without_target_expects_one_group() {
    let f = fixture();
    let sources = f.pods("shop", &["web-a"]);
    let mut experiment = f.store.insert_experiment(partition(
        "shop",
        "isolate",
        selector(&[("app", "web")]),
        None,
        Direction::To,
    ));
    let endpoint = NetworkChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(
            &request,
            &mut experiment,
            vec![group(sources.clone()), group(sources)],
        )
        .await;
    assert!(matches!(
        result,
        Err(ChaosError::Cardinality {
            expected: 1,
            found: 2,
            ..
        })
    ));
    assert!(f.injector.injected().is_empty());
}

#[tokio::test]
async fn test_network_empty_target_group_is_rejected_before_tracking() {
    let f = fixture();
    let sources = f.pods("shop", &["web-a"]);
    let mut experiment = f.store.insert_experiment(partition(
        "shop",
        "split",
        selector(&[("app", "web")]),
        Some(selector(&[("app", "db")])),
        Direction::To,
    ));
    let endpoint = NetworkChaosEndpoint::new(Arc::clone(&f.ctx));
    let request = ReconcileRequest::of(&experiment);

    let result = endpoint
        .apply(&request, &mut experiment, vec![group(sources), group(vec![])])
        .await;

    assert!(matches!(
        result,
        Err(ChaosError::EmptyGroup {
            kind: ExperimentKind::Network,
            group: "target"
        })
    ));
    assert!(f.injector.attempts().is_empty());
    assert!(f.stored(&experiment).finalizers().is_empty());
    assert_eq!(f.store.replace_count(), 0);
}
