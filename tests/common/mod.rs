//! Shared fixtures for the integration tests: pod and experiment builders,
//! a recording injector, a recording event publisher and a harness wiring a
//! reconciler to the in-memory store.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use chaos_controller::config::ControllerConfig;
use chaos_controller::controller::events::EventPublisher;
use chaos_controller::controller::reconciler::Reconciler;
use chaos_controller::controller::registry::EndpointRegistry;
use chaos_controller::crd::{
    Direction, Experiment, ExperimentKind, ExperimentRef, HTTPChaos, HTTPChaosSpec, HttpTarget,
    NetworkAction, NetworkChaos, NetworkChaosSpec, PodAction, PodChaos, PodChaosSpec,
    PodSelectorSpec,
};
use chaos_controller::injector::{InjectError, InjectionRequest, PodInjector};
use chaos_controller::store::{ExperimentStore, InMemoryStore, TargetStore};
use k8s_openapi::api::core::v1::{ObjectReference, Pod, PodSpec, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::runtime::events::EventType;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            ),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            node_name: Some("node-1".to_string()),
            ..PodSpec::default()
        }),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            pod_ip: Some(format!("10.0.0.{}", name.len())),
            host_ip: Some("192.168.1.10".to_string()),
            ..PodStatus::default()
        }),
    }
}

pub fn selector(labels: &[(&str, &str)]) -> PodSelectorSpec {
    PodSelectorSpec {
        label_selectors: labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        ..PodSelectorSpec::default()
    }
}

pub fn http_chaos(namespace: &str, name: &str, selector: PodSelectorSpec) -> HTTPChaos {
    let mut chaos = HTTPChaos::new(
        name,
        HTTPChaosSpec {
            selector,
            target: HttpTarget::Request,
            port: 8080,
            path: Some("/api/*".to_string()),
            method: None,
            abort: true,
            delay: None,
            code: None,
        },
    );
    chaos.metadata.namespace = Some(namespace.to_string());
    chaos
}

pub fn pod_kill(namespace: &str, name: &str, selector: PodSelectorSpec) -> PodChaos {
    let mut chaos = PodChaos::new(
        name,
        PodChaosSpec {
            action: PodAction::PodKill,
            selector,
            container_names: Vec::new(),
            grace_period: 0,
        },
    );
    chaos.metadata.namespace = Some(namespace.to_string());
    chaos
}

pub fn partition(
    namespace: &str,
    name: &str,
    source: PodSelectorSpec,
    target: Option<PodSelectorSpec>,
    direction: Direction,
) -> NetworkChaos {
    let mut chaos = NetworkChaos::new(
        name,
        NetworkChaosSpec {
            action: NetworkAction::Partition,
            selector: source,
            target,
            direction,
            delay: None,
            loss: None,
        },
    );
    chaos.metadata.namespace = Some(namespace.to_string());
    chaos
}

fn key_of(pod: &Pod) -> String {
    format!("{}/{}", pod.namespace().unwrap_or_default(), pod.name_any())
}

/// Injector that records every call and fails for configured targets
#[derive(Debug, Default)]
pub struct RecordingInjector {
    attempts: Mutex<Vec<String>>,
    inject_delay: Mutex<Option<Duration>>,
    injected: Mutex<Vec<(String, InjectionRequest)>>,
    recovered: Mutex<Vec<String>>,
    fail_inject: Mutex<HashSet<String>>,
    fail_recover: Mutex<HashSet<String>>,
}

impl RecordingInjector {
    pub fn fail_inject_on(&self, key: &str) {
        self.fail_inject.lock().unwrap().insert(key.to_string());
    }

    pub fn fail_recover_on(&self, key: &str) {
        self.fail_recover.lock().unwrap().insert(key.to_string());
    }

    /// Make every injection take `delay` before it completes
    pub fn delay_inject_by(&self, delay: Duration) {
        *self.inject_delay.lock().unwrap() = Some(delay);
    }

    /// Keys of every injection attempt, in call order
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn clear_failures(&self) {
        self.fail_inject.lock().unwrap().clear();
        self.fail_recover.lock().unwrap().clear();
    }

    /// Sorted keys of every successful injection
    pub fn injected(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .injected
            .lock()
            .unwrap()
            .iter()
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn requests_for(&self, key: &str) -> Vec<InjectionRequest> {
        self.injected
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Sorted keys of every successful recovery
    pub fn recovered(&self) -> Vec<String> {
        let mut keys = self.recovered.lock().unwrap().clone();
        keys.sort();
        keys
    }
}

#[async_trait]
impl PodInjector for RecordingInjector {
    async fn inject(&self, pod: &Pod, request: &InjectionRequest) -> Result<(), InjectError> {
        let key = key_of(pod);
        self.attempts.lock().unwrap().push(key.clone());
        let delay = *self.inject_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_inject.lock().unwrap().contains(&key) {
            return Err(InjectError::Rejected {
                status: 500,
                body: "daemon refused".to_string(),
            });
        }
        self.injected.lock().unwrap().push((key, request.clone()));
        Ok(())
    }

    async fn recover(&self, pod: &Pod, _experiment: &ExperimentRef) -> Result<(), InjectError> {
        let key = key_of(pod);
        if self.fail_recover.lock().unwrap().contains(&key) {
            return Err(InjectError::Rejected {
                status: 503,
                body: "daemon unavailable".to_string(),
            });
        }
        self.recovered.lock().unwrap().push(key);
        Ok(())
    }
}

/// A published event: (reason, is warning)
pub type RecordedEvent = (String, bool);

#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|(reason, _)| reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap()
            .push((reason.to_string(), matches!(type_, EventType::Warning)));
    }
}

pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        dns_service_name: None,
        ..ControllerConfig::default()
    }
}

/// Reconciler over the in-memory store with recording doubles
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub injector: Arc<RecordingInjector>,
    pub events: Arc<RecordingEventPublisher>,
    pub reconciler: Arc<Reconciler>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let injector = Arc::new(RecordingInjector::default());
        let events = Arc::new(RecordingEventPublisher::default());
        let reconciler = Reconciler::new(
            Arc::clone(&store) as Arc<dyn ExperimentStore>,
            Arc::clone(&store) as Arc<dyn TargetStore>,
            Arc::clone(&injector) as Arc<dyn PodInjector>,
            Arc::clone(&events) as Arc<dyn EventPublisher>,
            EndpointRegistry::with_defaults(),
            config,
        )
        .expect("valid test config");
        Self {
            store,
            injector,
            events,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Current stored copy of an experiment
    pub fn stored(&self, kind: ExperimentKind, namespace: &str, name: &str) -> Experiment {
        self.store
            .experiment(kind, namespace, name)
            .expect("experiment exists")
    }
}

/// Finalizers of an experiment, sorted
pub fn sorted_finalizers(experiment: &Experiment) -> Vec<String> {
    let mut finalizers = experiment.finalizers().to_vec();
    finalizers.sort();
    finalizers
}

pub fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}
