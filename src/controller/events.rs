//! # Lifecycle Events
//!
//! Kubernetes Events emitted on experiment objects.
//!
//! Events are fire-and-forget: a failed publish is logged and never fails
//! the reconciliation pass.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

/// Publishes Kubernetes Events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Publisher that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons (REASON column of `kubectl get events`)
pub mod reasons {
    /// Every selected target received the fault
    pub const APPLIED_SUCCESSFULLY: &str = "AppliedSuccessfully";
    /// At least one target could not be injected
    pub const APPLY_FAILED: &str = "ApplyFailed";
    /// Every tracked target was recovered
    pub const CHAOS_RECOVERED: &str = "ChaosRecovered";
    /// At least one tracked target could not be recovered
    pub const RECOVERY_FAILED: &str = "RecoveryFailed";
}

/// Event actions (ACTION column of `kubectl get events`)
pub mod actions {
    pub const APPLY: &str = "Apply";
    pub const RECOVER: &str = "Recover";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_publisher_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NoopEventPublisher>();
    }

    #[test]
    fn test_reason_constants() {
        assert_eq!(reasons::APPLIED_SUCCESSFULLY, "AppliedSuccessfully");
        assert_eq!(reasons::APPLY_FAILED, "ApplyFailed");
        assert_eq!(reasons::CHAOS_RECOVERED, "ChaosRecovered");
        assert_eq!(reasons::RECOVERY_FAILED, "RecoveryFailed");
    }

    #[tokio::test]
    async fn test_noop_publisher_does_not_panic() {
        NoopEventPublisher
            .publish(
                &ObjectReference::default(),
                EventType::Warning,
                reasons::APPLY_FAILED,
                actions::APPLY,
                Some("prod/web-1 refused".to_string()),
            )
            .await;
    }
}
