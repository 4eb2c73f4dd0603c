//! # Chaos Errors
//!
//! Error taxonomy of a reconciliation pass.
//!
//! `Selection`, `TypeMismatch`, `Cardinality`, `EmptyGroup`, `InvalidSpec`
//! and `UnregisteredKind` abort the pass before anything is mutated.
//! `Injection`, `Timeout` and `Interrupted` are reported after a batch ran;
//! the finalizer set still records every target that may carry the fault.

use crate::crd::ExperimentKind;
use crate::injector::InjectError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChaosError {
    /// Target resolution failed (store unreachable or required auxiliary resource missing)
    #[error("target selection failed: {0}")]
    Selection(String),

    /// An endpoint was handed an experiment of another kind
    #[error("endpoint for {expected} received a {found} object")]
    TypeMismatch {
        expected: ExperimentKind,
        found: ExperimentKind,
    },

    /// Resolved target-group count violates the kind's structure
    #[error("{kind} expects {expected} target group(s), resolved {found}")]
    Cardinality {
        kind: ExperimentKind,
        expected: usize,
        found: usize,
    },

    /// A target group the fault depends on resolved no pods
    #[error("{kind} {group} selector resolved no pods")]
    EmptyGroup {
        kind: ExperimentKind,
        group: &'static str,
    },

    /// The experiment spec is missing parameters its action needs
    #[error("invalid {kind} spec: {reason}")]
    InvalidSpec {
        kind: ExperimentKind,
        reason: String,
    },

    /// At least one target in a batch failed; cites the first failure observed
    #[error("injection into {target} failed: {reason} ({failed}/{total} targets failed)")]
    Injection {
        target: String,
        reason: String,
        failed: usize,
        total: usize,
    },

    /// The batch deadline stopped dispatch before every target was attempted
    #[error("injection batch timed out after {secs}s ({pending}/{total} targets not attempted)")]
    Timeout {
        secs: u64,
        pending: usize,
        total: usize,
    },

    /// Controller shutdown stopped dispatch before every target was attempted
    #[error("injection batch interrupted by shutdown ({pending}/{total} targets not attempted)")]
    Interrupted { pending: usize, total: usize },

    /// A unit was skipped because its batch was already cancelled
    #[error("cancelled before dispatch")]
    Cancelled,

    /// Recovery failed for a still-tracked target
    #[error("recovery of {key} failed: {reason}")]
    Recovery { key: String, reason: String },

    #[error("no endpoint registered for {0}")]
    UnregisteredKind(ExperimentKind),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ChaosError {
    /// Short machine-readable reason, used for metrics labels and event reasons
    pub fn reason(&self) -> &'static str {
        match self {
            ChaosError::Selection(_) => "SelectionFailed",
            ChaosError::TypeMismatch { .. } => "TypeMismatch",
            ChaosError::Cardinality { .. } => "CardinalityMismatch",
            ChaosError::EmptyGroup { .. } => "EmptyTargetGroup",
            ChaosError::InvalidSpec { .. } => "InvalidSpec",
            ChaosError::Injection { .. } => "InjectionFailed",
            ChaosError::Timeout { .. } => "Timeout",
            ChaosError::Interrupted { .. } => "Interrupted",
            ChaosError::Cancelled => "Cancelled",
            ChaosError::Recovery { .. } => "RecoveryFailed",
            ChaosError::UnregisteredKind(_) => "UnregisteredKind",
            ChaosError::Store(_) => "StoreError",
        }
    }

    pub(crate) fn injection(target: impl Into<String>, err: &InjectError) -> Self {
        ChaosError::Injection {
            target: target.into(),
            reason: err.to_string(),
            failed: 1,
            total: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injection_message_cites_target() {
        let err = ChaosError::Injection {
            target: "prod/web-1".to_string(),
            reason: "connection refused".to_string(),
            failed: 1,
            total: 3,
        };
        assert_eq!(
            err.to_string(),
            "injection into prod/web-1 failed: connection refused (1/3 targets failed)"
        );
        assert_eq!(err.reason(), "InjectionFailed");
    }

    #[test]
    fn test_empty_group_names_the_group() {
        let err = ChaosError::EmptyGroup {
            kind: ExperimentKind::Network,
            group: "target",
        };
        assert_eq!(err.to_string(), "NetworkChaos target selector resolved no pods");
        assert_eq!(err.reason(), "EmptyTargetGroup");
    }

    #[test]
    fn test_store_errors_convert() {
        let err: ChaosError = StoreError::Unavailable("down".to_string()).into();
        assert!(matches!(err, ChaosError::Store(_)));
    }
}
