//! # Experiment Status
//!
//! Status types shared by every experiment kind.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a chaos experiment
///
/// Written by the controller through the status subresource. The finalizer
/// set on the object metadata, not this status, is the source of truth for
/// which targets still need recovery.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChaosStatus {
    /// Current lifecycle phase
    #[serde(default)]
    pub phase: Option<ChaosPhase>,
    /// Human-readable description of the current state
    #[serde(default)]
    pub description: Option<String>,
    /// Last failure reason, cleared on the next successful transition
    #[serde(default)]
    pub failed_message: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation observed by the last completed pass
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Time of the last phase transition (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

/// Lifecycle phase of an experiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ChaosPhase {
    /// No fault has been injected yet
    #[default]
    NotInjected,
    /// Targets are marked and injection is in progress (or partially failed)
    Applying,
    /// Every selected target received the fault
    Applied,
    /// Recovery is in progress
    Recovering,
    /// Every tracked target has been recovered
    Recovered,
}

impl ChaosPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ChaosPhase::NotInjected => "NotInjected",
            ChaosPhase::Applying => "Applying",
            ChaosPhase::Applied => "Applied",
            ChaosPhase::Recovering => "Recovering",
            ChaosPhase::Recovered => "Recovered",
        }
    }
}

impl fmt::Display for ChaosPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

/// Condition types written by the reconciler
pub mod condition_types {
    pub const SELECTED: &str = "Selected";
    pub const ALL_INJECTED: &str = "AllInjected";
    pub const ALL_RECOVERED: &str = "AllRecovered";
    pub const PAUSED: &str = "Paused";
}

impl ChaosStatus {
    /// Current phase, treating a missing status as `NotInjected`
    pub fn current_phase(status: Option<&ChaosStatus>) -> ChaosPhase {
        status.and_then(|s| s.phase).unwrap_or_default()
    }

    /// Find a condition by type
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Insert or replace a condition, keeping the transition time when the
    /// status value did not change
    pub fn set_condition(
        &mut self,
        condition_type: &str,
        value: bool,
        reason: &str,
        message: Option<String>,
    ) {
        let status = if value { "True" } else { "False" };
        let now = chrono::Utc::now().to_rfc3339();
        match self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition_type)
        {
            Some(existing) => {
                if existing.status != status {
                    existing.last_transition_time = Some(now);
                }
                existing.status = status.to_string();
                existing.reason = Some(reason.to_string());
                existing.message = message;
            }
            None => self.conditions.push(Condition {
                r#type: condition_type.to_string(),
                status: status.to_string(),
                last_transition_time: Some(now),
                reason: Some(reason.to_string()),
                message,
            }),
        }
    }
}
