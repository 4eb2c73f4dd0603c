//! # Controller Settings
//!
//! Target-selection scope, injection and finalizer settings.

use super::{env_var_or_default, split_list, ConfigError};
use crate::constants::*;
use std::time::Duration;

/// How per-target faults are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InjectorMode {
    /// Call the chaos daemon on the target's node
    #[default]
    Daemon,
    /// Log the injection only (dry run)
    Log,
}

impl std::str::FromStr for InjectorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daemon" => Ok(InjectorMode::Daemon),
            "log" | "dry-run" => Ok(InjectorMode::Log),
            other => Err(format!("unknown injector mode '{other}'")),
        }
    }
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the controller runs in (auxiliary resources live here)
    pub namespace: String,
    /// Select targets across the whole cluster
    /// When false, only `target_namespace` is eligible
    pub cluster_scoped: bool,
    /// The single eligible namespace when not cluster scoped
    pub target_namespace: String,
    /// Namespace patterns targets must match (empty = all)
    pub allowed_namespaces: Vec<String>,
    /// Namespace patterns targets must never match
    pub ignored_namespaces: Vec<String>,
    /// DNS service attached to every target group (None disables the lookup)
    pub dns_service_name: Option<String>,
    /// Fail selection when the DNS service is missing
    pub dns_service_required: bool,
    /// Chaos daemon port on every node
    pub chaos_daemon_port: u16,
    pub injector_mode: InjectorMode,
    /// Bound on in-flight injections in one batch
    pub max_concurrent_injections: usize,
    /// Deadline for one injection batch (seconds)
    pub injection_timeout_secs: u64,
    /// Re-reads allowed after a finalizer update conflict
    pub finalizer_conflict_retries: u32,
    /// Requeue delay when a pass selected no targets (seconds)
    pub no_targets_requeue_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            cluster_scoped: true,
            target_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            allowed_namespaces: Vec::new(),
            ignored_namespaces: Vec::new(),
            dns_service_name: Some(DEFAULT_DNS_SERVICE_NAME.to_string()),
            dns_service_required: false,
            chaos_daemon_port: DEFAULT_CHAOS_DAEMON_PORT,
            injector_mode: InjectorMode::default(),
            max_concurrent_injections: DEFAULT_MAX_CONCURRENT_INJECTIONS,
            injection_timeout_secs: DEFAULT_INJECTION_TIMEOUT_SECS,
            finalizer_conflict_retries: DEFAULT_FINALIZER_CONFLICT_RETRIES,
            no_targets_requeue_secs: DEFAULT_NO_TARGETS_REQUEUE_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let namespace = std::env::var("POD_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTROLLER_NAMESPACE.to_string());
        let target_namespace = std::env::var("TARGET_NAMESPACE")
            .ok()
            .filter(|ns| !ns.trim().is_empty())
            .unwrap_or_else(|| namespace.clone());
        // An explicitly empty name disables the lookup
        let dns_service_name = match std::env::var("CHAOS_DNS_SERVICE_NAME") {
            Ok(name) if name.trim().is_empty() => None,
            Ok(name) => Some(name.trim().to_string()),
            Err(_) => Some(DEFAULT_DNS_SERVICE_NAME.to_string()),
        };

        Self {
            namespace,
            cluster_scoped: env_var_or_default("CLUSTER_SCOPED", true),
            target_namespace,
            allowed_namespaces: split_list(
                &std::env::var("ALLOWED_NAMESPACES").unwrap_or_default(),
            ),
            ignored_namespaces: split_list(
                &std::env::var("IGNORED_NAMESPACES").unwrap_or_default(),
            ),
            dns_service_name,
            dns_service_required: env_var_or_default("CHAOS_DNS_SERVICE_REQUIRED", false),
            chaos_daemon_port: env_var_or_default("CHAOS_DAEMON_PORT", DEFAULT_CHAOS_DAEMON_PORT),
            injector_mode: env_var_or_default("INJECTOR_MODE", InjectorMode::Daemon),
            max_concurrent_injections: env_var_or_default(
                "MAX_CONCURRENT_INJECTIONS",
                DEFAULT_MAX_CONCURRENT_INJECTIONS,
            ),
            injection_timeout_secs: env_var_or_default(
                "INJECTION_TIMEOUT_SECS",
                DEFAULT_INJECTION_TIMEOUT_SECS,
            ),
            finalizer_conflict_retries: env_var_or_default(
                "FINALIZER_CONFLICT_RETRIES",
                DEFAULT_FINALIZER_CONFLICT_RETRIES,
            ),
            no_targets_requeue_secs: env_var_or_default(
                "NO_TARGETS_REQUEUE_SECS",
                DEFAULT_NO_TARGETS_REQUEUE_SECS,
            ),
        }
    }

    /// Reject settings that would stall every pass
    ///
    /// # Errors
    ///
    /// Returns an error when a bound that must be positive is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_injections == 0 {
            return Err(ConfigError::MustBePositive("MAX_CONCURRENT_INJECTIONS"));
        }
        if self.injection_timeout_secs == 0 {
            return Err(ConfigError::MustBePositive("INJECTION_TIMEOUT_SECS"));
        }
        Ok(())
    }

    pub fn injection_timeout(&self) -> Duration {
        Duration::from_secs(self.injection_timeout_secs)
    }

    pub fn no_targets_requeue(&self) -> Duration {
        Duration::from_secs(self.no_targets_requeue_secs)
    }
}
