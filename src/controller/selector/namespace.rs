//! # Namespace Policy
//!
//! Decides which namespaces the controller may select targets from.
//!
//! Filters compose in a fixed order: scope, then allow list, then ignore list.
//! The ignore list always wins.

use crate::config::{ConfigError, ControllerConfig};
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use regex::Regex;

#[derive(Debug, Clone)]
pub struct NamespacePolicy {
    /// `None` when cluster scoped
    scope: Option<String>,
    allowed: Vec<Regex>,
    ignored: Vec<Regex>,
}

/// Compile patterns anchored at both ends so plain names match exactly
fn compile(variable: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
                ConfigError::InvalidNamespacePattern {
                    variable,
                    pattern: pattern.clone(),
                    source,
                }
            })
        })
        .collect()
}

impl NamespacePolicy {
    /// # Errors
    ///
    /// Returns an error when an allow or ignore pattern is not a valid regex.
    pub fn new(
        cluster_scoped: bool,
        target_namespace: &str,
        allowed: &[String],
        ignored: &[String],
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            scope: (!cluster_scoped).then(|| target_namespace.to_string()),
            allowed: compile("ALLOWED_NAMESPACES", allowed)?,
            ignored: compile("IGNORED_NAMESPACES", ignored)?,
        })
    }

    /// # Errors
    ///
    /// Returns an error when an allow or ignore pattern is not a valid regex.
    pub fn from_config(config: &ControllerConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.cluster_scoped,
            &config.target_namespace,
            &config.allowed_namespaces,
            &config.ignored_namespaces,
        )
    }

    /// The single eligible namespace when not cluster scoped
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    pub fn permits(&self, namespace: &str) -> bool {
        if self.scope.as_deref().is_some_and(|scope| scope != namespace) {
            return false;
        }
        if !self.allowed.is_empty() && !self.allowed.iter().any(|re| re.is_match(namespace)) {
            return false;
        }
        !self.ignored.iter().any(|re| re.is_match(namespace))
    }

    pub fn filter_pods(&self, pods: Vec<Pod>) -> Vec<Pod> {
        pods.into_iter()
            .filter(|pod| self.permits(&pod.namespace().unwrap_or_default()))
            .collect()
    }
}
