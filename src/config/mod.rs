//! # Controller Configuration
//!
//! Controller-level configuration loaded from environment variables (populated from ConfigMap).
//!
//! All configuration has sensible defaults and can be overridden via environment variables.
//! Environment variables are populated from a ConfigMap using `envFrom` in the deployment.

mod controller;
mod server;

pub use controller::{ControllerConfig, InjectorMode};
pub use server::ServerConfig;

use thiserror::Error;

/// Configuration that cannot be turned into a working controller
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid namespace pattern '{pattern}' in {variable}: {source}")]
    InvalidNamespacePattern {
        variable: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("{0} must be greater than 0")]
    MustBePositive(&'static str),
}

/// Load configuration from environment variables with defaults
pub fn load_config() -> (ControllerConfig, ServerConfig) {
    (ControllerConfig::from_env(), ServerConfig::from_env())
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Split a comma-separated environment value, dropping empty entries
pub(crate) fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(str::to_string)
        .collect()
}
