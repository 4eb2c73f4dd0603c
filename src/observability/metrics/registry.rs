//! # Metrics Registry
//!
//! Crate-wide Prometheus registry.

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::{LazyLock, Once};

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static REGISTER: Once = Once::new();

/// Register every metric with [`REGISTRY`]
///
/// Safe to call more than once; only the first call registers.
pub fn register_metrics() -> Result<()> {
    let mut result = Ok(());
    REGISTER.call_once(|| {
        result = super::controller_metrics::register(&REGISTRY)
            .and_then(|()| super::injection_metrics::register(&REGISTRY))
            .context("Failed to register Prometheus metrics");
    });
    result
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather() -> Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}
