//! # Constants
//!
//! Default values and well-known names used across the controller.

/// Field manager / reporting controller name
pub const CONTROLLER_NAME: &str = "chaos-controller";

/// Annotation that ends an experiment without deleting it
pub const PAUSE_ANNOTATION: &str = "experiment.chaos-mesh.org/pause";

/// Default controller namespace when `POD_NAMESPACE` is unset
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "chaos-testing";

/// Default name of the DNS service attached to every target group
pub const DEFAULT_DNS_SERVICE_NAME: &str = "chaos-mesh-dns-server";

/// Default port of the chaos daemon running on every node
pub const DEFAULT_CHAOS_DAEMON_PORT: u16 = 31767;

/// Default bound on concurrently dispatched injections per batch
pub const DEFAULT_MAX_CONCURRENT_INJECTIONS: usize = 16;

/// Default deadline for one injection batch (seconds)
pub const DEFAULT_INJECTION_TIMEOUT_SECS: u64 = 60;

/// Default number of re-reads after a finalizer update conflict
pub const DEFAULT_FINALIZER_CONFLICT_RETRIES: u32 = 5;

/// Requeue delay when no targets were selected (seconds)
pub const DEFAULT_NO_TARGETS_REQUEUE_SECS: u64 = 30;

/// Default HTTP server port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Fallback requeue when backoff state cannot be read (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Watcher timeout; must stay below the client read timeout
pub const WATCH_TIMEOUT_SECS: u32 = 25;
