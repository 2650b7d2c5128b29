//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used as field manager and in the `created-by` label of materialized ConfigMaps
pub const CONTROLLER_NAME: &str = "property-config-controller";

/// Label key stamped on every ConfigMap the controller writes
pub const CREATED_BY_LABEL: &str = "created-by";

/// Condition type reported on `PropertyConfig` status
///
/// Spelled `ConfigMapCreated` to match the Kubernetes kind. Observers keyed on
/// the older `ConfigmapCreated` literal need updating.
pub const CONDITION_TYPE_CONFIGMAP_CREATED: &str = "ConfigMapCreated";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Base directory for request-scoped git checkouts
pub const DEFAULT_CHECKOUT_BASE_DIR: &str = "/tmp/pcc";

/// Default git executable
pub const DEFAULT_GIT_BINARY: &str = "git";

/// Default deadline for a single git fetch (seconds)
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 120;

/// Default deadline for a single Kubernetes API round-trip (seconds)
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 30;

/// Default interval between successful reconciliations (seconds)
/// Picks up new commits on branch revisions; 0 disables periodic resync
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Default Fibonacci backoff bounds for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Default delay before restarting the watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Environment variables holding git credentials, by default
pub const DEFAULT_GIT_USERNAME_ENV: &str = "GIT_USERNAME";
pub const DEFAULT_GIT_PASSWORD_ENV: &str = "GIT_PASSWORD";

/// Well-known locations of the system CA bundle, checked in order
pub const SYSTEM_CA_BUNDLE_PATHS: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];
