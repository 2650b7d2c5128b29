//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    /// `RUST_LOG` takes precedence when set
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Namespace to watch; empty watches all namespaces
    pub watch_namespace: String,
    /// Directory under which request-scoped checkouts are created
    pub checkout_base_dir: PathBuf,
    /// git executable used for fetches
    pub git_binary: String,
    /// Deadline for a whole git fetch (seconds)
    pub git_timeout_secs: u64,
    /// Deadline for each Kubernetes API call (seconds)
    pub api_timeout_secs: u64,
    /// Requeue interval after a successful reconciliation (seconds, 0 = wait for changes)
    pub resync_interval_secs: u64,
    /// Fibonacci backoff bounds for failed reconciliations (minutes)
    pub backoff_min_minutes: u64,
    pub backoff_max_minutes: u64,
    /// Delay before restarting the watch stream after it ends (seconds)
    pub watch_restart_delay_secs: u64,
    /// Environment variable holding the git username
    pub git_username_env: String,
    /// Environment variable holding the git password or token
    pub git_password_env: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            metrics_port: DEFAULT_METRICS_PORT,
            watch_namespace: String::new(),
            checkout_base_dir: PathBuf::from(DEFAULT_CHECKOUT_BASE_DIR),
            git_binary: DEFAULT_GIT_BINARY.to_string(),
            git_timeout_secs: DEFAULT_GIT_TIMEOUT_SECS,
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            git_username_env: DEFAULT_GIT_USERNAME_ENV.to_string(),
            git_password_env: DEFAULT_GIT_PASSWORD_ENV.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            watch_namespace: env_var_or_default_str("WATCH_NAMESPACE", ""),
            checkout_base_dir: PathBuf::from(env_var_or_default_str(
                "CHECKOUT_BASE_DIR",
                DEFAULT_CHECKOUT_BASE_DIR,
            )),
            git_binary: env_var_or_default_str("GIT_BINARY", DEFAULT_GIT_BINARY),
            git_timeout_secs: env_var_or_default("GIT_TIMEOUT_SECS", DEFAULT_GIT_TIMEOUT_SECS),
            api_timeout_secs: env_var_or_default("API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                DEFAULT_RESYNC_INTERVAL_SECS,
            ),
            backoff_min_minutes: env_var_or_default(
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: env_var_or_default(
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            git_username_env: env_var_or_default_str("GIT_USERNAME_ENV", DEFAULT_GIT_USERNAME_ENV),
            git_password_env: env_var_or_default_str("GIT_PASSWORD_ENV", DEFAULT_GIT_PASSWORD_ENV),
        }
    }

    /// Get git fetch deadline
    #[must_use]
    pub fn git_timeout(&self) -> Duration {
        Duration::from_secs(self.git_timeout_secs)
    }

    /// Get Kubernetes API call deadline
    #[must_use]
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Get the requeue interval after success, `None` when periodic resync is disabled
    #[must_use]
    pub fn resync_interval(&self) -> Option<Duration> {
        (self.resync_interval_secs > 0).then(|| Duration::from_secs(self.resync_interval_secs))
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
