//! # Logging
//!
//! tracing subscriber setup. `RUST_LOG` wins when set, otherwise the
//! configured level applies to this crate and kube libraries log at `warn`.

use crate::config::ControllerConfig;
use tracing_subscriber::EnvFilter;

/// Default filter directive for a log level name such as `INFO`
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("property_config_controller={level},kube=warn,kube_runtime=warn")
}

/// Install the global subscriber; `json` format unless `text` is configured
pub fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let result = if config.log_format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}
