//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `property_config_reconciliations_total` - Total number of reconciliations
//! - `property_config_reconciliation_errors_total` - Reconciliation errors by condition reason
//! - `property_config_reconciliation_duration_seconds` - Duration of reconciliations
//! - `property_config_requeues_total` - Requeues by cause
//! - `property_config_git_fetch_total` - Total number of git fetches
//! - `property_config_git_fetch_errors_total` - Total number of failed git fetches
//! - `property_config_git_fetch_duration_seconds` - Duration of git fetches
//! - `property_config_configmaps_created_total` - ConfigMaps created
//! - `property_config_configmaps_updated_total` - ConfigMaps replaced
//! - `property_config_status_write_failures_total` - Status writes that failed

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "property_config_reconciliation_errors_total",
            "Total number of reconciliation errors by condition reason",
        ),
        &["reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "property_config_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 120.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "property_config_requeues_total",
            "Total number of requeues by cause",
        ),
        &["cause"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static GIT_FETCH_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_git_fetch_total",
        "Total number of git fetch operations",
    )
    .expect("Failed to create GIT_FETCH_TOTAL metric - this should never happen")
});

static GIT_FETCH_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_git_fetch_errors_total",
        "Total number of git fetch errors",
    )
    .expect("Failed to create GIT_FETCH_ERRORS_TOTAL metric - this should never happen")
});

static GIT_FETCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "property_config_git_fetch_duration_seconds",
            "Duration of git fetch operations in seconds",
        )
        .buckets(vec![0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("Failed to create GIT_FETCH_DURATION metric - this should never happen")
});

static CONFIGMAPS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_configmaps_created_total",
        "Total number of ConfigMaps created",
    )
    .expect("Failed to create CONFIGMAPS_CREATED_TOTAL metric - this should never happen")
});

static CONFIGMAPS_UPDATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_configmaps_updated_total",
        "Total number of ConfigMaps replaced",
    )
    .expect("Failed to create CONFIGMAPS_UPDATED_TOTAL metric - this should never happen")
});

static STATUS_WRITE_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "property_config_status_write_failures_total",
        "Total number of failed PropertyConfig status writes",
    )
    .expect("Failed to create STATUS_WRITE_FAILURES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Registration only fails when called twice"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GIT_FETCH_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GIT_FETCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GIT_FETCH_DURATION.clone()))?;
    REGISTRY.register(Box::new(CONFIGMAPS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CONFIGMAPS_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STATUS_WRITE_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Snapshot of every registered metric family
#[must_use]
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    REGISTRY.gather()
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(reason: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(cause: &str) {
    REQUEUES_TOTAL.with_label_values(&[cause]).inc();
}

pub fn increment_git_fetch_total() {
    GIT_FETCH_TOTAL.inc();
}

pub fn increment_git_fetch_errors_total() {
    GIT_FETCH_ERRORS_TOTAL.inc();
}

pub fn observe_git_fetch_duration(duration: f64) {
    GIT_FETCH_DURATION.observe(duration);
}

pub fn increment_configmaps_created() {
    CONFIGMAPS_CREATED_TOTAL.inc();
}

pub fn increment_configmaps_updated() {
    CONFIGMAPS_UPDATED_TOTAL.inc();
}

pub fn increment_status_write_failures() {
    STATUS_WRITE_FAILURES_TOTAL.inc();
}
