//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.

use crate::controller::reconciler::{resource_key, Reconciler, ReconcilerError};
use crate::crd::PropertyConfig;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Decide when a failed resource is retried
///
/// Failures caused by the resource's own fields wait for the resource to
/// change. Everything else is retried with a per-resource Fibonacci backoff.
pub fn handle_reconciliation_error(
    obj: Arc<PropertyConfig>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let _error_guard = tracing::span!(
        tracing::Level::ERROR,
        "controller.reconciliation_error",
        resource.name = %name,
        resource.namespace = %namespace,
        reason = error.reason(),
    )
    .entered();

    metrics::increment_reconciliation_errors(error.reason());

    if error.is_permanent() {
        warn!(
            "Reconciliation of {}/{} failed ({}): {}; waiting for the resource to change",
            namespace,
            name,
            error.reason(),
            error
        );
        return Action::await_change();
    }

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);
    let (delay, error_count) = ctx.next_backoff(&resource_key(&namespace, &name));
    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {}, next retry: {})",
        delay.as_secs(),
        error_count,
        next_trigger_time.to_rfc3339()
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Classify a controller stream error
///
/// Returns `true` when the stream should keep running and `false` when the
/// watch is better restarted.
pub fn handle_watch_stream_error(error_string: &str) -> bool {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");

    if is_not_found {
        warn!(
            "Object not found during watch, it may have been deleted: {}",
            error_string
        );
        true
    } else if is_410 {
        warn!("Watch resource version expired (410), watch will restart");
        false
    } else {
        error!("Controller stream error: {}", error_string);
        true
    }
}
