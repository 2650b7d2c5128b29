//! # Status
//!
//! Builds and writes the single `ConfigMapCreated` condition.

use crate::constants::CONDITION_TYPE_CONFIGMAP_CREATED;
use crate::crd::{Condition, PropertyConfig, PropertyConfigStatus};
use crate::observability::metrics;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use kube::ResourceExt;
use tracing::warn;

/// PropertyConfig access used by the reconciler
#[async_trait]
pub trait PropertyConfigStore: Send + Sync {
    /// `None` when the resource no longer exists
    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<PropertyConfig>>;
    /// Replace `.status` with `status`
    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PropertyConfigStatus,
    ) -> anyhow::Result<()>;
}

/// Condition describing the outcome of one attempt
///
/// The previous `lastTransitionTime` is kept when nothing about the condition
/// changed, so repeated identical outcomes produce identical status. `now` is
/// only stamped on an actual transition, following the Kubernetes condition
/// convention rather than refreshing the time on every attempt.
#[must_use]
pub fn build_condition(
    resource: &PropertyConfig,
    succeeded: bool,
    reason: &str,
    message: &str,
    now: DateTime<Utc>,
) -> Condition {
    let mut condition = Condition {
        r#type: CONDITION_TYPE_CONFIGMAP_CREATED.to_string(),
        status: if succeeded { "True" } else { "False" }.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        observed_generation: resource.metadata.generation,
    };

    let previous = resource
        .status
        .as_ref()
        .and_then(|s| s.conditions.iter().find(|c| c.r#type == condition.r#type));
    if let Some(previous) = previous {
        let unchanged = previous.status == condition.status
            && previous.reason == condition.reason
            && previous.message == condition.message
            && previous.observed_generation == condition.observed_generation;
        if unchanged && previous.last_transition_time.is_some() {
            condition
                .last_transition_time
                .clone_from(&previous.last_transition_time);
        }
    }
    condition
}

/// Write `condition` as the resource's only condition
///
/// Failures are logged and counted but never returned, so the outcome of the
/// attempt stays the outcome of the pipeline. Returns whether the write succeeded.
pub async fn report_condition(
    store: &dyn PropertyConfigStore,
    resource: &PropertyConfig,
    condition: Condition,
) -> bool {
    let status = PropertyConfigStatus {
        conditions: vec![condition],
    };
    let namespace = resource.namespace().unwrap_or_default();
    match store
        .patch_status(&namespace, &resource.name_any(), &status)
        .await
    {
        Ok(()) => true,
        Err(e) => {
            metrics::increment_status_write_failures();
            warn!(
                "Failed to update status of {}/{}: {:#}",
                namespace,
                resource.name_any(),
                e
            );
            false
        }
    }
}
