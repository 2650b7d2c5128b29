//! # Reconciliation Logic
//!
//! Drives one `PropertyConfig` through fetch, render, format, materialize and
//! report. Errors from `reconcile` are handled by the error policy in
//! `runtime::error_policy`, which owns the retry backoff.

use crate::controller::reconciler::format::{
    build_materialized_data, format_properties, validate_output, Provenance,
};
use crate::controller::reconciler::materialize::{artifact_name, materialize, MaterializeAction};
use crate::controller::reconciler::render::render;
use crate::controller::reconciler::source::SourceRequest;
use crate::controller::reconciler::status::{build_condition, report_condition};
use crate::controller::reconciler::types::{reason, resource_key, Reconciler, ReconcilerError};
use crate::crd::PropertyConfig;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};

/// Pipeline phase, logged as each one starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Fetching,
    Rendering,
    Formatting,
    Materializing,
    Reporting,
    Done,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Result of a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The resource no longer exists, nothing was done
    Deleted,
    Materialized {
        config_map: String,
        commit: String,
        action: MaterializeAction,
    },
}

/// What the pipeline produced for an existing resource
#[derive(Debug)]
struct Materialized {
    config_map: String,
    commit: String,
    action: MaterializeAction,
}

fn enter(phase: ReconcilePhase) {
    debug!(phase = %phase, "reconcile.phase");
}

/// Reconcile the resource identified by `namespace`/`name`
///
/// The resource is read fresh, so a trigger for a deleted object is a no-op.
/// Every attempt on an existing resource ends with one status write that
/// describes its outcome, even when the attempt failed.
pub async fn reconcile_resource(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<ReconcileOutcome, ReconcilerError> {
    let Some(resource) = ctx
        .resources
        .get(namespace, name)
        .await
        .map_err(ReconcilerError::Api)?
    else {
        info!("PropertyConfig {}/{} not found, nothing to do", namespace, name);
        return Ok(ReconcileOutcome::Deleted);
    };

    let start = Instant::now();
    metrics::increment_reconciliations();

    let result = run_pipeline(ctx, &resource).await;

    enter(ReconcilePhase::Reporting);
    let condition = match &result {
        Ok(Materialized {
            config_map,
            commit,
            action,
        }) => {
            let (reason, verb) = match action {
                MaterializeAction::Created => (reason::CREATED, "created"),
                MaterializeAction::Updated => (reason::UPDATED, "updated"),
            };
            build_condition(
                &resource,
                true,
                reason,
                &format!("ConfigMap {config_map} {verb} from commit {commit}"),
                chrono::Utc::now(),
            )
        }
        Err(e) => build_condition(&resource, false, e.reason(), &e.to_string(), chrono::Utc::now()),
    };
    report_condition(ctx.resources.as_ref(), &resource, condition).await;

    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
    let materialized = result?;
    enter(ReconcilePhase::Done);
    Ok(ReconcileOutcome::Materialized {
        config_map: materialized.config_map,
        commit: materialized.commit,
        action: materialized.action,
    })
}

async fn run_pipeline(
    ctx: &Reconciler,
    resource: &PropertyConfig,
) -> Result<Materialized, ReconcilerError> {
    let spec = &resource.spec;
    // Output settings are checked first so bad values cost no network work
    let property_type = validate_output(spec)?;

    enter(ReconcilePhase::Fetching);
    let request = SourceRequest::from_spec(spec);
    let fetched = ctx.fetcher.fetch(&request).await?;

    enter(ReconcilePhase::Rendering);
    let rendered = render(&fetched.contents, &spec.source_config)?;

    enter(ReconcilePhase::Formatting);
    let formatted = format_properties(&rendered, property_type, &spec.key_name)?;
    let provenance = Provenance {
        commit: &fetched.commit,
        repo_url: &spec.repo_url,
        revision: &spec.revision,
        path: &spec.properties_path,
    };
    let data = build_materialized_data(&provenance, formatted);

    enter(ReconcilePhase::Materializing);
    let action = materialize(ctx.artifacts.as_ref(), resource, data).await?;

    Ok(Materialized {
        config_map: artifact_name(resource),
        commit: fetched.commit,
        action,
    })
}

/// Controller entry point
///
/// Success clears the resource's backoff and schedules the periodic resync.
pub async fn reconcile(
    obj: Arc<PropertyConfig>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let span = info_span!(
        "reconcile",
        resource.name = %name,
        resource.namespace = %namespace,
    );

    async move {
        reconcile_resource(&ctx, &namespace, &name).await?;
        ctx.reset_backoff(&resource_key(&namespace, &name));
        Ok(match ctx.config.resync_interval() {
            Some(interval) => Action::requeue(interval),
            None => Action::await_change(),
        })
    }
    .instrument(span)
    .await
}
