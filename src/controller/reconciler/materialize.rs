//! # Materialization
//!
//! Creates or replaces the ConfigMap owned by a `PropertyConfig`.

use crate::constants::{CONTROLLER_NAME, CREATED_BY_LABEL};
use crate::crd::PropertyConfig;
use crate::observability::metrics;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// ConfigMap access used by materialization
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> anyhow::Result<Option<ConfigMap>>;
    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> anyhow::Result<ConfigMap>;
    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> anyhow::Result<ConfigMap>;
}

#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("PropertyConfig {0} has no uid, cannot set ConfigMap owner")]
    MissingOwner(String),
    #[error("failed to read ConfigMap {name}: {source:#}")]
    Read {
        name: String,
        source: anyhow::Error,
    },
    #[error("failed to create ConfigMap {name}: {source:#}")]
    Create {
        name: String,
        source: anyhow::Error,
    },
    #[error("failed to update ConfigMap {name}: {source:#}")]
    Update {
        name: String,
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeAction {
    Created,
    Updated,
}

/// Name of the ConfigMap a resource publishes to
#[must_use]
pub fn artifact_name(resource: &PropertyConfig) -> String {
    if resource.spec.artifact_name.is_empty() {
        resource.name_any()
    } else {
        resource.spec.artifact_name.clone()
    }
}

/// Desired ConfigMap for a resource
///
/// The resource's own labels are applied over `created-by`, and its
/// annotations are copied as they are.
pub fn desired_config_map(
    resource: &PropertyConfig,
    data: BTreeMap<String, String>,
) -> Result<ConfigMap, MaterializeError> {
    let owner = resource
        .controller_owner_ref(&())
        .ok_or_else(|| MaterializeError::MissingOwner(resource.name_any()))?;

    let mut labels = BTreeMap::from([(
        CREATED_BY_LABEL.to_string(),
        CONTROLLER_NAME.to_string(),
    )]);
    labels.extend(resource.labels().clone());
    let annotations = resource.annotations().clone();

    Ok(ConfigMap {
        metadata: ObjectMeta {
            name: Some(artifact_name(resource)),
            namespace: resource.namespace(),
            labels: Some(labels),
            annotations: (!annotations.is_empty()).then_some(annotations),
            owner_references: Some(vec![owner]),
            ..ObjectMeta::default()
        },
        data: Some(data),
        ..ConfigMap::default()
    })
}

/// Create the ConfigMap, or replace it wholesale when it already exists
///
/// Replacement carries no `resourceVersion`, so it is last-writer-wins.
pub async fn materialize(
    store: &dyn ArtifactStore,
    resource: &PropertyConfig,
    data: BTreeMap<String, String>,
) -> Result<MaterializeAction, MaterializeError> {
    let desired = desired_config_map(resource, data)?;
    let name = artifact_name(resource);
    let namespace = resource.namespace().unwrap_or_default();

    let existing = store
        .get(&namespace, &name)
        .await
        .map_err(|source| MaterializeError::Read {
            name: name.clone(),
            source,
        })?;

    if existing.is_none() {
        store
            .create(&namespace, &desired)
            .await
            .map_err(|source| MaterializeError::Create {
                name: name.clone(),
                source,
            })?;
        metrics::increment_configmaps_created();
        info!("Created ConfigMap {}/{}", namespace, name);
        Ok(MaterializeAction::Created)
    } else {
        store
            .replace(&namespace, &desired)
            .await
            .map_err(|source| MaterializeError::Update {
                name: name.clone(),
                source,
            })?;
        metrics::increment_configmaps_updated();
        info!("Updated ConfigMap {}/{}", namespace, name);
        Ok(MaterializeAction::Updated)
    }
}
