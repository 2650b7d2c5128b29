//! # Kubernetes Store
//!
//! `ArtifactStore` and `PropertyConfigStore` backed by the Kubernetes API.
//! Every call is bounded by the configured API timeout.

use crate::constants::CONTROLLER_NAME;
use crate::controller::reconciler::materialize::ArtifactStore;
use crate::controller::reconciler::status::PropertyConfigStore;
use crate::crd::{PropertyConfig, PropertyConfigStatus};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use std::future::Future;
use std::time::Duration;

#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    timeout: Duration,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    #[must_use]
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

async fn with_timeout<T, F>(timeout: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, kube::Error>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.with_context(|| format!("{operation} failed")),
        Err(_) => Err(anyhow!(
            "{operation} did not complete within {}s",
            timeout.as_secs()
        )),
    }
}

#[async_trait]
impl ArtifactStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout(self.timeout, "get ConfigMap", api.get_opt(name)).await
    }

    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout(
            self.timeout,
            "create ConfigMap",
            api.create(&Self::post_params(), config_map),
        )
        .await
    }

    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        let name = config_map
            .metadata
            .name
            .as_deref()
            .context("ConfigMap has no name")?;
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        with_timeout(
            self.timeout,
            "replace ConfigMap",
            api.replace(name, &Self::post_params(), config_map),
        )
        .await
    }
}

#[async_trait]
impl PropertyConfigStore for KubeStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PropertyConfig>> {
        let api: Api<PropertyConfig> = Api::namespaced(self.client.clone(), namespace);
        with_timeout(self.timeout, "get PropertyConfig", api.get_opt(name)).await
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PropertyConfigStatus,
    ) -> Result<()> {
        let api: Api<PropertyConfig> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "status": status });
        with_timeout(
            self.timeout,
            "patch PropertyConfig status",
            api.patch_status(name, &PatchParams::apply(CONTROLLER_NAME), &Patch::Merge(&patch)),
        )
        .await?;
        Ok(())
    }
}
