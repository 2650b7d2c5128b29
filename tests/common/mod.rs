//! Common test utilities for reconciliation tests
//!
//! In-memory stand-ins for the Kubernetes API and the git fetcher, plus
//! builders for `PropertyConfig` resources.

#![allow(dead_code, reason = "Each test binary uses a different subset")]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use property_config_controller::config::ControllerConfig;
use property_config_controller::controller::reconciler::materialize::ArtifactStore;
use property_config_controller::controller::reconciler::source::{
    FetchError, FetchStage, FetchedSource, SourceFetcher, SourceRequest,
};
use property_config_controller::controller::reconciler::status::PropertyConfigStore;
use property_config_controller::controller::reconciler::Reconciler;
use property_config_controller::crd::{PropertyConfig, PropertyConfigSpec, PropertyConfigStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "team-a";
pub const COMMIT: &str = "9fceb02d0ae598e95dc970b74767f19372d61af8";

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

/// PropertyConfig and ConfigMap objects held in memory
#[derive(Debug, Default)]
pub struct FakeCluster {
    resources: Mutex<HashMap<Key, PropertyConfig>>,
    config_maps: Mutex<HashMap<Key, ConfigMap>>,
    pub status_writes: AtomicUsize,
    pub config_map_writes: AtomicUsize,
    pub fail_status_writes: AtomicBool,
    pub fail_config_map_writes: AtomicBool,
    pub fail_config_map_reads: AtomicBool,
}

impl FakeCluster {
    pub fn insert_resource(&self, resource: PropertyConfig) {
        let namespace = resource.metadata.namespace.clone().unwrap_or_default();
        let name = resource.metadata.name.clone().unwrap_or_default();
        self.resources
            .lock()
            .unwrap()
            .insert(key(&namespace, &name), resource);
    }

    pub fn resource(&self, namespace: &str, name: &str) -> Option<PropertyConfig> {
        self.resources
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn insert_config_map(&self, config_map: ConfigMap) {
        let namespace = config_map.metadata.namespace.clone().unwrap_or_default();
        let name = config_map.metadata.name.clone().unwrap_or_default();
        self.config_maps
            .lock()
            .unwrap()
            .insert(key(&namespace, &name), config_map);
    }

    pub fn config_map(&self, namespace: &str, name: &str) -> Option<ConfigMap> {
        self.config_maps
            .lock()
            .unwrap()
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn config_map_count(&self) -> usize {
        self.config_maps.lock().unwrap().len()
    }
}

#[async_trait]
impl PropertyConfigStore for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<PropertyConfig>> {
        Ok(self.resource(namespace, name))
    }

    async fn patch_status(
        &self,
        namespace: &str,
        name: &str,
        status: &PropertyConfigStatus,
    ) -> Result<()> {
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_status_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("status subresource unavailable"));
        }
        let mut resources = self.resources.lock().unwrap();
        let resource = resources
            .get_mut(&key(namespace, name))
            .ok_or_else(|| anyhow!("propertyconfigs {name} not found"))?;
        resource.status = Some(status.clone());
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FakeCluster {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ConfigMap>> {
        if self.fail_config_map_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("configmaps {name} is forbidden"));
        }
        Ok(self.config_map(namespace, name))
    }

    async fn create(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.config_map_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_config_map_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("admission webhook denied the request"));
        }
        let name = config_map.metadata.name.clone().unwrap_or_default();
        let mut config_maps = self.config_maps.lock().unwrap();
        if config_maps.contains_key(&key(namespace, &name)) {
            return Err(anyhow!("configmaps {name} already exists"));
        }
        config_maps.insert(key(namespace, &name), config_map.clone());
        Ok(config_map.clone())
    }

    async fn replace(&self, namespace: &str, config_map: &ConfigMap) -> Result<ConfigMap> {
        self.config_map_writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_config_map_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("admission webhook denied the request"));
        }
        let name = config_map.metadata.name.clone().unwrap_or_default();
        let mut config_maps = self.config_maps.lock().unwrap();
        if !config_maps.contains_key(&key(namespace, &name)) {
            return Err(anyhow!("configmaps {name} not found"));
        }
        config_maps.insert(key(namespace, &name), config_map.clone());
        Ok(config_map.clone())
    }
}

/// Serves files from memory as if they were checked out at `COMMIT`
#[derive(Debug, Default)]
pub struct FakeFetcher {
    files: Mutex<HashMap<String, Vec<u8>>>,
    pub calls: AtomicUsize,
    pub fail_clone: AtomicBool,
}

impl FakeFetcher {
    pub fn with_file(path: &str, contents: &str) -> Self {
        let fetcher = Self::default();
        fetcher.set_file(path, contents);
        fetcher
    }

    pub fn set_file(&self, path: &str, contents: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.as_bytes().to_vec());
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch(&self, request: &SourceRequest) -> Result<FetchedSource, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_clone.load(Ordering::SeqCst) {
            return Err(FetchError::new(
                FetchStage::Clone,
                None,
                format!("cannot fetch revision {} from {}", request.revision, request.repo_url),
            ));
        }
        let files = self.files.lock().unwrap();
        match files.get(&request.properties_path) {
            Some(contents) => Ok(FetchedSource {
                commit: COMMIT.to_string(),
                contents: contents.clone(),
            }),
            None => Err(FetchError::new(
                FetchStage::ReadFile,
                Some(COMMIT.to_string()),
                format!(
                    "cannot read properties file {}: No such file or directory",
                    request.properties_path
                ),
            )),
        }
    }
}

pub fn spec(property_type: &str) -> PropertyConfigSpec {
    PropertyConfigSpec {
        artifact_name: String::new(),
        repo_url: "https://git.example.com/platform/orders.git".to_string(),
        revision: "main".to_string(),
        properties_path: "config/application.properties".to_string(),
        source_config: "database:\n  host: db.internal\n  port: 5432\n".to_string(),
        property_type: property_type.to_string(),
        key_name: String::new(),
        ca_path: String::new(),
    }
}

pub fn property_config(name: &str, spec: PropertyConfigSpec) -> PropertyConfig {
    let mut resource = PropertyConfig::new(name, spec);
    resource.metadata.namespace = Some(NAMESPACE.to_string());
    resource.metadata.uid = Some(format!("uid-{name}"));
    resource.metadata.generation = Some(1);
    resource
}

/// Reconciler over the given fakes with a default configuration
pub fn reconciler(cluster: &Arc<FakeCluster>, fetcher: &Arc<FakeFetcher>) -> Reconciler {
    Reconciler::with_components(
        Arc::clone(cluster) as _,
        Arc::clone(cluster) as _,
        Arc::clone(fetcher) as _,
        ControllerConfig::default(),
    )
}
