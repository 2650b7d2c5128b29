//! # Initialization
//!
//! Process startup: crypto provider, logging, metrics, probe server and the
//! Kubernetes client.

use crate::config::ControllerConfig;
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::crd::PropertyConfig;
use crate::observability;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{api::Api, Client};
use std::sync::Arc;
use tracing::{error, info};

pub struct InitializationResult {
    pub client: Client,
    pub configs: Api<PropertyConfig>,
    pub config_maps: Api<ConfigMap>,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

pub async fn initialize() -> Result<InitializationResult> {
    // Only fails when a provider was already installed, which is fine
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = ControllerConfig::from_env();
    observability::logging::init_tracing(&config);

    info!(
        "Starting Property Config Controller v{}",
        env!("CARGO_PKG_VERSION")
    );

    observability::metrics::register_metrics().context("Failed to register metrics")?;

    let server_state = Arc::new(ServerState::default());
    let server_port = config.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let (configs, config_maps) = if config.watch_namespace.is_empty() {
        info!("Watching PropertyConfig resources in all namespaces");
        (Api::all(client.clone()), Api::all(client.clone()))
    } else {
        info!(
            "Watching PropertyConfig resources in namespace {}",
            config.watch_namespace
        );
        (
            Api::namespaced(client.clone(), &config.watch_namespace),
            Api::namespaced(client.clone(), &config.watch_namespace),
        )
    };

    let reconciler = Arc::new(Reconciler::new(client.clone(), config));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        configs,
        config_maps,
        reconciler,
        server_state,
    })
}
