//! # Property Config Controller
//!
//! A Kubernetes controller that renders templated properties files from Git
//! into ConfigMaps.
//!
//! For each `PropertyConfig` resource the controller fetches one file from a
//! Git repository at a pinned revision, renders it against the YAML in
//! `spec.sourceConfig`, and publishes the result as a ConfigMap owned by the
//! resource. The outcome of every attempt is written to a single
//! `ConfigMapCreated` status condition.

use anyhow::Result;
use property_config_controller::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(
        init.configs,
        init.config_maps,
        init.reconciler,
        init.server_state,
    )
    .await
}
