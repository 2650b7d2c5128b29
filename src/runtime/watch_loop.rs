//! # Watch Loop
//!
//! Controller watch loop over `PropertyConfig` resources and the ConfigMaps
//! they own.

use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::PropertyConfig;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

type ControllerResult =
    Result<(ObjectRef<PropertyConfig>, Action), controller::Error<ReconcilerError, watcher::Error>>;

/// Run the controller until SIGINT or SIGTERM
///
/// The watch is restarted after the configured delay whenever its stream ends
/// for any other reason.
pub async fn run_watch_loop(
    configs: Api<PropertyConfig>,
    config_maps: Api<ConfigMap>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_shutdown_listener(Arc::clone(&shutdown), Arc::clone(&server_state));

    let restart_delay = reconciler.config.watch_restart_delay();
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        info!("Starting controller watch loop...");
        server_state.set_ready(true);

        Controller::new(configs.clone(), watcher::Config::default().any_semantic())
            .owns(config_maps.clone(), watcher::Config::default())
            .shutdown_on_signal()
            .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
            .take_while(|result| futures::future::ready(keep_watching(result)))
            .for_each(|_| futures::future::ready(()))
            .await;

        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        server_state.set_ready(false);
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            restart_delay.as_secs()
        );
        tokio::time::sleep(restart_delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

fn keep_watching(result: &ControllerResult) -> bool {
    match result {
        Ok((obj, action)) => {
            debug!("Reconciled {}: {:?}", obj, action);
            true
        }
        // Already logged and scheduled by the error policy
        Err(controller::Error::ReconcilerFailed(_, obj)) => {
            debug!("Reconcile of {} failed", obj);
            true
        }
        Err(controller::Error::ObjectNotFound(obj)) => {
            debug!("{} was deleted before it could be reconciled", obj);
            true
        }
        Err(e) => handle_watch_stream_error(&e.to_string()),
    }
}

fn spawn_shutdown_listener(shutdown: Arc<AtomicBool>, server_state: Arc<ServerState>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, initiating graceful shutdown...");
        shutdown.store(true, Ordering::Relaxed);
        server_state.set_ready(false);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            warn!("Cannot listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
