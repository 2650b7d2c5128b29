//! # Types
//!
//! Reconciler context and the error taxonomy shared by every pipeline stage.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::format::FormatError;
use crate::controller::reconciler::kube_store::KubeStore;
use crate::controller::reconciler::materialize::{ArtifactStore, MaterializeError};
use crate::controller::reconciler::render::RenderError;
use crate::controller::reconciler::source::{
    EnvCredentialProvider, FetchError, GitSourceFetcher, SourceFetcher,
};
use crate::controller::reconciler::status::PropertyConfigStore;
use kube::Client;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Condition reasons written to `PropertyConfig` status
pub mod reason {
    pub const CREATED: &str = "Created";
    pub const UPDATED: &str = "Updated";
    pub const FETCH_FAILED: &str = "FetchFailed";
    pub const RENDER_FAILED: &str = "RenderFailed";
    pub const FORMAT_INVALID: &str = "FormatInvalid";
    pub const CREATE_FAILED: &str = "CreateFailed";
    pub const UPDATE_FAILED: &str = "UpdateFailed";
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The PropertyConfig itself could not be read
    #[error("failed to read PropertyConfig: {0:#}")]
    Api(anyhow::Error),
    #[error(transparent)]
    FetchFailed(#[from] FetchError),
    #[error(transparent)]
    RenderFailed(#[from] RenderError),
    #[error(transparent)]
    FormatInvalid(#[from] FormatError),
    #[error(transparent)]
    CreateFailed(MaterializeError),
    #[error(transparent)]
    UpdateFailed(MaterializeError),
}

impl From<MaterializeError> for ReconcilerError {
    fn from(error: MaterializeError) -> Self {
        match error {
            MaterializeError::Update { .. } => ReconcilerError::UpdateFailed(error),
            _ => ReconcilerError::CreateFailed(error),
        }
    }
}

impl ReconcilerError {
    /// Condition reason for this failure
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::FetchFailed(_) => reason::FETCH_FAILED,
            ReconcilerError::RenderFailed(_) => reason::RENDER_FAILED,
            ReconcilerError::FormatInvalid(_) => reason::FORMAT_INVALID,
            ReconcilerError::UpdateFailed(_) => reason::UPDATE_FAILED,
            ReconcilerError::CreateFailed(_) | ReconcilerError::Api(_) => reason::CREATE_FAILED,
        }
    }

    /// Whether retrying is pointless until the PropertyConfig changes
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ReconcilerError::RenderFailed(_) | ReconcilerError::FormatInvalid(_)
        )
    }
}

/// Backoff state for a specific resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl BackoffState {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            backoff: FibonacciBackoff::new(min_minutes, max_minutes),
            error_count: 0,
        }
    }
}

/// Shared context handed to every reconciliation
pub struct Reconciler {
    pub resources: Arc<dyn PropertyConfigStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub config: ControllerConfig,
    /// Backoff state per resource (identified by namespace/name)
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Build a reconciler backed by the Kubernetes API and the git CLI
    #[must_use]
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        let store = Arc::new(KubeStore::new(client, config.api_timeout()));
        let credentials = Arc::new(EnvCredentialProvider::new(
            &config.git_username_env,
            &config.git_password_env,
        ));
        let fetcher = Arc::new(GitSourceFetcher::new(
            &config.git_binary,
            config.checkout_base_dir.clone(),
            config.git_timeout(),
            credentials,
        ));
        Self::with_components(Arc::clone(&store) as _, store, fetcher, config)
    }

    /// Build a reconciler from explicit components
    #[must_use]
    pub fn with_components(
        resources: Arc<dyn PropertyConfigStore>,
        artifacts: Arc<dyn ArtifactStore>,
        fetcher: Arc<dyn SourceFetcher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            resources,
            artifacts,
            fetcher,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Advance the backoff for a resource, returning the delay and the error count
    pub fn next_backoff(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states.entry(resource_key.to_string()).or_insert_with(|| {
                    BackoffState::new(
                        self.config.backoff_min_minutes,
                        self.config.backoff_max_minutes,
                    )
                });
                state.error_count += 1;
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Forget the backoff for a resource after a successful reconciliation
    pub fn reset_backoff(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(resource_key);
        }
    }
}

/// Key used for per-resource state
#[must_use]
pub fn resource_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}
