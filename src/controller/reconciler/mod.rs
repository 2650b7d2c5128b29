//! # Reconciler
//!
//! Core reconciliation logic for `PropertyConfig` resources.
//!
//! ## Reconciliation Flow
//!
//! 1. Re-read the resource (deleted resources are a no-op)
//! 2. Validate `propertyType` and `keyName`
//! 3. Fetch the properties template from Git at the pinned revision
//! 4. Render it against `sourceConfig`
//! 5. Format the result as `kvp` entries or a single key, plus provenance
//! 6. Create or replace the owned ConfigMap
//! 7. Write the `ConfigMapCreated` condition

pub mod format;
pub mod kube_store;
pub mod materialize;
pub mod reconcile;
pub mod render;
pub mod source;
pub mod status;
pub mod types;

// Re-export public API
pub use reconcile::{reconcile, reconcile_resource, ReconcileOutcome, ReconcilePhase};
pub use types::{resource_key, BackoffState, Reconciler, ReconcilerError};
