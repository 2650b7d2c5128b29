//! # Custom Resource Definitions
//!
//! CRD types for the Property Config Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `PropertyConfig` specification and the recognized property types
//! - `status.rs` - Status and condition types reported after each reconciliation

mod spec;
mod status;

pub use spec::{PropertyConfig, PropertyConfigSpec, PropertyType, UnknownPropertyType};
pub use status::{Condition, PropertyConfigStatus};
