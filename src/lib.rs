//! Property Config Controller Library
//!
//! This library provides the core functionality for the Property Config Controller.
//! It renders templated properties files fetched from Git against inline YAML
//! configuration and publishes the result as a ConfigMap owned by the
//! `PropertyConfig` resource that requested it.
//!
//! The outcome is reported as a `ConfigMapCreated` condition; earlier
//! controllers for this resource spelled it `ConfigmapCreated`.
//!
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
