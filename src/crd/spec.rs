//! # PropertyConfig Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// PropertyConfig Custom Resource Definition
///
/// Describes a properties template in a Git repository, the YAML data to render it
/// with, and the ConfigMap the rendered result is published to.
///
/// # Example
///
/// ```yaml
/// apiVersion: config-management.octopilot.io/v1alpha1
/// kind: PropertyConfig
/// metadata:
///   name: orders-service
///   namespace: default
/// spec:
///   artifactName: orders-service-properties
///   repoUrl: https://github.com/example/orders-service.git
///   revision: main
///   propertiesPath: deploy/application.properties
///   propertyType: kvp
///   sourceConfig: |
///     database:
///       host: db.internal
///       port: 5432
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "PropertyConfig",
    group = "config-management.octopilot.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::PropertyConfigStatus",
    shortname = "pcfg",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ConfigMapCreated\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"ConfigMapCreated\")].reason"}, {"name":"Revision", "type":"string", "jsonPath":".spec.revision"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfigSpec {
    /// Name of the ConfigMap to write
    /// Defaults to the PropertyConfig name when empty
    #[serde(default)]
    pub artifact_name: String,
    /// Git repository URL (https:// or file://)
    #[serde(default)]
    pub repo_url: String,
    /// Branch, tag or full commit id to fetch
    #[serde(default)]
    pub revision: String,
    /// Path of the properties template relative to the repository root
    #[serde(default)]
    pub properties_path: String,
    /// YAML document whose values are exposed to the template by name
    #[serde(default)]
    pub source_config: String,
    /// How the rendered template becomes ConfigMap data: `kvp` or `key`
    /// Kept as a string so an unrecognized value is reported on status
    pub property_type: String,
    /// ConfigMap key holding the whole rendered template (required for `key`)
    #[serde(default)]
    pub key_name: String,
    /// PEM file on the controller filesystem trusted in addition to the system roots
    #[serde(default)]
    pub ca_path: String,
}

/// How rendered text is turned into ConfigMap data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    /// One `key=value` entry per line
    Kvp,
    /// The whole rendered text under a single key
    Key,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized propertyType '{0}' (expected 'kvp' or 'key')")]
pub struct UnknownPropertyType(pub String);

impl PropertyType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Kvp => "kvp",
            PropertyType::Key => "key",
        }
    }
}

impl FromStr for PropertyType {
    type Err = UnknownPropertyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kvp" => Ok(PropertyType::Kvp),
            "key" => Ok(PropertyType::Key),
            other => Err(UnknownPropertyType(other.to_string())),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
