//! # PropertyConfig Status
//!
//! Status types for tracking the outcome of the last reconciliation.

use serde::{Deserialize, Serialize};

/// Status of the PropertyConfig resource
///
/// Holds exactly one condition describing the last reconciliation attempt.
/// The list is replaced, never appended to.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PropertyConfigStatus {
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False)
    pub status: String,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
    /// Last transition time (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Generation of the resource this condition was computed from
    #[serde(default)]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Whether the condition reports success
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == "True"
    }
}
