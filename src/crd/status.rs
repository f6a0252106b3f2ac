//! # ManagedCluster Status
//!
//! Status types for tracking readiness, failures and conditions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of the ManagedCluster resource
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterStatus {
    /// True once the load balancer and its listener exist and the endpoint is populated
    #[serde(default)]
    pub ready: bool,
    /// Machine-readable reason of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<ClusterStatusError>,
    /// Human-readable message of the last failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Failure reasons surfaced on `status.failureReason`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ClusterStatusError {
    InvalidConfiguration,
    UnsupportedChange,
    CreateError,
    UpdateError,
    DeleteError,
}

impl ClusterStatusError {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatusError::InvalidConfiguration => "InvalidConfiguration",
            ClusterStatusError::UnsupportedChange => "UnsupportedChange",
            ClusterStatusError::CreateError => "CreateError",
            ClusterStatusError::UpdateError => "UpdateError",
            ClusterStatusError::DeleteError => "DeleteError",
        }
    }
}

impl fmt::Display for ClusterStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition represents a typed, timestamped observation of the resource
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Severity of a False condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,
    /// Last transition time (RFC3339)
    pub last_transition_time: String,
    /// Reason for the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Severity of a False condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionSeverity {
    Error,
    Warning,
    Info,
}
