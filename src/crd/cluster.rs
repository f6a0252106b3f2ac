//! # Owner Cluster
//!
//! Minimal projection of the Cluster API `Cluster` object.
//!
//! Only the fields this controller reads are declared; unknown fields are
//! ignored on deserialization. The CRD itself is installed by Cluster API, so
//! this type is never passed to `crdgen`.

use super::spec::SecretRef;
use serde::{Deserialize, Serialize};

/// Cluster API `Cluster`, the owner of a `ManagedCluster`
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Cluster",
    group = "cluster.x-k8s.io",
    version = "v1beta1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    /// Paused clusters are not reconciled
    #[serde(default)]
    pub paused: bool,
    /// Reference to the infrastructure object (our `ManagedCluster`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infrastructure_ref: Option<InfrastructureRef>,
    /// Cluster-wide credentials used when the infrastructure object carries none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<SecretRef>,
}

/// Object reference to the infrastructure provider's cluster object
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureRef {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
