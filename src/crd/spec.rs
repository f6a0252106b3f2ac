//! # ManagedCluster Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};

/// ManagedCluster Custom Resource Definition
///
/// Infrastructure counterpart of a Cluster API `Cluster`. The controller
/// provisions a cloud load balancer in front of the control plane and records
/// its address in `controlPlaneEndpoint`.
///
/// # Example
///
/// ```yaml
/// apiVersion: infrastructure.cluster.x-k8s.io/v1alpha1
/// kind: ManagedCluster
/// metadata:
///   name: demo
///   namespace: default
///   ownerReferences:
///     - apiVersion: cluster.x-k8s.io/v1beta1
///       kind: Cluster
///       name: demo
///       uid: 3c0e2d6e-0000-0000-0000-000000000000
/// spec:
///   region: us-ord
///   credentialsRef:
///     name: demo-credentials
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "ManagedCluster",
    group = "infrastructure.cluster.x-k8s.io",
    version = "v1alpha1",
    namespaced,
    status = "crate::crd::ManagedClusterStatus",
    shortname = "mcl",
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}, {"name":"Endpoint", "type":"string", "jsonPath":".spec.controlPlaneEndpoint.host"}, {"name":"Reason", "type":"string", "jsonPath":".status.failureReason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    /// Region the load balancer is created in
    #[serde(default)]
    pub region: String,
    /// Endpoint used to reach the control plane.
    /// Populated by the controller once the load balancer exists.
    #[serde(default)]
    pub control_plane_endpoint: ApiEndpoint,
    /// References to the external load balancer resources
    #[serde(default)]
    pub network: NetworkSpec,
    /// Secret holding the cloud API token for this cluster.
    /// Takes precedence over the owner cluster and the controller-wide token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<SecretRef>,
}

/// Host and port of an API server
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiEndpoint {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: i32,
}

impl ApiEndpoint {
    /// An endpoint counts as provisioned once it has a host
    pub fn is_set(&self) -> bool {
        !self.host.is_empty()
    }
}

/// External load balancer references
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    /// Identity of the provisioned load balancer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_id: Option<i64>,
    /// Identity of the load balancer's listener configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_config_id: Option<i64>,
    /// Listener port. Defaults to 6443.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer_port: Option<i32>,
}

impl NetworkSpec {
    /// Listener port with the default applied
    pub fn port(&self) -> i32 {
        self.load_balancer_port
            .unwrap_or(crate::constants::DEFAULT_LOAD_BALANCER_PORT)
    }
}

/// Reference to a Secret. An empty namespace means the namespace of the referencing object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl SecretRef {
    /// Namespace of the secret, falling back to the referencing object's namespace
    pub fn namespace_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => ns,
            _ => fallback,
        }
    }
}
