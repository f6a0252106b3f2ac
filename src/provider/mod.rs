//! # Cloud Load Balancer Adapter
//!
//! Capability contract for the cloud provider's load-balancing primitives.
//!
//! - `rest.rs` - REST client talking to the provider API
//! - `fake.rs` - Deterministic in-memory implementation used by tests
//!
//! Clients are built per reconcile from freshly resolved credentials through a
//! [`CloudClientFactory`]. Neither the factory nor the clients retry; retry
//! policy belongs to the reconciler.

mod fake;
mod rest;

pub use fake::{FakeCloudClientFactory, FakeLoadBalancerApi, LoadBalancerCall};
pub use rest::{RestClientFactory, RestLoadBalancerClient};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the cloud adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("cloud API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("cloud API request failed: {0}")]
    Transport(String),
    #[error("failed to decode cloud API response: {0}")]
    Decode(String),
}

impl AdapterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AdapterError::NotFound(_))
    }
}

/// Load balancer as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: i64,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl LoadBalancer {
    /// Whether the load balancer carries the owner tag of the resource with `uid`
    pub fn is_owned_by(&self, uid: &str) -> bool {
        if uid.is_empty() {
            return false;
        }
        let tag = owner_tag(uid);
        self.tags.iter().any(|t| *t == tag)
    }
}

/// Listener configuration attached to a load balancer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancerConfig {
    pub id: i64,
    #[serde(default, rename = "nodebalancer_id")]
    pub load_balancer_id: i64,
    pub port: i32,
}

/// Desired load balancer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerSpec {
    pub label: String,
    pub region: String,
    pub tags: Vec<String>,
}

/// Desired listener configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadBalancerConfigSpec {
    pub port: i32,
    pub protocol: String,
    pub algorithm: String,
    pub check: String,
}

impl LoadBalancerConfigSpec {
    /// TCP listener with connection health checks, as used for API servers
    pub fn tcp(port: i32) -> Self {
        Self {
            port,
            protocol: "tcp".to_string(),
            algorithm: "roundrobin".to_string(),
            check: "connection".to_string(),
        }
    }
}

/// Cloud load balancer operations consumed by the reconciler
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    async fn create_load_balancer(&self, spec: &LoadBalancerSpec)
        -> Result<LoadBalancer, AdapterError>;

    /// Fetch a load balancer by id
    async fn get_load_balancer(&self, id: i64) -> Result<LoadBalancer, AdapterError>;

    /// Find a load balancer by its unique label, `None` if there is none
    async fn find_load_balancer(&self, label: &str) -> Result<Option<LoadBalancer>, AdapterError>;

    async fn create_load_balancer_config(
        &self,
        load_balancer_id: i64,
        spec: &LoadBalancerConfigSpec,
    ) -> Result<LoadBalancerConfig, AdapterError>;

    /// Delete a load balancer together with its configs
    async fn delete_load_balancer(&self, id: i64) -> Result<(), AdapterError>;
}

/// Builds authenticated cloud clients from a resolved API token
pub trait CloudClientFactory: Send + Sync {
    fn client(&self, token: &str) -> Result<Arc<dyn LoadBalancerApi>, AdapterError>;
}

/// Label identifying the load balancer of a cluster.
///
/// Labels are unique per account but truncated, so distinct clusters can share
/// one. A load balancer found by label is only adopted when it also carries
/// the cluster's [`owner_tag`].
pub fn load_balancer_label(namespace: &str, name: &str) -> String {
    let label = format!("{namespace}-{name}");
    // Provider labels are limited to 32 characters
    label.chars().take(32).collect()
}

/// Tag binding a load balancer to the `ManagedCluster` with this uid
pub fn owner_tag(uid: &str) -> String {
    format!("uid:{uid}")
}

/// Tags attached to every load balancer created for a cluster
pub fn load_balancer_tags(namespace: &str, name: &str, uid: &str) -> Vec<String> {
    let tags: BTreeMap<&str, &str> =
        [("namespace", namespace), ("cluster", name), ("uid", uid)].into();
    tags.into_iter().map(|(k, v)| format!("{k}:{v}")).collect()
}
