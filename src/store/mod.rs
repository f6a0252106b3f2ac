//! # Object Store
//!
//! Capability contract for the declarative object store the controller reads
//! from and commits to.
//!
//! - `kubernetes.rs` - Kubernetes API server backed implementation
//! - `memory.rs` - Deterministic in-memory implementation used by tests
//!
//! The reconciler only depends on [`ObjectStore`], so the same workflow runs
//! against a live cluster or against [`MemoryStore`].

mod kubernetes;
mod memory;

pub use kubernetes::KubeStore;
pub use memory::MemoryStore;

use crate::crd::{Cluster, ManagedCluster};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors returned by object store operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    /// Optimistic concurrency rejection: the object changed since it was read
    #[error("conflict writing {kind} {namespace}/{name}: {message}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        message: String,
    },
    #[error("object store request failed: {0}")]
    Api(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// A single commit against a `ManagedCluster`.
///
/// Both parts are JSON merge patches. The object part carries
/// `metadata.resourceVersion` so that a concurrent writer causes a conflict
/// instead of a silent overwrite. Implementations backed by a status
/// subresource apply the status part separately.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManagedClusterPatch {
    pub object: Option<serde_json::Value>,
    pub status: Option<serde_json::Value>,
}

impl ManagedClusterPatch {
    pub fn is_empty(&self) -> bool {
        self.object.is_none() && self.status.is_none()
    }
}

/// Registry of the resource kinds a store knows how to persist
#[derive(Debug, Clone, Default)]
pub struct Scheme {
    kinds: BTreeSet<(String, String)>,
}

impl Scheme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheme with every kind this controller reads or writes
    pub fn with_defaults() -> Self {
        let mut scheme = Self::new();
        scheme.register::<ManagedCluster>();
        scheme.register::<Cluster>();
        scheme.register::<Secret>();
        scheme
    }

    pub fn register<K: Resource<DynamicType = ()>>(&mut self) {
        self.kinds.insert((
            K::api_version(&()).into_owned(),
            K::kind(&()).into_owned(),
        ));
    }

    pub fn recognizes<K: Resource<DynamicType = ()>>(&self) -> bool {
        self.kinds.contains(&(
            K::api_version(&()).into_owned(),
            K::kind(&()).into_owned(),
        ))
    }
}

/// Declarative object store consumed by the reconciler
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch a `ManagedCluster`, `None` if it does not exist
    async fn get_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedCluster>, StoreError>;

    /// Fetch the owning Cluster API `Cluster`, `None` if it does not exist
    async fn get_owner_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, StoreError>;

    /// Fetch a Secret, `None` if it does not exist
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Replace a Secret. Fails with `Conflict` if its resourceVersion is stale.
    async fn update_secret(&self, secret: &Secret) -> Result<(), StoreError>;

    /// Apply one commit to a `ManagedCluster`
    async fn patch_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &ManagedClusterPatch,
    ) -> Result<(), StoreError>;

    /// Kinds this store can persist
    fn scheme(&self) -> &Scheme;
}
