//! # Cluster Scope
//!
//! Per-reconcile unit of work.
//!
//! A scope bundles everything one reconcile needs: the store handle, the
//! owner `Cluster`, a mutable copy of the `ManagedCluster`, and a cloud client
//! built from freshly resolved credentials. It also keeps a snapshot of the
//! `ManagedCluster` as it was read, so that [`ClusterScope::close`] can commit
//! every in-memory change as a single patch.

use super::credentials::{resolve_credentials, CredentialSource};
use super::types::ReconcilerError;
use crate::crd::{Cluster, ManagedCluster};
use crate::provider::{CloudClientFactory, LoadBalancerApi};
use crate::store::{ManagedClusterPatch, ObjectStore};
use kube::ResourceExt;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs of [`ClusterScope::new`]. Every field is required.
#[derive(Default)]
pub struct ClusterScopeParams {
    pub store: Option<Arc<dyn ObjectStore>>,
    pub owner: Option<Cluster>,
    pub managed_cluster: Option<ManagedCluster>,
    pub cloud: Option<Arc<dyn CloudClientFactory>>,
}

impl std::fmt::Debug for ClusterScopeParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterScopeParams")
            .field("store", &self.store.is_some())
            .field("owner", &self.owner.as_ref().map(ResourceExt::name_any))
            .field(
                "managed_cluster",
                &self.managed_cluster.as_ref().map(ResourceExt::name_any),
            )
            .field("cloud", &self.cloud.is_some())
            .finish()
    }
}

/// Unit of work for one `ManagedCluster` reconcile
pub struct ClusterScope {
    store: Arc<dyn ObjectStore>,
    pub owner: Cluster,
    pub managed_cluster: ManagedCluster,
    pub client: Arc<dyn LoadBalancerApi>,
    credential_source: CredentialSource,
    snapshot: Value,
}

impl std::fmt::Debug for ClusterScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterScope")
            .field("owner", &self.owner.name_any())
            .field("managed_cluster", &self.managed_cluster.name_any())
            .field("credential_source", &self.credential_source)
            .finish_non_exhaustive()
    }
}

impl ClusterScope {
    /// Validate inputs, resolve credentials and snapshot the `ManagedCluster`
    ///
    /// # Errors
    /// - [`ReconcilerError::Validation`] naming the first missing input
    /// - [`ReconcilerError::Credential`] if no token can be resolved or no client built
    /// - [`ReconcilerError::Schema`] if the store does not know the `ManagedCluster` kind
    pub async fn new(
        explicit_token: &str,
        params: ClusterScopeParams,
    ) -> Result<Self, ReconcilerError> {
        let store = params
            .store
            .ok_or_else(|| ReconcilerError::Validation("store is required when creating a ClusterScope".to_string()))?;
        let owner = params
            .owner
            .ok_or_else(|| ReconcilerError::Validation("cluster is required when creating a ClusterScope".to_string()))?;
        let managed_cluster = params.managed_cluster.ok_or_else(|| {
            ReconcilerError::Validation("managed cluster is required when creating a ClusterScope".to_string())
        })?;
        let cloud = params.cloud.ok_or_else(|| {
            ReconcilerError::Validation("cloud client factory is required when creating a ClusterScope".to_string())
        })?;

        let namespace = managed_cluster.namespace().unwrap_or_default();
        let credentials = resolve_credentials(
            store.as_ref(),
            explicit_token,
            &namespace,
            managed_cluster.spec.credentials_ref.as_ref(),
            owner.spec.credentials_ref.as_ref(),
        )
        .await?;
        let client = cloud.client(credentials.token()).map_err(|e| {
            ReconcilerError::Credential(format!("failed to create cloud client: {e}"))
        })?;

        if !store.scheme().recognizes::<ManagedCluster>() {
            return Err(ReconcilerError::Schema(
                "ManagedCluster is not registered with the object store scheme".to_string(),
            ));
        }
        let snapshot = serde_json::to_value(&managed_cluster)
            .map_err(|e| ReconcilerError::Schema(format!("failed to snapshot ManagedCluster: {e}")))?;

        Ok(Self {
            store,
            owner,
            managed_cluster,
            client,
            credential_source: credentials.source(),
            snapshot,
        })
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credential_source
    }

    /// The commit `close` would issue for the current in-memory state
    ///
    /// # Errors
    /// Returns an error if the `ManagedCluster` cannot be serialized.
    pub fn pending_patch(&self) -> Result<ManagedClusterPatch, ReconcilerError> {
        let current = serde_json::to_value(&self.managed_cluster)
            .map_err(|e| ReconcilerError::Schema(format!("failed to serialize ManagedCluster: {e}")))?;

        let (before_object, before_status) = split_status(&self.snapshot);
        let (after_object, after_status) = split_status(&current);

        let object = merge_patch_diff(&before_object, &after_object).map(|mut patch| {
            // Pin the version we read so a concurrent writer turns this commit into a conflict
            if let (Some(patch), Some(rv)) = (
                patch.as_object_mut(),
                self.snapshot.pointer("/metadata/resourceVersion"),
            ) {
                let metadata = patch
                    .entry("metadata")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Some(metadata) = metadata.as_object_mut() {
                    metadata.insert("resourceVersion".to_string(), rv.clone());
                }
            }
            patch
        });
        let status = merge_patch_diff(&before_status, &after_status);

        Ok(ManagedClusterPatch { object, status })
    }

    /// Commit all in-memory changes with at most one store call
    ///
    /// A `NotFound` response is ignored: the object may have been deleted
    /// concurrently, or removed by the store once its last finalizer went.
    ///
    /// # Errors
    /// Returns any other store error, e.g. [`ReconcilerError::Conflict`].
    pub async fn close(self) -> Result<(), ReconcilerError> {
        let patch = self.pending_patch()?;
        if patch.is_empty() {
            debug!("no changes to commit");
            return Ok(());
        }

        let namespace = self.managed_cluster.namespace().unwrap_or_default();
        let name = self.managed_cluster.name_any();
        match self
            .store
            .patch_managed_cluster(&namespace, &name, &patch)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!(error = %e, "ManagedCluster disappeared before commit");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to commit ManagedCluster changes");
                Err(e.into())
            }
        }
    }
}

/// Split a serialized resource into (everything but status, status)
fn split_status(value: &Value) -> (Value, Value) {
    let mut object = value.clone();
    let status = object
        .as_object_mut()
        .and_then(|o| o.remove("status"))
        .unwrap_or(Value::Null);
    (object, status)
}

/// JSON merge patch (RFC 7386) turning `before` into `after`, `None` if they are equal
pub fn merge_patch_diff(before: &Value, after: &Value) -> Option<Value> {
    match (before, after) {
        (Value::Object(b), Value::Object(a)) => {
            let mut patch = Map::new();
            for (key, after_value) in a {
                match b.get(key) {
                    Some(before_value) => {
                        if let Some(diff) = merge_patch_diff(before_value, after_value) {
                            patch.insert(key.clone(), diff);
                        }
                    }
                    None => {
                        patch.insert(key.clone(), after_value.clone());
                    }
                }
            }
            for key in b.keys() {
                if !a.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            (!patch.is_empty()).then_some(Value::Object(patch))
        }
        // A nested object replacing a scalar must be sent whole
        _ if before == after => None,
        _ => Some(after.clone()),
    }
}
