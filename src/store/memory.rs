//! # In-Memory Object Store
//!
//! Deterministic [`ObjectStore`] used by unit and integration tests.
//!
//! Behaves like the API server where the reconciler can observe it:
//! resource versions are bumped on every write, stale writes are rejected with
//! `Conflict`, and an object marked for deletion disappears once its last
//! finalizer is removed. Every call is counted so tests can assert how many
//! commits a reconcile issued.

use super::{ManagedClusterPatch, ObjectStore, Scheme, StoreError};
use crate::crd::{Cluster, ManagedCluster};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

#[derive(Debug, Default)]
struct State {
    clusters: BTreeMap<Key, ManagedCluster>,
    owners: BTreeMap<Key, Cluster>,
    secrets: BTreeMap<Key, Secret>,
    next_version: u64,
    patch_calls: usize,
    secret_updates: usize,
    patch_failures: VecDeque<StoreError>,
}

impl State {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }
}

/// In-memory object store
#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    scheme: Scheme,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_scheme(Scheme::with_defaults())
    }

    /// Store with a custom scheme, e.g. one missing `ManagedCluster`
    pub fn with_scheme(scheme: Scheme) -> Self {
        Self {
            state: Mutex::new(State::default()),
            scheme,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A panicking test thread must not hide the state from the assertions that follow
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert_managed_cluster(&self, mut cluster: ManagedCluster) {
        let mut state = self.lock();
        cluster.metadata.resource_version = Some(state.bump());
        let k = key(&cluster.namespace().unwrap_or_default(), &cluster.name_any());
        state.clusters.insert(k, cluster);
    }

    pub fn insert_owner_cluster(&self, mut cluster: Cluster) {
        let mut state = self.lock();
        cluster.metadata.resource_version = Some(state.bump());
        let k = key(&cluster.namespace().unwrap_or_default(), &cluster.name_any());
        state.owners.insert(k, cluster);
    }

    pub fn insert_secret(&self, mut secret: Secret) {
        let mut state = self.lock();
        secret.metadata.resource_version = Some(state.bump());
        let k = key(&secret.namespace().unwrap_or_default(), &secret.name_any());
        state.secrets.insert(k, secret);
    }

    pub fn managed_cluster(&self, namespace: &str, name: &str) -> Option<ManagedCluster> {
        self.lock().clusters.get(&key(namespace, name)).cloned()
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.lock().secrets.get(&key(namespace, name)).cloned()
    }

    /// Number of `patch_managed_cluster` calls received, including failed ones
    pub fn patch_calls(&self) -> usize {
        self.lock().patch_calls
    }

    /// Number of `update_secret` calls received, including failed ones
    pub fn secret_updates(&self) -> usize {
        self.lock().secret_updates
    }

    /// Make the next `patch_managed_cluster` call fail with `err`
    pub fn fail_next_patch(&self, err: StoreError) {
        self.lock().patch_failures.push_back(err);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedCluster>, StoreError> {
        Ok(self.managed_cluster(namespace, name))
    }

    async fn get_owner_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, StoreError> {
        Ok(self.lock().owners.get(&key(namespace, name)).cloned())
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.secret(namespace, name))
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.secret_updates += 1;

        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let k = key(&namespace, &name);
        let Some(current) = state.secrets.get(&k) else {
            return Err(StoreError::NotFound {
                kind: "Secret".to_string(),
                namespace,
                name,
            });
        };
        if current.metadata.resource_version != secret.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: "Secret".to_string(),
                namespace,
                name,
                message: "the object has been modified".to_string(),
            });
        }

        let mut updated = secret.clone();
        updated.metadata.resource_version = Some(state.bump());
        state.secrets.insert(k, updated);
        Ok(())
    }

    async fn patch_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &ManagedClusterPatch,
    ) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.patch_calls += 1;
        if let Some(err) = state.patch_failures.pop_front() {
            return Err(err);
        }

        let k = key(namespace, name);
        let not_found = || StoreError::NotFound {
            kind: "ManagedCluster".to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        let current = state.clusters.get(&k).ok_or_else(not_found)?;
        let mut doc =
            serde_json::to_value(current).map_err(|e| StoreError::Api(e.to_string()))?;

        if let Some(object) = &patch.object {
            let expected = object
                .pointer("/metadata/resourceVersion")
                .and_then(|v| v.as_str());
            if expected.is_some() && expected != current.metadata.resource_version.as_deref() {
                return Err(StoreError::Conflict {
                    kind: "ManagedCluster".to_string(),
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                    message: "the object has been modified".to_string(),
                });
            }
            json_patch::merge(&mut doc, object);
        }
        if let Some(status) = &patch.status {
            json_patch::merge(&mut doc, &serde_json::json!({ "status": status }));
        }

        let mut updated: ManagedCluster =
            serde_json::from_value(doc).map_err(|e| StoreError::Api(e.to_string()))?;
        let drained = updated.metadata.deletion_timestamp.is_some()
            && updated.finalizers().is_empty();
        if drained {
            state.clusters.remove(&k);
        } else {
            updated.metadata.resource_version = Some(state.bump());
            state.clusters.insert(k, updated);
        }
        Ok(())
    }

    fn scheme(&self) -> &Scheme {
        &self.scheme
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ManagedClusterSpec;

    fn cluster() -> ManagedCluster {
        let mut c = ManagedCluster::new("demo", ManagedClusterSpec::default());
        c.metadata.namespace = Some("default".to_string());
        c
    }

    #[tokio::test]
    async fn test_patch_with_stale_resource_version_conflicts() {
        let store = MemoryStore::new();
        store.insert_managed_cluster(cluster());

        let patch = ManagedClusterPatch {
            object: Some(serde_json::json!({
                "metadata": { "resourceVersion": "999" },
                "spec": { "region": "us-ord" }
            })),
            status: None,
        };
        let err = store
            .patch_managed_cluster("default", "demo", &patch)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.patch_calls(), 1);
    }

    #[tokio::test]
    async fn test_patch_applies_object_and_status() {
        let store = MemoryStore::new();
        store.insert_managed_cluster(cluster());
        let rv = store
            .managed_cluster("default", "demo")
            .and_then(|c| c.metadata.resource_version)
            .unwrap();

        let patch = ManagedClusterPatch {
            object: Some(serde_json::json!({
                "metadata": { "resourceVersion": rv },
                "spec": { "region": "us-ord" }
            })),
            status: Some(serde_json::json!({ "ready": true })),
        };
        store
            .patch_managed_cluster("default", "demo", &patch)
            .await
            .unwrap();

        let stored = store.managed_cluster("default", "demo").unwrap();
        assert_eq!(stored.spec.region, "us-ord");
        assert!(stored.status.unwrap().ready);
        assert_ne!(stored.metadata.resource_version.as_deref(), Some(rv.as_str()));
    }
}
