//! # Kubernetes Object Store
//!
//! [`ObjectStore`] backed by the Kubernetes API server.

use super::{ManagedClusterPatch, ObjectStore, Scheme, StoreError};
use crate::constants::FIELD_MANAGER;
use crate::crd::{Cluster, ManagedCluster};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Object store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    scheme: Scheme,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore")
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            scheme: Scheme::with_defaults(),
        }
    }
}

/// Map a kube client error onto the store taxonomy
fn classify(err: kube::Error, kind: &str, namespace: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: api_err.message.clone(),
        },
        other => StoreError::Api(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedCluster>, StoreError> {
        let api: Api<ManagedCluster> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "ManagedCluster", namespace, name))
    }

    async fn get_owner_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, StoreError> {
        let api: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "Cluster", namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| classify(e, "Secret", namespace, name))
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        api.replace(&name, &PostParams::default(), secret)
            .await
            .map_err(|e| classify(e, "Secret", &namespace, &name))?;
        Ok(())
    }

    async fn patch_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &ManagedClusterPatch,
    ) -> Result<(), StoreError> {
        let api: Api<ManagedCluster> = Api::namespaced(self.client.clone(), namespace);
        let params = PatchParams::apply(FIELD_MANAGER);

        // Object first: it carries the resourceVersion precondition. Removing
        // the last finalizer may delete the object, so the status write after
        // it can legitimately return NotFound.
        if let Some(object) = &patch.object {
            debug!(resource.namespace = namespace, resource.name = name, "patching ManagedCluster");
            api.patch(name, &params, &Patch::Merge(object))
                .await
                .map_err(|e| classify(e, "ManagedCluster", namespace, name))?;
        }

        if let Some(status) = &patch.status {
            debug!(resource.namespace = namespace, resource.name = name, "patching ManagedCluster status");
            let body = serde_json::json!({ "status": status });
            api.patch_status(name, &params, &Patch::Merge(&body))
                .await
                .map_err(|e| classify(e, "ManagedCluster", namespace, name))?;
        }

        Ok(())
    }

    fn scheme(&self) -> &Scheme {
        &self.scheme
    }
}
