//! # Finalizers
//!
//! Idempotent add/remove of the provider finalizer.
//!
//! On the `ManagedCluster` the change is made in memory only and persisted by
//! the scope's commit. On the credentials secret the change is written
//! immediately, with a single update and only when something changed.
//!
//! The secret finalizer is a presence marker, not a reference count: when two
//! clusters share one secret, deleting either removes the protection for both.

use super::types::ReconcilerError;
use crate::constants::FINALIZER;
use crate::crd::ManagedCluster;
use crate::store::ObjectStore;
use kube::ResourceExt;
use tracing::{debug, info};

pub fn has_finalizer<K: ResourceExt>(obj: &K) -> bool {
    obj.finalizers().iter().any(|f| f == FINALIZER)
}

/// Add the provider finalizer. Returns whether the object changed.
pub fn add_finalizer<K: ResourceExt>(obj: &mut K) -> bool {
    if has_finalizer(obj) {
        return false;
    }
    obj.finalizers_mut().push(FINALIZER.to_string());
    true
}

/// Remove the provider finalizer. Returns whether the object changed.
pub fn remove_finalizer<K: ResourceExt>(obj: &mut K) -> bool {
    let before = obj.finalizers().len();
    obj.finalizers_mut().retain(|f| f != FINALIZER);
    obj.finalizers().len() != before
}

/// Protect the referenced credentials secret from deletion
///
/// No-op when the cluster carries no `credentialsRef`.
///
/// # Errors
/// Returns an error if the secret cannot be read or updated. A missing secret
/// is a [`ReconcilerError::Credential`] error.
pub async fn add_credentials_ref_finalizer(
    store: &dyn ObjectStore,
    cluster: &ManagedCluster,
) -> Result<bool, ReconcilerError> {
    let Some(secret_ref) = cluster.spec.credentials_ref.as_ref() else {
        return Ok(false);
    };
    let namespace = cluster.namespace().unwrap_or_default();
    let secret_namespace = secret_ref.namespace_or(&namespace);

    let mut secret = store
        .get_secret(secret_namespace, &secret_ref.name)
        .await?
        .ok_or_else(|| {
            ReconcilerError::Credential(format!(
                "credentials secret {secret_namespace}/{} not found",
                secret_ref.name
            ))
        })?;

    if !add_finalizer(&mut secret) {
        debug!(secret = %secret_ref.name, "credentials secret already protected");
        return Ok(false);
    }
    store.update_secret(&secret).await?;
    info!(secret.namespace = secret_namespace, secret.name = %secret_ref.name, "added finalizer to credentials secret");
    Ok(true)
}

/// Release the referenced credentials secret
///
/// No-op when the cluster carries no `credentialsRef` or the secret is already gone.
///
/// # Errors
/// Returns an error if the secret cannot be read or updated.
pub async fn remove_credentials_ref_finalizer(
    store: &dyn ObjectStore,
    cluster: &ManagedCluster,
) -> Result<bool, ReconcilerError> {
    let Some(secret_ref) = cluster.spec.credentials_ref.as_ref() else {
        return Ok(false);
    };
    let namespace = cluster.namespace().unwrap_or_default();
    let secret_namespace = secret_ref.namespace_or(&namespace);

    let Some(mut secret) = store.get_secret(secret_namespace, &secret_ref.name).await? else {
        debug!(secret = %secret_ref.name, "credentials secret already deleted");
        return Ok(false);
    };

    if !remove_finalizer(&mut secret) {
        return Ok(false);
    }
    store.update_secret(&secret).await?;
    info!(secret.namespace = secret_namespace, secret.name = %secret_ref.name, "removed finalizer from credentials secret");
    Ok(true)
}
