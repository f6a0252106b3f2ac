//! # Credential Resolution
//!
//! Resolves the cloud API token for one reconcile.
//!
//! Exactly one source is chosen, by fixed precedence:
//! 1. the `ManagedCluster`'s own `credentialsRef`
//! 2. the owner `Cluster`'s `credentialsRef`
//! 3. the controller-wide token
//!
//! A reference that is set but unusable is an error; resolution never falls
//! through to a lower-precedence source in that case.

use super::types::ReconcilerError;
use crate::constants::CREDENTIALS_TOKEN_KEY;
use crate::crd::SecretRef;
use crate::store::ObjectStore;
use tracing::debug;
use zeroize::Zeroizing;

/// Where a resolved token came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    ManagedCluster,
    OwnerCluster,
    Controller,
}

/// Resolved cloud API credentials. Never persisted, wiped on drop.
pub struct Credentials {
    token: Zeroizing<String>,
    source: CredentialSource,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"***")
            .field("source", &self.source)
            .finish()
    }
}

impl Credentials {
    pub fn token(&self) -> &str {
        self.token.as_str()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

/// Resolve credentials for a resource living in `namespace`
///
/// # Errors
/// Returns [`ReconcilerError::Credential`] when the selected secret is missing,
/// lacks the token key, or when no source is available at all.
pub async fn resolve_credentials(
    store: &dyn ObjectStore,
    explicit_token: &str,
    namespace: &str,
    primary_ref: Option<&SecretRef>,
    owner_ref: Option<&SecretRef>,
) -> Result<Credentials, ReconcilerError> {
    let (secret_ref, source) = match (primary_ref, owner_ref) {
        (Some(r), _) => (r, CredentialSource::ManagedCluster),
        (None, Some(r)) => (r, CredentialSource::OwnerCluster),
        (None, None) if !explicit_token.is_empty() => {
            debug!("using controller-wide API token");
            return Ok(Credentials {
                token: Zeroizing::new(explicit_token.to_string()),
                source: CredentialSource::Controller,
            });
        }
        (None, None) => return Err(ReconcilerError::Credential("no credentials".to_string())),
    };

    let token = token_from_secret(store, secret_ref, namespace).await?;
    debug!(source = ?source, secret = %secret_ref.name, "resolved API token from secret");
    Ok(Credentials {
        token: Zeroizing::new(token),
        source,
    })
}

/// Read the token key of the referenced secret
async fn token_from_secret(
    store: &dyn ObjectStore,
    secret_ref: &SecretRef,
    namespace: &str,
) -> Result<String, ReconcilerError> {
    let secret_namespace = secret_ref.namespace_or(namespace);
    let secret = store
        .get_secret(secret_namespace, &secret_ref.name)
        .await
        .map_err(|e| {
            ReconcilerError::Credential(format!(
                "failed to get credentials secret {secret_namespace}/{}: {e}",
                secret_ref.name
            ))
        })?
        .ok_or_else(|| {
            ReconcilerError::Credential(format!(
                "credentials secret {secret_namespace}/{} not found",
                secret_ref.name
            ))
        })?;

    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(CREDENTIALS_TOKEN_KEY))
        .map(|b| b.0.clone())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            ReconcilerError::Credential(format!(
                "credentials secret {secret_namespace}/{} has no {CREDENTIALS_TOKEN_KEY} key",
                secret_ref.name
            ))
        })?;

    String::from_utf8(bytes).map_err(|e| {
        ReconcilerError::Credential(format!(
            "credentials secret {secret_namespace}/{} holds a non UTF-8 token: {e}",
            secret_ref.name
        ))
    })
}
