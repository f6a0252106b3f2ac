//! # Reconciler
//!
//! Core reconciliation logic for `ManagedCluster` resources.
//!
//! The reconciler:
//! - Resolves the cloud API token for each cluster
//! - Provisions a load balancer and listener for the control plane
//! - Publishes the control plane endpoint on the `ManagedCluster`
//! - Tears the load balancer down when the cluster is deleted
//! - Records failures as decaying conditions and Kubernetes events
//!
//! ## Module Structure
//!
//! - `clock.rs` - Injectable time source
//! - `conditions.rs` - Condition helpers and failure decay
//! - `credentials.rs` - API token resolution
//! - `finalizers.rs` - Finalizers on the resource and its credentials secret
//! - `scope.rs` - Per-reconcile unit of work
//! - `reconcile/` - Create and delete workflows
//! - `types.rs` - Shared context and errors

pub mod clock;
pub mod conditions;
pub mod credentials;
pub mod finalizers;
pub mod reconcile;
pub mod scope;
pub mod types;

pub use crate::controller::backoff::BackoffState;
pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::{resolve_credentials, CredentialSource, Credentials};
pub use reconcile::{reconcile, reconcile_managed_cluster, ReconcileState};
pub use scope::{ClusterScope, ClusterScopeParams};
pub use types::{Reconciler, ReconcilerError};
