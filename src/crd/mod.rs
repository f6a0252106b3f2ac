//! # Custom Resource Definitions
//!
//! CRD types for the load balancer provider.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `ManagedCluster` specification
//! - `status.rs` - Status, failure reasons and conditions
//! - `cluster.rs` - Projection of the owning Cluster API `Cluster`

mod cluster;
mod spec;
mod status;

pub use cluster::{Cluster, ClusterSpec, InfrastructureRef};
pub use spec::{ApiEndpoint, ManagedCluster, ManagedClusterSpec, NetworkSpec, SecretRef};
pub use status::{ClusterStatusError, Condition, ConditionSeverity, ManagedClusterStatus};

/// Condition type tracking overall readiness
pub const READY_CONDITION: &str = "Ready";

/// Condition reason set once the load balancer has been deleted
pub const DELETED_REASON: &str = "Deleted";
