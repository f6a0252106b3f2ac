//! # CRD Generator
//!
//! Generates the Kubernetes CustomResourceDefinition YAML for `ManagedCluster`.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/managedcluster.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! The owner `Cluster` CRD is installed by Cluster API and is not generated here.

use anyhow::Result;
use cluster_lb_provider::crd::ManagedCluster;
use kube::core::CustomResourceExt;

fn main() -> Result<()> {
    print!("{}", serde_yaml::to_string(&ManagedCluster::crd())?);
    Ok(())
}
