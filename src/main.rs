//! # Cluster Load Balancer Provider
//!
//! A Cluster API infrastructure controller that provisions a cloud load
//! balancer in front of each `ManagedCluster`'s control plane.
//!
//! ## Overview
//!
//! For every `ManagedCluster` owned by a Cluster API `Cluster`, the controller:
//!
//! 1. **Resolves credentials** - from the `ManagedCluster`, its owner, or the controller environment
//! 2. **Provisions a load balancer** - plus a TCP listener on the API server port
//! 3. **Publishes the endpoint** - into `spec.controlPlaneEndpoint`
//! 4. **Cleans up** - deletes the load balancer and releases finalizers on deletion
//!
//! ## Features
//!
//! - **Idempotent**: existing load balancers are adopted by id or label
//! - **Failure decay**: transient cloud errors are retried quietly before being surfaced
//! - **Prometheus metrics**: exposed on `/metrics`
//! - **Health probes**: `/healthz` and `/readyz`

use anyhow::Result;
use cluster_lb_provider::config::ControllerConfig;
use cluster_lb_provider::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env();
    let init = initialize(config).await?;
    run_watch_loop(init.client, init.reconciler, init.server_state).await
}
