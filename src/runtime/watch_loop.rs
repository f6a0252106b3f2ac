//! # Watch Loop
//!
//! Controller watch loop that monitors `ManagedCluster` resources, and their
//! owning Cluster API `Cluster`s, and triggers reconciliation on changes.

use crate::config::ControllerConfig;
use crate::constants::WATCH_FILTER_LABEL;
use crate::controller::reconciler::{reconcile, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{Cluster, ManagedCluster};
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use kube::api::Api;
use kube::runtime::controller::{self, Controller};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher;
use kube::{Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watcher configuration for `ManagedCluster`s, sharded by the watch-filter label
pub fn managed_cluster_watch_config(config: &ControllerConfig) -> watcher::Config {
    let wc = watcher::Config::default().any_semantic();
    match config.watch_filter_value.as_deref() {
        Some(value) if !value.is_empty() => wc.labels(&format!("{WATCH_FILTER_LABEL}={value}")),
        _ => wc,
    }
}

/// The `ManagedCluster` a Cluster API `Cluster` points at, if any
pub fn managed_cluster_for_owner(cluster: &Cluster) -> Option<ObjectRef<ManagedCluster>> {
    let infra = cluster.spec.infrastructure_ref.as_ref()?;
    let group = infra.api_version.split('/').next().unwrap_or_default();
    if infra.kind != ManagedCluster::kind(&()) || group != ManagedCluster::group(&()) {
        return None;
    }
    let namespace = infra
        .namespace
        .clone()
        .filter(|ns| !ns.is_empty())
        .or_else(|| cluster.namespace())?;
    Some(ObjectRef::new(&infra.name).within(&namespace))
}

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let managed_clusters: Api<ManagedCluster> = Api::all(client.clone());
    let clusters: Api<Cluster> = Api::all(client);

    let watch_config = managed_cluster_watch_config(&reconciler.config);
    let controller_config =
        controller::Config::default().concurrency(reconciler.config.max_concurrent_reconciliations);

    info!("Starting controller watch loop...");
    server_state.set_ready(true);

    Controller::new(managed_clusters, watch_config)
        .with_config(controller_config)
        .watches(clusters, watcher::Config::default(), |cluster| {
            managed_cluster_for_owner(&cluster)
        })
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, Arc::clone(&reconciler))
        .for_each(|result| async move {
            match result {
                Ok((obj, action)) => {
                    debug!(resource.name = %obj.name, action = ?action, "watch.event.reconciled");
                }
                Err(e) => {
                    warn!(error = %e, "watch.event.reconciliation_failed");
                }
            }
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped");
    Ok(())
}
