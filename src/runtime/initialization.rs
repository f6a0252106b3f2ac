//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, and Kubernetes client setup.

use crate::config::ControllerConfig;
use crate::controller::events::KubeEventPublisher;
use crate::controller::reconciler::{Reconciler, SystemClock};
use crate::controller::server::{start_server, ServerState};
use crate::crd::ManagedCluster;
use crate::observability;
use crate::provider::RestClientFactory;
use crate::store::KubeStore;
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Name reported on Kubernetes events
pub const CONTROLLER_NAME: &str = "cluster-lb-provider";

/// Everything the watch loop needs
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Filter directive derived from the configured level, e.g. `cluster_lb_provider=info`
pub fn default_filter(config: &ControllerConfig) -> String {
    format!("cluster_lb_provider={}", config.log_level.to_lowercase())
}

/// Install the global tracing subscriber. `RUST_LOG` takes precedence over the config.
pub fn init_tracing(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config)));

    let result = if config.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).try_init()
    };
    if let Err(e) = result {
        warn!("Tracing subscriber init returned error (may already be initialized): {}", e);
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation and CRD check
/// - Reconciler setup
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ before any TLS connection is made
    let crypto_installed = rustls::crypto::ring::default_provider()
        .install_default()
        .is_ok();

    init_tracing(&config);
    if !crypto_installed {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting cluster load balancer provider");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    info!(config = ?config, "Loaded controller configuration");

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let managed_clusters: Api<ManagedCluster> = Api::all(client.clone());
    managed_clusters
        .list(&ListParams::default().limit(1))
        .await
        .context("ManagedClusters are not queryable, is the CRD installed? (cargo run --bin crdgen | kubectl apply -f -)")?;

    let cloud = RestClientFactory::new(config.cloud_api_url.clone(), config.cloud_client_timeout());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(KubeStore::new(client.clone())),
        Arc::new(cloud),
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME)),
        Arc::new(SystemClock),
        config,
    ));

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_uses_configured_level() {
        let config = ControllerConfig {
            log_level: "DEBUG".to_string(),
            ..ControllerConfig::default()
        };
        assert_eq!(default_filter(&config), "cluster_lb_provider=debug");
    }
}
