//! Common test utilities for reconciler integration tests
//!
//! Builds a [`Reconciler`] wired to in-memory collaborators: an object store,
//! a cloud, an event recorder and a clock that only moves when told to.

#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

use chrono::{DateTime, Utc};
use cluster_lb_provider::config::ControllerConfig;
use cluster_lb_provider::controller::events::RecordingEventPublisher;
use cluster_lb_provider::controller::reconciler::{ManualClock, Reconciler};
use cluster_lb_provider::crd::{
    Cluster, ClusterSpec, ManagedCluster, ManagedClusterSpec, NetworkSpec, SecretRef,
};
use cluster_lb_provider::provider::{FakeCloudClientFactory, FakeLoadBalancerApi};
use cluster_lb_provider::store::MemoryStore;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const NAMESPACE: &str = "default";
pub const NAME: &str = "demo";
pub const SECRET_NAME: &str = "demo-credentials";
pub const SECRET_TOKEN: &str = "secret-token";
pub const CONTROLLER_TOKEN: &str = "controller-token";
pub const CLUSTER_UID: &str = "9b1f7c52-0000-0000-0000-000000000000";

/// Failures decay over 10s x 10 = 100s
pub const DECAY_TIMEOUT_SECS: u64 = 100;

pub fn start_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cloud: Arc<FakeLoadBalancerApi>,
    pub factory: Arc<FakeCloudClientFactory>,
    pub events: Arc<RecordingEventPublisher>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let config = ControllerConfig {
            cloud_api_token: CONTROLLER_TOKEN.to_string(),
            reconcile_timeout_secs: Some(10),
            reconcile_retry_budget: 10,
            ..ControllerConfig::default()
        };
        let store = Arc::new(store);
        let cloud = Arc::new(FakeLoadBalancerApi::new());
        let factory = Arc::new(FakeCloudClientFactory::new(Arc::clone(&cloud)));
        let events = Arc::new(RecordingEventPublisher::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let reconciler = Reconciler::new(
            Arc::clone(&store) as _,
            Arc::clone(&factory) as _,
            Arc::clone(&events) as _,
            Arc::clone(&clock) as _,
            config,
        );
        Self {
            store,
            cloud,
            factory,
            events,
            clock,
            reconciler,
        }
    }

    /// Owner cluster plus a `ManagedCluster` owned by it
    pub fn seed(&self, cluster: ManagedCluster) {
        self.store.insert_owner_cluster(owner_cluster());
        self.store.insert_managed_cluster(cluster);
    }

    pub fn stored(&self) -> Option<ManagedCluster> {
        self.store.managed_cluster(NAMESPACE, NAME)
    }
}

pub fn owner_reference() -> OwnerReference {
    OwnerReference {
        api_version: "cluster.x-k8s.io/v1beta1".to_string(),
        kind: "Cluster".to_string(),
        name: NAME.to_string(),
        uid: "3c0e2d6e-0000-0000-0000-000000000000".to_string(),
        controller: Some(true),
        ..Default::default()
    }
}

pub fn owner_cluster() -> Cluster {
    let mut cluster = Cluster::new(NAME, ClusterSpec::default());
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster
}

/// Unowned `ManagedCluster` with an empty spec
pub fn bare_cluster() -> ManagedCluster {
    let mut cluster = ManagedCluster::new(
        NAME,
        ManagedClusterSpec {
            region: "us-ord".to_string(),
            ..ManagedClusterSpec::default()
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some(CLUSTER_UID.to_string());
    cluster
}

/// Owned `ManagedCluster` with an empty endpoint and no network references
pub fn new_cluster() -> ManagedCluster {
    let mut cluster = bare_cluster();
    cluster.metadata.owner_references = Some(vec![owner_reference()]);
    cluster
}

pub fn with_credentials(mut cluster: ManagedCluster) -> ManagedCluster {
    cluster.spec.credentials_ref = Some(SecretRef {
        name: SECRET_NAME.to_string(),
        namespace: None,
    });
    cluster
}

/// Provisioned cluster marked for deletion
pub fn deleting_cluster(load_balancer_id: Option<i64>) -> ManagedCluster {
    let mut cluster = new_cluster();
    cluster.metadata.finalizers = Some(vec![cluster_lb_provider::constants::FINALIZER.to_string()]);
    cluster.metadata.deletion_timestamp =
        Some(serde_json::from_value(serde_json::json!(start_time().to_rfc3339())).unwrap());
    cluster.spec.network = NetworkSpec {
        load_balancer_id,
        load_balancer_config_id: load_balancer_id.map(|id| id + 100),
        load_balancer_port: None,
    };
    cluster.spec.control_plane_endpoint.host = "192.0.2.10".to_string();
    cluster.spec.control_plane_endpoint.port = 6443;
    cluster
}

pub fn credentials_secret(token: &str) -> Secret {
    let mut secret = Secret::default();
    secret.metadata.name = Some(SECRET_NAME.to_string());
    secret.metadata.namespace = Some(NAMESPACE.to_string());
    secret.data = Some(BTreeMap::from([(
        "apiToken".to_string(),
        ByteString(token.as_bytes().to_vec()),
    )]));
    secret
}
