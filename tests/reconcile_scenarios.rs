//! End-to-end reconcile scenarios against in-memory collaborators

mod common;

use async_trait::async_trait;
use cluster_lb_provider::constants::FINALIZER;
use cluster_lb_provider::controller::events::reasons;
use cluster_lb_provider::controller::reconciler::conditions::get_condition;
use cluster_lb_provider::controller::reconciler::{
    reconcile_managed_cluster, Reconciler, ReconcilerError,
};
use cluster_lb_provider::crd::{
    Cluster, ClusterSpec, ClusterStatusError, ConditionSeverity, ManagedCluster, DELETED_REASON,
    READY_CONDITION,
};
use cluster_lb_provider::provider::{
    load_balancer_label, owner_tag, AdapterError, LoadBalancer, LoadBalancerCall,
};
use cluster_lb_provider::store::{
    ManagedClusterPatch, MemoryStore, ObjectStore, Scheme, StoreError,
};
use common::*;
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;

fn label() -> String {
    load_balancer_label(NAMESPACE, NAME)
}

fn server_error() -> AdapterError {
    AdapterError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn existing_load_balancer(id: i64) -> LoadBalancer {
    LoadBalancer {
        id,
        label: label(),
        region: "us-ord".to_string(),
        ipv4: Some("192.0.2.10".to_string()),
        tags: vec![owner_tag(CLUSTER_UID)],
    }
}

fn ready_condition(cluster: &ManagedCluster) -> cluster_lb_provider::crd::Condition {
    get_condition(cluster.status.as_ref().unwrap(), READY_CONDITION)
        .cloned()
        .unwrap()
}

async fn reconcile(h: &Harness) -> Result<Action, ReconcilerError> {
    reconcile_managed_cluster(&h.reconciler, NAMESPACE, NAME).await
}

#[tokio::test]
async fn test_create_provisions_load_balancer_and_endpoint() {
    let h = Harness::new();
    h.seed(new_cluster());

    let action = reconcile(&h).await.unwrap();
    assert_eq!(action, Action::await_change());

    assert_eq!(
        h.cloud.calls(),
        vec![
            LoadBalancerCall::Find { label: label() },
            LoadBalancerCall::Create { label: label() },
            LoadBalancerCall::CreateConfig {
                load_balancer_id: 1,
                port: 6443
            },
        ]
    );

    let stored = h.stored().unwrap();
    let lb = h.cloud.load_balancer(1).unwrap();
    assert_eq!(stored.spec.control_plane_endpoint.host, lb.ipv4.unwrap());
    assert_eq!(stored.spec.control_plane_endpoint.port, 6443);
    assert_eq!(stored.spec.network.load_balancer_id, Some(1));
    assert_eq!(stored.spec.network.load_balancer_config_id, Some(2));
    assert!(stored.finalizers().contains(&FINALIZER.to_string()));

    let status = stored.status.as_ref().unwrap();
    assert!(status.ready);
    assert!(status.failure_reason.is_none());
    assert!(status.failure_message.is_none());
    assert_eq!(ready_condition(&stored).status, "True");

    // Everything lands in a single commit
    assert_eq!(h.store.patch_calls(), 1);
    assert_eq!(h.factory.tokens(), vec![CONTROLLER_TOKEN.to_string()]);

    let ready_events = h.events.with_reason(reasons::READY);
    assert_eq!(ready_events.len(), 1);
    assert!(!ready_events[0].is_warning());
}

#[tokio::test]
async fn test_ready_cluster_is_left_alone() {
    let h = Harness::new();
    h.seed(new_cluster());
    reconcile(&h).await.unwrap();
    let calls = h.cloud.calls().len();

    h.clock.advance(Duration::from_secs(3600));
    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());

    assert_eq!(h.cloud.calls().len(), calls);
    assert_eq!(h.store.patch_calls(), 1);
    assert_eq!(h.events.with_reason(reasons::READY).len(), 1);
}

#[tokio::test]
async fn test_create_protects_credentials_secret_first() {
    let h = Harness::new();
    h.store.insert_secret(credentials_secret(SECRET_TOKEN));
    h.seed(with_credentials(new_cluster()));

    reconcile(&h).await.unwrap();

    assert_eq!(h.factory.tokens(), vec![SECRET_TOKEN.to_string()]);
    let secret = h.store.secret(NAMESPACE, SECRET_NAME).unwrap();
    assert_eq!(secret.finalizers(), [FINALIZER.to_string()]);
    assert_eq!(h.store.secret_updates(), 1);
}

#[tokio::test]
async fn test_create_adopts_load_balancer_with_matching_label() {
    let h = Harness::new();
    h.cloud.insert_load_balancer(existing_load_balancer(42));
    h.seed(new_cluster());

    reconcile(&h).await.unwrap();

    assert_eq!(h.cloud.call_count("create_load_balancer"), 0);
    assert_eq!(h.cloud.load_balancer_count(), 1);
    let stored = h.stored().unwrap();
    assert_eq!(stored.spec.network.load_balancer_id, Some(42));
    assert_eq!(stored.spec.control_plane_endpoint.host, "192.0.2.10");
    assert_eq!(h.cloud.configs_for(42).len(), 1);
}

fn cluster_named(namespace: &str, name: &str, uid: &str) -> ManagedCluster {
    let mut cluster = new_cluster();
    cluster.metadata.namespace = Some(namespace.to_string());
    cluster.metadata.name = Some(name.to_string());
    cluster.metadata.uid = Some(uid.to_string());
    cluster
}

#[tokio::test]
async fn test_colliding_labels_never_share_a_load_balancer() {
    let h = Harness::new();
    for namespace in ["team-a", "team"] {
        let mut owner = owner_cluster();
        owner.metadata.namespace = Some(namespace.to_string());
        h.store.insert_owner_cluster(owner);
    }
    h.store.insert_managed_cluster(cluster_named("team-a", "web", "uid-first"));
    h.store.insert_managed_cluster(cluster_named("team", "a-web", "uid-second"));
    assert_eq!(load_balancer_label("team-a", "web"), load_balancer_label("team", "a-web"));

    reconcile_managed_cluster(&h.reconciler, "team-a", "web").await.unwrap();
    let first = h.store.managed_cluster("team-a", "web").unwrap();
    assert_eq!(first.spec.network.load_balancer_id, Some(1));

    let action = reconcile_managed_cluster(&h.reconciler, "team", "a-web").await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));

    let second = h.store.managed_cluster("team", "a-web").unwrap();
    assert_eq!(second.spec.network.load_balancer_id, None);
    assert!(!second.spec.control_plane_endpoint.is_set());
    let status = second.status.as_ref().unwrap();
    assert_eq!(status.failure_reason, Some(ClusterStatusError::CreateError));
    assert!(status
        .failure_message
        .as_deref()
        .unwrap()
        .contains("not owned by this cluster"));
    assert_eq!(ready_condition(&second).severity, Some(ConditionSeverity::Warning));

    // The first cluster's load balancer is untouched and still the only one
    assert_eq!(h.cloud.load_balancer_count(), 1);
    assert!(h.cloud.load_balancer(1).unwrap().is_owned_by("uid-first"));
    assert_eq!(h.cloud.call_count("create_load_balancer"), 1);
}

#[tokio::test]
async fn test_delete_removes_load_balancer_and_finalizers() {
    let h = Harness::new();
    h.cloud.insert_load_balancer(existing_load_balancer(7));
    let mut cluster = deleting_cluster(Some(7));
    // A second finalizer keeps the object around for inspection
    cluster.finalizers_mut().push("example.com/keep".to_string());
    h.seed(cluster);

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());

    assert_eq!(h.cloud.calls(), vec![LoadBalancerCall::Delete { id: 7 }]);
    assert!(h.cloud.load_balancer(7).is_none());

    let stored = h.stored().unwrap();
    assert_eq!(stored.spec.network.load_balancer_id, None);
    assert_eq!(stored.spec.network.load_balancer_config_id, None);
    assert_eq!(stored.finalizers(), ["example.com/keep".to_string()]);

    let ready = ready_condition(&stored);
    assert_eq!(ready.status, "False");
    assert_eq!(ready.reason.as_deref(), Some(DELETED_REASON));
    assert_eq!(ready.severity, Some(ConditionSeverity::Info));

    let deleted = h.events.with_reason(reasons::DELETED);
    assert_eq!(deleted.len(), 1);
    assert!(!deleted[0].is_warning());
}

#[tokio::test]
async fn test_delete_releases_object_once_last_finalizer_is_gone() {
    let h = Harness::new();
    h.cloud.insert_load_balancer(existing_load_balancer(7));
    h.seed(deleting_cluster(Some(7)));

    reconcile(&h).await.unwrap();

    assert!(h.stored().is_none());
    assert_eq!(h.cloud.call_count("delete_load_balancer"), 1);
}

#[tokio::test]
async fn test_delete_releases_credentials_secret_after_load_balancer() {
    let h = Harness::new();
    let mut secret = credentials_secret(SECRET_TOKEN);
    secret.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    h.store.insert_secret(secret);
    h.cloud.insert_load_balancer(existing_load_balancer(7));
    h.seed(with_credentials(deleting_cluster(Some(7))));

    reconcile(&h).await.unwrap();

    assert!(h.cloud.load_balancer(7).is_none());
    assert!(h.store.secret(NAMESPACE, SECRET_NAME).unwrap().finalizers().is_empty());
    assert!(h.stored().is_none());
}

#[tokio::test]
async fn test_delete_failure_keeps_credentials_secret_protected() {
    let h = Harness::new();
    let mut secret = credentials_secret(SECRET_TOKEN);
    secret.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
    h.store.insert_secret(secret);
    h.cloud.insert_load_balancer(existing_load_balancer(7));
    h.cloud.fail_next("delete_load_balancer", server_error());
    h.seed(with_credentials(deleting_cluster(Some(7))));

    let action = reconcile(&h).await.unwrap();
    assert_eq!(action, Action::requeue(Duration::from_secs(5)));

    let secret = h.store.secret(NAMESPACE, SECRET_NAME).unwrap();
    assert_eq!(secret.finalizers(), [FINALIZER.to_string()]);
    let stored = h.stored().unwrap();
    assert!(stored.finalizers().contains(&FINALIZER.to_string()));
    assert_eq!(stored.spec.network.load_balancer_id, Some(7));
    let status = stored.status.as_ref().unwrap();
    assert_eq!(status.failure_reason, Some(ClusterStatusError::DeleteError));
    assert_eq!(h.events.with_reason("DeleteError").len(), 1);
}

#[tokio::test]
async fn test_delete_without_load_balancer_id_skips_cloud() {
    let h = Harness::new();
    h.seed(deleting_cluster(None));

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());

    assert!(h.cloud.calls().is_empty());
    assert!(h.stored().is_none());
    let warnings = h.events.with_reason(reasons::LOAD_BALANCER_ID_MISSING);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].is_warning());
}

#[tokio::test]
async fn test_delete_of_missing_load_balancer_counts_as_success() {
    let h = Harness::new();
    let mut cluster = deleting_cluster(Some(7));
    cluster.finalizers_mut().push("example.com/keep".to_string());
    h.seed(cluster);

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());

    assert_eq!(h.cloud.calls(), vec![LoadBalancerCall::Delete { id: 7 }]);
    let stored = h.stored().unwrap();
    assert_eq!(stored.spec.network.load_balancer_id, None);
    assert_eq!(stored.spec.network.load_balancer_config_id, None);
    assert_eq!(stored.finalizers(), ["example.com/keep".to_string()]);
    assert!(stored.status.as_ref().unwrap().failure_reason.is_none());
    assert_eq!(h.events.with_reason(reasons::DELETED).len(), 1);
}

#[tokio::test]
async fn test_transient_failures_requeue_within_grace_window() {
    let h = Harness::new();
    h.seed(new_cluster());
    for _ in 0..3 {
        h.cloud.fail_next("create_load_balancer", server_error());
    }

    for attempt in 0..3 {
        if attempt > 0 {
            h.clock.advance(Duration::from_secs(30));
        }
        let action = reconcile(&h).await.unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(5)));

        let stored = h.stored().unwrap();
        let status = stored.status.as_ref().unwrap();
        assert!(!status.ready);
        assert_eq!(status.failure_reason, Some(ClusterStatusError::CreateError));
        assert!(status.failure_message.as_deref().unwrap().contains("service unavailable"));

        let ready = ready_condition(&stored);
        assert_eq!(ready.status, "False");
        assert_eq!(ready.severity, Some(ConditionSeverity::Warning));
        assert_eq!(ready.last_transition_time, start_time().to_rfc3339());
    }

    assert_eq!(h.cloud.call_count("create_load_balancer"), 3);
    assert_eq!(h.cloud.load_balancer_count(), 0);
    assert_eq!(h.events.with_reason("CreateError").len(), 3);
}

#[tokio::test]
async fn test_failure_escalates_after_grace_window() {
    let h = Harness::new();
    h.seed(new_cluster());
    for _ in 0..4 {
        h.cloud.fail_next("create_load_balancer", server_error());
    }

    for _ in 0..3 {
        reconcile(&h).await.unwrap();
        h.clock.advance(Duration::from_secs(30));
    }
    h.clock.set(start_time() + chrono::Duration::seconds(DECAY_TIMEOUT_SECS as i64 + 1));

    let err = reconcile(&h).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Adapter(_)), "unexpected error: {err:?}");

    let stored = h.stored().unwrap();
    let ready = ready_condition(&stored);
    assert_eq!(ready.severity, Some(ConditionSeverity::Error));
    assert_eq!(ready.last_transition_time, start_time().to_rfc3339());
    assert!(!stored.status.as_ref().unwrap().ready);
}

#[tokio::test]
async fn test_success_after_failures_clears_condition() {
    let h = Harness::new();
    h.seed(new_cluster());
    h.cloud.fail_next("create_load_balancer", server_error());

    reconcile(&h).await.unwrap();
    h.clock.advance(Duration::from_secs(10));
    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());

    let stored = h.stored().unwrap();
    let status = stored.status.as_ref().unwrap();
    assert!(status.ready);
    assert!(status.failure_reason.is_none());
    let ready = ready_condition(&stored);
    assert_eq!(ready.status, "True");
    assert!(ready.reason.is_none());
    assert!(ready.severity.is_none());
}

#[tokio::test]
async fn test_failing_config_step_keeps_load_balancer_for_retry() {
    let h = Harness::new();
    h.seed(new_cluster());
    h.cloud
        .fail_next("create_load_balancer_config", server_error());

    reconcile(&h).await.unwrap();
    let stored = h.stored().unwrap();
    assert_eq!(stored.spec.network.load_balancer_id, Some(1));
    assert!(!stored.spec.control_plane_endpoint.is_set());

    reconcile(&h).await.unwrap();
    assert_eq!(h.cloud.call_count("create_load_balancer"), 1);
    assert_eq!(h.cloud.call_count("get_load_balancer"), 1);
    let stored = h.stored().unwrap();
    assert!(stored.spec.control_plane_endpoint.is_set());
    assert!(stored.status.as_ref().unwrap().ready);
}

#[tokio::test]
async fn test_unusable_load_balancer_fails_immediately() {
    let h = Harness::new();
    h.seed(new_cluster());
    h.cloud.return_unusable_load_balancer();

    let err = reconcile(&h).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::InvariantViolation(_)), "unexpected error: {err:?}");

    let stored = h.stored().unwrap();
    assert_eq!(ready_condition(&stored).severity, Some(ConditionSeverity::Error));
    assert_eq!(
        stored.status.as_ref().unwrap().failure_reason,
        Some(ClusterStatusError::CreateError)
    );
    assert!(!stored.spec.control_plane_endpoint.is_set());
}

#[tokio::test]
async fn test_invalid_port_is_rejected_before_cloud_calls() {
    let h = Harness::new();
    let mut cluster = new_cluster();
    cluster.spec.network.load_balancer_port = Some(70000);
    h.seed(cluster);

    let err = reconcile(&h).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Validation(_)), "unexpected error: {err:?}");
    assert!(h.cloud.calls().is_empty());
    assert_eq!(
        h.stored().unwrap().status.unwrap().failure_reason,
        Some(ClusterStatusError::InvalidConfiguration)
    );
}

#[tokio::test]
async fn test_missing_resource_is_ignored() {
    let h = Harness::new();
    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());
    assert_eq!(h.store.patch_calls(), 0);
}

#[tokio::test]
async fn test_cluster_without_owner_is_untouched() {
    let h = Harness::new();
    h.store.insert_managed_cluster(bare_cluster());

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());
    assert!(h.factory.tokens().is_empty());
    assert!(h.cloud.calls().is_empty());
    assert_eq!(h.store.patch_calls(), 0);
    assert!(h.stored().unwrap().finalizers().is_empty());
}

#[tokio::test]
async fn test_owner_reference_to_missing_cluster_is_untouched() {
    let h = Harness::new();
    h.store.insert_managed_cluster(new_cluster());

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());
    assert!(h.cloud.calls().is_empty());
    assert_eq!(h.store.patch_calls(), 0);
}

#[tokio::test]
async fn test_paused_owner_stops_reconciliation() {
    let h = Harness::new();
    let mut owner = owner_cluster();
    owner.spec = ClusterSpec {
        paused: true,
        ..ClusterSpec::default()
    };
    h.store.insert_owner_cluster(owner);
    h.store.insert_managed_cluster(new_cluster());

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());
    assert!(h.cloud.calls().is_empty());
    assert_eq!(h.store.patch_calls(), 0);
}

#[tokio::test]
async fn test_paused_annotation_stops_reconciliation() {
    let h = Harness::new();
    let mut cluster = new_cluster();
    cluster
        .annotations_mut()
        .insert("cluster.x-k8s.io/paused".to_string(), String::new());
    h.seed(cluster);

    assert_eq!(reconcile(&h).await.unwrap(), Action::await_change());
    assert!(h.cloud.calls().is_empty());
}

#[tokio::test]
async fn test_unresolvable_credentials_fail_without_commit() {
    let h = Harness::new();
    h.seed(with_credentials(new_cluster()));

    let err = reconcile(&h).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::Credential(_)), "unexpected error: {err:?}");
    assert!(h.cloud.calls().is_empty());
    assert_eq!(h.store.patch_calls(), 0);
}

#[tokio::test]
async fn test_commit_conflict_is_retried_without_duplicating_load_balancer() {
    let h = Harness::new();
    h.seed(new_cluster());
    h.store.fail_next_patch(StoreError::Conflict {
        kind: "ManagedCluster".to_string(),
        namespace: NAMESPACE.to_string(),
        name: NAME.to_string(),
        message: "the object has been modified".to_string(),
    });

    let err = reconcile(&h).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(!h.stored().unwrap().spec.control_plane_endpoint.is_set());

    reconcile(&h).await.unwrap();
    assert_eq!(h.cloud.load_balancer_count(), 1);
    assert_eq!(h.cloud.call_count("create_load_balancer"), 1);
    assert!(h.stored().unwrap().status.unwrap().ready);
}

#[tokio::test]
async fn test_commit_error_is_merged_with_workflow_error() {
    let h = Harness::new();
    h.seed(new_cluster());
    h.cloud.return_unusable_load_balancer();
    h.store
        .fail_next_patch(StoreError::Api("etcd unavailable".to_string()));

    let err = reconcile(&h).await.unwrap_err();
    let ReconcilerError::Aggregate(errors) = &err else {
        panic!("expected aggregate, got {err:?}");
    };
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], ReconcilerError::InvariantViolation(_)));
    assert!(matches!(errors[1], ReconcilerError::Store(_)));
}

/// Store whose secret lookups never complete
struct StalledSecretStore(MemoryStore);

#[async_trait]
impl ObjectStore for StalledSecretStore {
    async fn get_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ManagedCluster>, StoreError> {
        self.0.get_managed_cluster(namespace, name).await
    }

    async fn get_owner_cluster(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Cluster>, StoreError> {
        self.0.get_owner_cluster(namespace, name).await
    }

    async fn get_secret(&self, _namespace: &str, _name: &str) -> Result<Option<Secret>, StoreError> {
        std::future::pending().await
    }

    async fn update_secret(&self, secret: &Secret) -> Result<(), StoreError> {
        self.0.update_secret(secret).await
    }

    async fn patch_managed_cluster(
        &self,
        namespace: &str,
        name: &str,
        patch: &ManagedClusterPatch,
    ) -> Result<(), StoreError> {
        self.0.patch_managed_cluster(namespace, name, patch).await
    }

    fn scheme(&self) -> &Scheme {
        self.0.scheme()
    }
}

#[tokio::test(start_paused = true)]
async fn test_stalled_credentials_lookup_hits_reconcile_deadline() {
    let h = Harness::new();
    let store = MemoryStore::new();
    store.insert_owner_cluster(owner_cluster());
    store.insert_managed_cluster(with_credentials(new_cluster()));
    let reconciler = Reconciler::new(
        Arc::new(StalledSecretStore(store)),
        Arc::clone(&h.factory) as _,
        Arc::clone(&h.events) as _,
        Arc::clone(&h.clock) as _,
        h.reconciler.config.clone(),
    );

    let err = reconcile_managed_cluster(&reconciler, NAMESPACE, NAME)
        .await
        .unwrap_err();
    assert!(
        matches!(err, ReconcilerError::Timeout(timeout) if timeout == Duration::from_secs(10)),
        "unexpected error: {err:?}"
    );
    assert!(h.factory.tokens().is_empty());
    assert!(h.cloud.calls().is_empty());
}
