//! Kubernetes Event recording.
//!
//! Trait-based abstraction over `kube::runtime::events::Recorder` so that the
//! reconciler can emit Events visible via `kubectl describe`, and tests can
//! inspect them.
//!
//! Events are fire-and-forget: failures are logged as warnings and never
//! propagate errors.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{EventType, Recorder, Reporter};
use kube::Client;
use std::sync::Mutex;
use tracing::warn;

/// Publishes Kubernetes Events about a resource
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Production implementation wrapping `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// The controller name appears as the "reportingComponent" on Events
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = kube::runtime::events::Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(reason, action, error = %e, "Failed to publish Kubernetes event");
        }
    }
}

/// An event captured by [`RecordingEventPublisher`]
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub name: String,
    pub namespace: String,
    pub type_: EventType,
    pub reason: String,
    pub action: String,
    pub note: Option<String>,
}

impl RecordedEvent {
    pub fn is_warning(&self) -> bool {
        matches!(self.type_, EventType::Warning)
    }
}

/// In-memory publisher for tests
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded events with the given reason
    pub fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.reason == reason)
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedEvent {
                name: resource_ref.name.clone().unwrap_or_default(),
                namespace: resource_ref.namespace.clone().unwrap_or_default(),
                type_,
                reason: reason.to_string(),
                action: action.to_string(),
                note,
            });
    }
}

/// Event reason strings, shown under the REASON column of `kubectl get events`.
/// Failures use the `ClusterStatusError` name as their reason.
pub mod reasons {
    /// Load balancer and listener exist, endpoint populated
    pub const READY: &str = "Ready";
    /// External load balancer removed
    pub const DELETED: &str = "Deleted";
    /// Deletion requested but no load balancer id was ever recorded
    pub const LOAD_BALANCER_ID_MISSING: &str = "LoadBalancerIdMissing";
}

/// Event action strings
pub mod actions {
    pub const CREATE: &str = "Create";
    pub const DELETE: &str = "Delete";
}
