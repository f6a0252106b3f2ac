//! # Types
//!
//! Core types for the reconciler.

use super::clock::Clock;
use crate::config::ControllerConfig;
use crate::controller::backoff::BackoffState;
use crate::controller::events::EventPublisher;
use crate::provider::{AdapterError, CloudClientFactory};
use crate::store::{ObjectStore, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// A required scope input is missing
    #[error("validation failed: {0}")]
    Validation(String),
    /// The API token could not be resolved
    #[error("credential error: {0}")]
    Credential(String),
    /// The object store does not recognize a resource type
    #[error("schema error: {0}")]
    Schema(String),
    /// Optimistic concurrency rejection on commit
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Remote provider call failed
    #[error("cloud API call failed: {0}")]
    Adapter(#[from] AdapterError),
    /// The provider reported success with an unusable result
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    /// A load balancer carrying the cluster's label belongs to another resource
    #[error("load balancer conflict: {0}")]
    LoadBalancerConflict(String),
    #[error("object store error: {0}")]
    Store(String),
    #[error("reconcile deadline of {0:?} exceeded")]
    Timeout(Duration),
    /// Several errors from one reconcile, in the order they occurred
    #[error("{}", join_errors(.0))]
    Aggregate(Vec<ReconcilerError>),
}

fn join_errors(errors: &[ReconcilerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<StoreError> for ReconcilerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => ReconcilerError::NotFound(err.to_string()),
            StoreError::Conflict { .. } => ReconcilerError::Conflict(err.to_string()),
            StoreError::Api(message) => ReconcilerError::Store(message),
        }
    }
}

impl ReconcilerError {
    /// Combine two errors, keeping `self` first
    #[must_use]
    pub fn merge(self, other: ReconcilerError) -> ReconcilerError {
        let mut errors = match self {
            ReconcilerError::Aggregate(errors) => errors,
            err => vec![err],
        };
        match other {
            ReconcilerError::Aggregate(more) => errors.extend(more),
            err => errors.push(err),
        }
        ReconcilerError::Aggregate(errors)
    }

    /// Whether a commit was rejected because the object changed underneath us
    pub fn is_conflict(&self) -> bool {
        match self {
            ReconcilerError::Conflict(_) => true,
            ReconcilerError::Aggregate(errors) => errors.iter().any(Self::is_conflict),
            _ => false,
        }
    }

    /// Errors that bypass the failure grace window
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcilerError::InvariantViolation(_))
    }

    /// Short label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Validation(_) => "validation",
            ReconcilerError::Credential(_) => "credential",
            ReconcilerError::Schema(_) => "schema",
            ReconcilerError::Conflict(_) => "conflict",
            ReconcilerError::NotFound(_) => "not_found",
            ReconcilerError::Adapter(_) => "adapter",
            ReconcilerError::InvariantViolation(_) => "invariant_violation",
            ReconcilerError::LoadBalancerConflict(_) => "load_balancer_conflict",
            ReconcilerError::Store(_) => "store",
            ReconcilerError::Timeout(_) => "timeout",
            ReconcilerError::Aggregate(_) => "aggregate",
        }
    }
}

/// Shared reconciler context
///
/// Every collaborator is injected, so the same reconcile logic runs against a
/// live cluster and cloud or against in-memory fakes.
#[derive(Clone)]
pub struct Reconciler {
    pub store: Arc<dyn ObjectStore>,
    pub cloud: Arc<dyn CloudClientFactory>,
    pub events: Arc<dyn EventPublisher>,
    pub clock: Arc<dyn Clock>,
    pub config: ControllerConfig,
    // Backoff state per resource (identified by namespace/name), owned by the error policy
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        cloud: Arc<dyn CloudClientFactory>,
        events: Arc<dyn EventPublisher>,
        clock: Arc<dyn Clock>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            cloud,
            events,
            clock,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the backoff of a resource after it reconciled successfully
    pub fn reset_backoff(&self, namespace: &str, name: &str) {
        let key = format!("{namespace}/{name}");
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_flattens_and_keeps_order() {
        let first = ReconcilerError::Adapter(AdapterError::Transport("reset".to_string()));
        let merged = first
            .merge(ReconcilerError::Store("boom".to_string()))
            .merge(ReconcilerError::Conflict("stale".to_string()));

        let ReconcilerError::Aggregate(errors) = &merged else {
            panic!("expected aggregate, got {merged:?}");
        };
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ReconcilerError::Adapter(_)));
        assert!(merged.is_conflict());
        assert!(merged.to_string().contains("reset"));
        assert!(merged.to_string().contains("boom"));
    }

    #[test]
    fn test_store_errors_are_classified() {
        let conflict: ReconcilerError = StoreError::Conflict {
            kind: "ManagedCluster".to_string(),
            namespace: "default".to_string(),
            name: "demo".to_string(),
            message: "modified".to_string(),
        }
        .into();
        assert!(conflict.is_conflict());

        let api: ReconcilerError = StoreError::Api("timeout".to_string()).into();
        assert_eq!(api.kind(), "store");
    }
}
