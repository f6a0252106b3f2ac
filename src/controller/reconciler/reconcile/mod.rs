//! # Reconciliation
//!
//! Per-resource state machine for `ManagedCluster`.
//!
//! ## Flow
//!
//! 1. Fetch the `ManagedCluster`; a missing object ends the reconcile
//! 2. Resolve the owner `Cluster`; without one nothing happens until the next event
//! 3. Skip paused clusters
//! 4. Build the [`ClusterScope`] (validation, credentials, snapshot)
//! 5. Run the delete or create workflow
//! 6. Always commit the scope, merging a commit error with any workflow error
//!
//! Steps 1 to 5 share one reconcile deadline; the commit gets a fresh one.
//!
//! Failures of cloud calls are recorded as decaying conditions. While the
//! Ready condition has not escalated to `Error` the reconcile asks for a short
//! requeue and swallows the error; once escalated the error is returned to the
//! controller runtime, whose error policy applies its own backoff.

mod create;
mod delete;

use super::conditions::{has_condition_severity, mark_true, record_decaying_condition};
use super::finalizers::add_finalizer;
use super::scope::{ClusterScope, ClusterScopeParams};
use super::types::{Reconciler, ReconcilerError};
use crate::constants::{CLUSTER_API_GROUP, PAUSED_ANNOTATION};
use crate::controller::events::{actions, reasons};
use crate::crd::{ClusterStatusError, ConditionSeverity, ManagedCluster, READY_CONDITION};
use crate::observability::metrics;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Resource, ResourceExt};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, info_span, warn, Instrument};

/// Where a `ManagedCluster` stands in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    /// Not in the store
    Missing,
    /// No owner `Cluster` yet
    OwnerPending,
    /// Owner or resource is paused
    Paused,
    /// Marked for deletion
    Deleting,
    /// No control plane endpoint yet
    Creating,
    /// Endpoint populated
    Ready,
}

impl ReconcileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileState::Missing => "Missing",
            ReconcileState::OwnerPending => "OwnerPending",
            ReconcileState::Paused => "Paused",
            ReconcileState::Deleting => "Deleting",
            ReconcileState::Creating => "Creating",
            ReconcileState::Ready => "Ready",
        }
    }
}

/// Lifecycle state of an existing, owned, unpaused `ManagedCluster`
pub fn lifecycle_state(cluster: &ManagedCluster) -> ReconcileState {
    if cluster.meta().deletion_timestamp.is_some() {
        ReconcileState::Deleting
    } else if cluster.spec.control_plane_endpoint.is_set() {
        ReconcileState::Ready
    } else {
        ReconcileState::Creating
    }
}

/// Name of the owning Cluster API `Cluster`, if the owner reference is set
pub fn owner_cluster_name(cluster: &ManagedCluster) -> Option<String> {
    cluster
        .owner_references()
        .iter()
        .find(|r| {
            r.kind == "Cluster"
                && r.api_version.split('/').next() == Some(CLUSTER_API_GROUP)
        })
        .map(|r| r.name.clone())
}

fn has_paused_annotation(cluster: &ManagedCluster) -> bool {
    cluster.annotations().contains_key(PAUSED_ANNOTATION)
}

/// Entry point used by the controller runtime
pub async fn reconcile(
    obj: Arc<ManagedCluster>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    let result = reconcile_managed_cluster(&ctx, &namespace, &name).await;
    if result.is_ok() {
        ctx.reset_backoff(&namespace, &name);
    }
    result
}

/// Reconcile one `ManagedCluster` identified by namespace and name
///
/// # Errors
/// Returns validation, credential and schema errors directly, cloud errors
/// once their grace window has elapsed, and commit errors.
pub async fn reconcile_managed_cluster(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let span = info_span!("reconcile", resource.namespace = namespace, resource.name = name);
    async move {
        let start = Instant::now();
        metrics::increment_reconciliations();

        let result = reconcile_inner(ctx, namespace, name).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::increment_reconciliation_errors(e.kind());
        }
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_inner(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let timeout = ctx.config.reconcile_timeout();
    let deadline = Deadline::after(timeout);

    let Some(mut scope) = with_deadline(deadline, prepare_scope(ctx, namespace, name)).await?
    else {
        return Ok(Action::await_change());
    };
    debug!(credentials = ?scope.credential_source(), "created cluster scope");

    let outcome = with_deadline(deadline, run_workflow(ctx, &mut scope)).await;
    // The commit gets its own deadline so a slow workflow cannot prevent it
    let committed = with_deadline(Deadline::after(timeout), scope.close()).await;

    match (outcome, committed) {
        (Ok(action), Ok(())) => Ok(action),
        (Ok(_), Err(commit_err)) => {
            warn!(error = %commit_err, "failed to commit ManagedCluster");
            Err(commit_err)
        }
        (Err(workflow_err), Ok(())) => Err(workflow_err),
        (Err(workflow_err), Err(commit_err)) => {
            warn!(error = %commit_err, "failed to commit ManagedCluster");
            Err(workflow_err.merge(commit_err))
        }
    }
}

/// Fetch the resource and its owner, then build the scope.
///
/// `None` when there is nothing to do until the next event.
async fn prepare_scope(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Option<ClusterScope>, ReconcilerError> {
    let Some(managed_cluster) = ctx.store.get_managed_cluster(namespace, name).await? else {
        debug!(state = ReconcileState::Missing.as_str(), "ManagedCluster not found");
        return Ok(None);
    };

    let Some(owner_name) = owner_cluster_name(&managed_cluster) else {
        info!(state = ReconcileState::OwnerPending.as_str(), "Cluster controller has not yet set OwnerRef, skipping reconciliation");
        return Ok(None);
    };
    let Some(owner) = ctx.store.get_owner_cluster(namespace, &owner_name).await? else {
        info!(state = ReconcileState::OwnerPending.as_str(), owner = %owner_name, "owner Cluster not found, skipping reconciliation");
        return Ok(None);
    };

    if owner.spec.paused || has_paused_annotation(&managed_cluster) {
        info!(state = ReconcileState::Paused.as_str(), "reconciliation is paused");
        return Ok(None);
    }

    let scope = ClusterScope::new(
        &ctx.config.cloud_api_token,
        ClusterScopeParams {
            store: Some(Arc::clone(&ctx.store)),
            owner: Some(owner),
            managed_cluster: Some(managed_cluster),
            cloud: Some(Arc::clone(&ctx.cloud)),
        },
    )
    .await?;
    Ok(Some(scope))
}

/// Point in time a reconcile phase must finish by
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: tokio::time::Instant,
    timeout: Duration,
}

impl Deadline {
    /// `timeout` from now; `None` when disabled or beyond the clock's range
    fn after(timeout: Option<Duration>) -> Option<Self> {
        let timeout = timeout?;
        match tokio::time::Instant::now().checked_add(timeout) {
            Some(at) => Some(Self { at, timeout }),
            None => {
                warn!(timeout_secs = timeout.as_secs(), "reconcile timeout is out of range, running without a deadline");
                None
            }
        }
    }
}

/// Run `fut` under an optional deadline
async fn with_deadline<T, F>(deadline: Option<Deadline>, fut: F) -> Result<T, ReconcilerError>
where
    F: Future<Output = Result<T, ReconcilerError>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };
    match tokio::time::timeout_at(deadline.at, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(ReconcilerError::Timeout(deadline.timeout)),
    }
}

/// Delete or create, then settle the Ready condition
async fn run_workflow(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
) -> Result<Action, ReconcilerError> {
    let state = lifecycle_state(&scope.managed_cluster);
    info!(state = state.as_str(), "reconciling ManagedCluster");

    // Readiness and failure details are recomputed on every run
    let status = scope.managed_cluster.status.get_or_insert_with(Default::default);
    status.ready = false;
    status.failure_reason = None;
    status.failure_message = None;

    if state == ReconcileState::Deleting {
        return match delete::reconcile_delete(ctx, scope).await {
            Ok(()) => Ok(Action::await_change()),
            Err(e) => requeue_or_fail(ctx, scope, e, "deletion"),
        };
    }

    add_finalizer(&mut scope.managed_cluster);

    if state == ReconcileState::Creating {
        if let Err(e) = create::reconcile_create(ctx, scope).await {
            return requeue_or_fail(ctx, scope, e, "creation");
        }
        ctx.events
            .publish(
                &scope.managed_cluster.object_ref(&()),
                EventType::Normal,
                reasons::READY,
                actions::CREATE,
                Some("Load balancer is ready".to_string()),
            )
            .await;
    }

    let now = ctx.clock.now();
    let status = scope.managed_cluster.status.get_or_insert_with(Default::default);
    status.ready = true;
    mark_true(status, READY_CONDITION, now);
    Ok(Action::await_change())
}

/// Absorb a failure as a short requeue unless it has escalated to `Error`
fn requeue_or_fail(
    ctx: &Reconciler,
    scope: &ClusterScope,
    err: ReconcilerError,
    workflow: &str,
) -> Result<Action, ReconcilerError> {
    let terminal = scope.managed_cluster.status.as_ref().is_some_and(|s| {
        has_condition_severity(s, READY_CONDITION, ConditionSeverity::Error)
    });
    if terminal {
        warn!(error = %err, "{workflow} failed permanently");
        return Err(err);
    }

    let delay = ctx.config.requeue_delay();
    info!(error = %err, delay_secs = delay.as_secs(), "re-queuing cluster load balancer {workflow}");
    metrics::increment_requeues_total("decaying-failure");
    Ok(Action::requeue(delay))
}

/// Surface a failed step on status, conditions and events
pub(super) async fn set_failure_reason(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
    reason: ClusterStatusError,
    err: &ReconcilerError,
) {
    let message = err.to_string();
    let now = ctx.clock.now();
    let timeout = ctx.config.decay_timeout();

    let status = scope.managed_cluster.status.get_or_insert_with(Default::default);
    status.failure_reason = Some(reason);
    status.failure_message = Some(message.clone());
    let escalated =
        record_decaying_condition(status, READY_CONDITION, reason.as_str(), &message, timeout, now);
    if escalated {
        warn!(reason = reason.as_str(), "failure outlived its grace window");
    }

    ctx.events
        .publish(
            &scope.managed_cluster.object_ref(&()),
            EventType::Warning,
            reason.as_str(),
            match reason {
                ClusterStatusError::DeleteError => actions::DELETE,
                _ => actions::CREATE,
            },
            Some(message),
        )
        .await;
}
