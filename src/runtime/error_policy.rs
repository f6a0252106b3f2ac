//! # Error Policy
//!
//! Requeue decisions for reconciles that returned an error.
//!
//! Transient cloud failures never reach this layer: the reconciler absorbs
//! them as short requeues until their grace window runs out. What arrives here
//! is either an optimistic concurrency conflict, retried almost immediately
//! against a fresh read, or a terminal error, retried with a per-resource
//! Fibonacci backoff.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::ManagedCluster;
use crate::observability::metrics;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Requeue delay after a failed reconcile
pub fn handle_reconciliation_error(
    obj: Arc<ManagedCluster>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        error = %error
    );
    let _error_guard = error_span.enter();

    if error.is_conflict() {
        let delay = ctx.config.conflict_requeue_delay();
        info!(delay_secs = delay.as_secs(), "ManagedCluster changed while reconciling, retrying");
        metrics::increment_requeues_total("conflict");
        return Action::requeue(delay);
    }

    error!(kind = error.kind(), "Reconciliation error for {}: {}", name, error);

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states.entry(resource_key).or_insert_with(|| {
                BackoffState::new(ctx.config.backoff_min_secs, ctx.config.backoff_max_secs)
            });
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using maximum backoff", e);
            (ctx.config.backoff_max_secs, 0)
        }
    };

    info!(
        "Retrying with Fibonacci backoff: {}s (error count: {})",
        backoff_seconds, error_count
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}
