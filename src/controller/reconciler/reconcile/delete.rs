//! # Delete
//!
//! Drains the external load balancer before releasing the finalizers.

use super::set_failure_reason;
use crate::controller::events::{actions, reasons};
use crate::controller::reconciler::conditions::mark_false;
use crate::controller::reconciler::finalizers::{remove_credentials_ref_finalizer, remove_finalizer};
use crate::controller::reconciler::scope::ClusterScope;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ClusterStatusError, ConditionSeverity, DELETED_REASON, READY_CONDITION};
use kube::runtime::events::EventType;
use kube::Resource;
use tracing::{error, info};

pub async fn reconcile_delete(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
) -> Result<(), ReconcilerError> {
    info!("deleting cluster");
    let reference = scope.managed_cluster.object_ref(&());

    let Some(id) = scope.managed_cluster.spec.network.load_balancer_id else {
        info!("load balancer id is missing, nothing to delete");
        release_finalizers(ctx, scope).await?;
        ctx.events
            .publish(
                &reference,
                EventType::Warning,
                reasons::LOAD_BALANCER_ID_MISSING,
                actions::DELETE,
                Some("Load balancer id is missing, nothing to do".to_string()),
            )
            .await;
        return Ok(());
    };

    match scope.client.delete_load_balancer(id).await {
        Ok(()) => info!(load_balancer.id = id, "deleted load balancer"),
        Err(e) if e.is_not_found() => info!(load_balancer.id = id, "load balancer already deleted"),
        Err(e) => {
            let e = ReconcilerError::from(e);
            error!(error = %e, load_balancer.id = id, "failed to delete load balancer");
            set_failure_reason(ctx, scope, ClusterStatusError::DeleteError, &e).await;
            return Err(e);
        }
    }

    let status = scope.managed_cluster.status.get_or_insert_with(Default::default);
    mark_false(
        status,
        READY_CONDITION,
        DELETED_REASON,
        ConditionSeverity::Info,
        "Load balancer deleted",
        ctx.clock.now(),
    );
    ctx.events
        .publish(
            &reference,
            EventType::Normal,
            reasons::DELETED,
            actions::DELETE,
            Some("Load balancer deleted".to_string()),
        )
        .await;

    let network = &mut scope.managed_cluster.spec.network;
    network.load_balancer_id = None;
    network.load_balancer_config_id = None;

    release_finalizers(ctx, scope).await
}

/// Credentials secret first, then the resource itself
async fn release_finalizers(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
) -> Result<(), ReconcilerError> {
    if let Err(e) = remove_credentials_ref_finalizer(scope.store(), &scope.managed_cluster).await {
        error!(error = %e, "failed to remove credentials finalizer");
        set_failure_reason(ctx, scope, ClusterStatusError::DeleteError, &e).await;
        return Err(e);
    }
    remove_finalizer(&mut scope.managed_cluster);
    Ok(())
}
