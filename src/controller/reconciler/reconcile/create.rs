//! # Create
//!
//! Provisions the load balancer and its listener, then publishes the endpoint.
//!
//! Every step is idempotent: a load balancer recorded on the spec, or one
//! carrying the cluster's label and owner tag, is adopted instead of created
//! again. A labelled load balancer owned by anything else is a conflict.

use super::set_failure_reason;
use crate::controller::reconciler::conditions::mark_false;
use crate::controller::reconciler::finalizers::add_credentials_ref_finalizer;
use crate::controller::reconciler::scope::ClusterScope;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{ApiEndpoint, ClusterStatusError, ConditionSeverity, READY_CONDITION};
use crate::provider::{
    load_balancer_label, load_balancer_tags, LoadBalancer, LoadBalancerConfigSpec,
    LoadBalancerSpec,
};
use kube::ResourceExt;
use tracing::{debug, error, info, warn};

pub async fn reconcile_create(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
) -> Result<(), ReconcilerError> {
    let port = scope.managed_cluster.spec.network.port();
    if !(1..=65535).contains(&port) {
        let err = ReconcilerError::Validation(format!(
            "load balancer port {port} is outside 1-65535"
        ));
        fail_immediately(ctx, scope, ClusterStatusError::InvalidConfiguration, &err).await;
        return Err(err);
    }

    // The secret must be protected before the first remote mutation
    if let Err(e) = add_credentials_ref_finalizer(scope.store(), &scope.managed_cluster).await {
        error!(error = %e, "failed to add credentials finalizer");
        set_failure_reason(ctx, scope, ClusterStatusError::CreateError, &e).await;
        return Err(e);
    }

    let (lb, ipv4) = match ensure_load_balancer(scope).await {
        Ok(found) => found,
        Err(e) if e.is_terminal() => {
            error!(error = %e, "cloud API returned an unusable load balancer");
            fail_immediately(ctx, scope, ClusterStatusError::CreateError, &e).await;
            return Err(e);
        }
        Err(e) => {
            error!(error = %e, "failed to create load balancer");
            set_failure_reason(ctx, scope, ClusterStatusError::CreateError, &e).await;
            return Err(e);
        }
    };
    let network = &mut scope.managed_cluster.spec.network;
    if network.load_balancer_id != Some(lb.id) {
        // A recorded config belongs to the previous load balancer
        network.load_balancer_config_id = None;
    }
    network.load_balancer_id = Some(lb.id);

    let config_port = match scope.managed_cluster.spec.network.load_balancer_config_id {
        Some(config_id) => {
            debug!(config.id = config_id, "reusing recorded load balancer config");
            port
        }
        None => {
            let spec = LoadBalancerConfigSpec::tcp(port);
            match scope.client.create_load_balancer_config(lb.id, &spec).await {
                Ok(config) => {
                    info!(load_balancer.id = lb.id, config.id = config.id, port = config.port, "created load balancer config");
                    scope.managed_cluster.spec.network.load_balancer_config_id = Some(config.id);
                    config.port
                }
                Err(e) => {
                    let e = ReconcilerError::from(e);
                    error!(error = %e, "failed to create load balancer config");
                    set_failure_reason(ctx, scope, ClusterStatusError::CreateError, &e).await;
                    return Err(e);
                }
            }
        }
    };

    scope.managed_cluster.spec.control_plane_endpoint = ApiEndpoint {
        host: ipv4,
        port: config_port,
    };
    Ok(())
}

/// Find or create the cluster's load balancer, returning it with its address
async fn ensure_load_balancer(
    scope: &ClusterScope,
) -> Result<(LoadBalancer, String), ReconcilerError> {
    let namespace = scope.managed_cluster.namespace().unwrap_or_default();
    let name = scope.managed_cluster.name_any();
    let uid = scope.managed_cluster.uid().unwrap_or_default();
    let label = load_balancer_label(&namespace, &name);

    let lb = match existing_load_balancer(scope, &label, &uid).await? {
        Some(lb) => lb,
        None => {
            let spec = LoadBalancerSpec {
                label,
                region: scope.managed_cluster.spec.region.clone(),
                tags: load_balancer_tags(&namespace, &name, &uid),
            };
            let lb = scope.client.create_load_balancer(&spec).await?;
            info!(load_balancer.id = lb.id, label = %lb.label, "created load balancer");
            lb
        }
    };

    if lb.id <= 0 {
        return Err(ReconcilerError::InvariantViolation(
            "load balancer was reported without an id".to_string(),
        ));
    }
    match lb.ipv4.clone() {
        Some(ipv4) if !ipv4.is_empty() => Ok((lb, ipv4)),
        _ => Err(ReconcilerError::InvariantViolation(format!(
            "load balancer {} was reported without an IPv4 address",
            lb.id
        ))),
    }
}

/// The recorded load balancer if it still exists, else one carrying our label
/// and owner tag
async fn existing_load_balancer(
    scope: &ClusterScope,
    label: &str,
    uid: &str,
) -> Result<Option<LoadBalancer>, ReconcilerError> {
    if let Some(id) = scope.managed_cluster.spec.network.load_balancer_id {
        match scope.client.get_load_balancer(id).await {
            Ok(lb) => {
                debug!(load_balancer.id = id, "reusing recorded load balancer");
                return Ok(Some(lb));
            }
            Err(e) if e.is_not_found() => {
                info!(load_balancer.id = id, "recorded load balancer no longer exists");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let Some(lb) = scope.client.find_load_balancer(label).await? else {
        return Ok(None);
    };
    if !lb.is_owned_by(uid) {
        warn!(load_balancer.id = lb.id, label, tags = ?lb.tags, "labelled load balancer is not owned by this cluster");
        return Err(ReconcilerError::LoadBalancerConflict(format!(
            "load balancer {} labelled {label} is not owned by this cluster",
            lb.id
        )));
    }
    info!(load_balancer.id = lb.id, label, "adopting existing load balancer");
    Ok(Some(lb))
}

/// Record a failure that must not wait out the grace window
async fn fail_immediately(
    ctx: &Reconciler,
    scope: &mut ClusterScope,
    reason: ClusterStatusError,
    err: &ReconcilerError,
) {
    set_failure_reason(ctx, scope, reason, err).await;
    let status = scope.managed_cluster.status.get_or_insert_with(Default::default);
    mark_false(
        status,
        READY_CONDITION,
        reason.as_str(),
        ConditionSeverity::Error,
        &err.to_string(),
        ctx.clock.now(),
    );
}
