//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `cluster_lb_reconciliations_total` - Total number of reconciliations
//! - `cluster_lb_reconciliation_errors_total` - Reconciliation errors by kind
//! - `cluster_lb_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `cluster_lb_requeues_total` - Requeues by reason
//! - `cluster_lb_cloud_operations_total` - Cloud API calls by operation and result
//! - `cluster_lb_cloud_operation_duration_seconds` - Duration of cloud API calls by operation

use crate::provider::AdapterError;
use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "cluster_lb_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_lb_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "cluster_lb_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_lb_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static CLOUD_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cluster_lb_cloud_operations_total",
            "Total number of cloud API operations by operation and result",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create CLOUD_OPERATIONS_TOTAL metric - this should never happen")
});

static CLOUD_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "cluster_lb_cloud_operation_duration_seconds",
            "Duration of cloud API operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create CLOUD_OPERATION_DURATION metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLOUD_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLOUD_OPERATION_DURATION.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

/// Record one cloud API call
pub fn observe_cloud_operation<T>(
    operation: &str,
    result: &Result<T, AdapterError>,
    duration: Duration,
) {
    let label = match result {
        Ok(_) => "success",
        Err(AdapterError::NotFound(_)) => "not_found",
        Err(_) => "error",
    };
    CLOUD_OPERATIONS_TOTAL
        .with_label_values(&[operation, label])
        .inc();
    CLOUD_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

/// Render all registered metrics in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
