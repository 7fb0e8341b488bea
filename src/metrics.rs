// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the watcher certificate engine.
//!
//! All metrics carry the prefix `klm_certs_`.
//!
//! # Metrics Categories
//!
//! - **Gateway Secret Metrics** - seeding, bundling and switching of the gateway secret
//! - **SKR Certificate Metrics** - per-operation outcomes and overdue renewals
//! - **Reconciliation Metrics** - outcomes of controller passes
//!
//! # Example
//!
//! ```rust,no_run
//! use klm_certs::metrics::{gather_metrics, record_gateway_secret_operation};
//!
//! record_gateway_secret_operation("bundle");
//! let text = gather_metrics().unwrap();
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "klm_certs";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Gateway Secret Metrics
// ============================================================================

/// Total number of gateway secret transitions
///
/// Labels:
/// - `operation`: `seed`, `bundle`, `switch`, `legacy_sync`
pub static GATEWAY_SECRET_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_gateway_secret_operations_total"),
        "Total number of gateway secret transitions by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// SKR Certificate Metrics
// ============================================================================

/// Total number of SKR certificate operations
///
/// Labels:
/// - `operation`: `create`, `delete`, `renew`
/// - `status`: `success`, `error`, `skipped`
pub static SKR_CERTIFICATE_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_skr_certificate_operations_total"),
        "Total number of SKR certificate operations by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Whether the SKR certificate of a Kyma is overdue for renewal (1) or not (0)
///
/// Labels:
/// - `kyma`: Kyma name
pub static SELF_SIGNED_CERT_NOT_RENEWED: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_self_signed_cert_not_renewed"),
        "Indicates the self-signed SKR certificate was not renewed in time",
    );
    let gauge = GaugeVec::new(opts, &["kyma"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (e.g., `Secret`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource_type`: Kind of resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Record a gateway secret transition
pub fn record_gateway_secret_operation(operation: &str) {
    GATEWAY_SECRET_OPERATIONS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record the outcome of an SKR certificate operation
pub fn record_skr_certificate_operation(operation: &str, status: &str) {
    SKR_CERTIFICATE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record whether the SKR certificate of `kyma` is overdue for renewal
pub fn set_self_signed_cert_not_renewed(kyma: &str, overdue: bool) {
    SELF_SIGNED_CERT_NOT_RENEWED
        .with_label_values(&[kyma])
        .set(if overdue { 1.0 } else { 0.0 });
}

/// Drop the renewal gauge series of a deleted Kyma
pub fn remove_self_signed_cert_not_renewed(kyma: &str) {
    // Absent series are not an error for callers
    let _ = SELF_SIGNED_CERT_NOT_RENEWED.remove_label_values(&[kyma]);
}

/// Record successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - How long the reconciliation took
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record failed reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - How long the reconciliation took before failing
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
