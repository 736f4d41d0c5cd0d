//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `aivenator_aiven_applications_processed` - Applications processed, by synchronization state
//! - `aivenator_aiven_application_processing_time_seconds` - Time from observed to synchronized
//! - `aivenator_aiven_applications_requeued` - Requeues scheduled for owner-reference drift
//! - `aivenator_processing_reason` - Why a synchronization was deemed necessary
//! - `aivenator_kubernetes_resources_written` - Resources written, by namespace and type
//! - `aivenator_kubernetes_resources_deleted` - Resources deleted, by namespace and type
//! - `aivenator_kubernetes_latency_seconds` - Kubernetes API latency, by operation
//! - `aivenator_aiven_latency_seconds` - Upstream Aiven API latency, by operation/status/pool
//! - `aivenator_secrets_managed` - Managed secrets, by namespace and state

use std::future::Future;
use std::sync::LazyLock;
use std::time::Instant;

use anyhow::Result;
use prometheus::{
    exponential_buckets, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
};

const NAMESPACE: &str = "aivenator";

pub const LABEL_SYNC_STATE: &str = "synchronization_state";
pub const LABEL_NAMESPACE: &str = "namespace";
pub const LABEL_RESOURCE_TYPE: &str = "resource_type";
pub const LABEL_OPERATION: &str = "operation";
pub const LABEL_STATUS: &str = "status";
pub const LABEL_POOL: &str = "pool";
pub const LABEL_REASON: &str = "reason";
pub const LABEL_SECRET_STATE: &str = "state";

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static APPLICATIONS_PROCESSED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "aiven_applications_processed",
            "number of applications synchronized with aiven",
        )
        .namespace(NAMESPACE),
        &[LABEL_SYNC_STATE],
    )
    .expect("Failed to create APPLICATIONS_PROCESSED metric - this should never happen")
});

static APPLICATION_PROCESSING_TIME: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "aiven_application_processing_time_seconds",
            "seconds from observed to synchronized successfully",
        )
        .namespace(NAMESPACE)
        .buckets(
            exponential_buckets(0.1, 1.4, 20)
                .expect("Failed to create histogram buckets - this should never happen"),
        ),
        &[LABEL_SYNC_STATE],
    )
    .expect("Failed to create APPLICATION_PROCESSING_TIME metric - this should never happen")
});

static APPLICATIONS_REQUEUED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "aiven_applications_requeued",
            "number of applications requeued to pick up late owner references",
        )
        .namespace(NAMESPACE),
        &[LABEL_SYNC_STATE],
    )
    .expect("Failed to create APPLICATIONS_REQUEUED metric - this should never happen")
});

static PROCESSING_REASON: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "processing_reason",
            "reason why a synchronization was deemed necessary",
        )
        .namespace(NAMESPACE),
        &[LABEL_REASON],
    )
    .expect("Failed to create PROCESSING_REASON metric - this should never happen")
});

static KUBERNETES_RESOURCES_WRITTEN: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubernetes_resources_written",
            "number of kubernetes resources written to the cluster",
        )
        .namespace(NAMESPACE),
        &[LABEL_NAMESPACE, LABEL_RESOURCE_TYPE],
    )
    .expect("Failed to create KUBERNETES_RESOURCES_WRITTEN metric - this should never happen")
});

static KUBERNETES_RESOURCES_DELETED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "kubernetes_resources_deleted",
            "number of kubernetes resources deleted from the cluster",
        )
        .namespace(NAMESPACE),
        &[LABEL_NAMESPACE, LABEL_RESOURCE_TYPE],
    )
    .expect("Failed to create KUBERNETES_RESOURCES_DELETED metric - this should never happen")
});

static KUBERNETES_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "kubernetes_latency_seconds",
            "latency in kubernetes api operations",
        )
        .namespace(NAMESPACE)
        .buckets(
            exponential_buckets(0.025, 1.42, 20)
                .expect("Failed to create histogram buckets - this should never happen"),
        ),
        &[LABEL_OPERATION],
    )
    .expect("Failed to create KUBERNETES_LATENCY metric - this should never happen")
});

static AIVEN_LATENCY: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new("aiven_latency_seconds", "latency in aiven api operations")
            .namespace(NAMESPACE)
            .buckets(
                exponential_buckets(0.025, 1.42, 20)
                    .expect("Failed to create histogram buckets - this should never happen"),
            ),
        &[LABEL_OPERATION, LABEL_STATUS, LABEL_POOL],
    )
    .expect("Failed to create AIVEN_LATENCY metric - this should never happen")
});

static SECRETS_MANAGED: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new("secrets_managed", "number of secrets managed").namespace(NAMESPACE),
        &[LABEL_NAMESPACE, LABEL_SECRET_STATE],
    )
    .expect("Failed to create SECRETS_MANAGED metric - this should never happen")
});

/// Why the decider concluded a synchronization is necessary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingReason {
    HashChanged,
    MissingSecret,
    MissingOwnerReference,
}

impl ProcessingReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingReason::HashChanged => "HashChanged",
            ProcessingReason::MissingSecret => "MissingSecret",
            ProcessingReason::MissingOwnerReference => "MissingOwnerReference",
        }
    }
}

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(APPLICATIONS_PROCESSED.clone()))?;
    REGISTRY.register(Box::new(APPLICATION_PROCESSING_TIME.clone()))?;
    REGISTRY.register(Box::new(APPLICATIONS_REQUEUED.clone()))?;
    REGISTRY.register(Box::new(PROCESSING_REASON.clone()))?;
    REGISTRY.register(Box::new(KUBERNETES_RESOURCES_WRITTEN.clone()))?;
    REGISTRY.register(Box::new(KUBERNETES_RESOURCES_DELETED.clone()))?;
    REGISTRY.register(Box::new(KUBERNETES_LATENCY.clone()))?;
    REGISTRY.register(Box::new(AIVEN_LATENCY.clone()))?;
    REGISTRY.register(Box::new(SECRETS_MANAGED.clone()))?;

    Ok(())
}

pub fn inc_applications_processed(synchronization_state: &str) {
    APPLICATIONS_PROCESSED
        .with_label_values(&[synchronization_state])
        .inc();
}

pub fn observe_processing_time(synchronization_state: &str, seconds: f64) {
    APPLICATION_PROCESSING_TIME
        .with_label_values(&[synchronization_state])
        .observe(seconds);
}

pub fn inc_applications_requeued(synchronization_state: &str) {
    APPLICATIONS_REQUEUED
        .with_label_values(&[synchronization_state])
        .inc();
}

pub fn inc_processing_reason(reason: ProcessingReason) {
    PROCESSING_REASON.with_label_values(&[reason.as_str()]).inc();
}

pub fn inc_resources_written(namespace: &str, resource_type: &str) {
    KUBERNETES_RESOURCES_WRITTEN
        .with_label_values(&[namespace, resource_type])
        .inc();
}

pub fn inc_resources_deleted(namespace: &str, resource_type: &str) {
    KUBERNETES_RESOURCES_DELETED
        .with_label_values(&[namespace, resource_type])
        .inc();
}

pub fn set_secrets_managed(namespace: &str, state: &str, count: i64) {
    SECRETS_MANAGED
        .with_label_values(&[namespace, state])
        .set(count);
}

/// Run a Kubernetes API call and record its latency under `operation`.
pub async fn observe_kubernetes_latency<T, E, F>(operation: &str, call: F) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    let start = Instant::now();
    let result = call.await;
    KUBERNETES_LATENCY
        .with_label_values(&[operation])
        .observe(start.elapsed().as_secs_f64());
    result
}

/// Run an upstream Aiven API call and record its latency. The status label
/// is "200" on success and "0" when the error carries no HTTP status.
pub async fn observe_aiven_latency<T, E, F>(
    operation: &str,
    pool: &str,
    call: F,
) -> std::result::Result<T, E>
where
    F: Future<Output = std::result::Result<T, E>>,
{
    let start = Instant::now();
    let result = call.await;
    let status = if result.is_ok() { "200" } else { "0" };
    AIVEN_LATENCY
        .with_label_values(&[operation, status, pool])
        .observe(start.elapsed().as_secs_f64());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn aiven_latency_separates_success_and_failure_by_status_label() {
        let result =
            observe_aiven_latency("ServiceUser_Create", "test-pool", async { Ok::<_, &str>(7) })
                .await;
        assert_eq!(result, Ok(7));
        assert_eq!(
            AIVEN_LATENCY
                .with_label_values(&["ServiceUser_Create", "200", "test-pool"])
                .get_sample_count(),
            1
        );
        assert_eq!(
            AIVEN_LATENCY
                .with_label_values(&["ServiceUser_Create", "0", "test-pool"])
                .get_sample_count(),
            0
        );

        let result = observe_aiven_latency("ServiceUser_Create", "test-pool", async {
            Err::<i32, &str>("upstream down")
        })
        .await;
        assert_eq!(result, Err("upstream down"));
        assert_eq!(
            AIVEN_LATENCY
                .with_label_values(&["ServiceUser_Create", "0", "test-pool"])
                .get_sample_count(),
            1
        );
    }

    #[tokio::test]
    async fn kubernetes_latency_records_per_operation() {
        let result =
            observe_kubernetes_latency("Test_Get", async { Ok::<_, &str>("object") }).await;
        assert_eq!(result, Ok("object"));

        let result =
            observe_kubernetes_latency("Test_Get", async { Err::<i32, &str>("conflict") }).await;
        assert_eq!(result, Err("conflict"));

        // Both outcomes land in the same per-operation series.
        assert_eq!(
            KUBERNETES_LATENCY
                .with_label_values(&["Test_Get"])
                .get_sample_count(),
            2
        );
    }
}
