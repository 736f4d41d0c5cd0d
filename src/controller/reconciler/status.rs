//! # Status handling
//!
//! Success and failure marking on the application status, and the epilogue
//! every reconciliation runs: stamp `synchronizationTime` and
//! `observedGeneration`, then push the status to the cluster. Conditions are
//! last-writer-wins per type, so a later success cleanly flips earlier
//! failure conditions back to `False`.

use chrono::Utc;
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use tracing::error;

use crate::constants::{ROLLOUT_COMPLETE, ROLLOUT_FAILED, UNKNOWN_STATE};
use crate::crd::{
    AivenApplicationCondition, AivenApplicationConditionType, ManagedApplication,
};
use crate::error::AivenatorError;
use crate::observability::metrics::{self, observe_kubernetes_latency};

/// Record a successful synchronization.
pub(crate) fn success<A: ManagedApplication>(application: &mut A, hash: &str) {
    let generation = application.meta().generation;
    let status = application.status_mut();
    status.synchronization_hash = Some(hash.to_string());
    status.synchronization_state = Some(ROLLOUT_COMPLETE.to_string());
    status.synchronized_generation = generation;
    status.add_condition(AivenApplicationCondition::new(
        AivenApplicationConditionType::Succeeded,
        true,
    ));
    status.add_condition(AivenApplicationCondition::new(
        AivenApplicationConditionType::AivenFailure,
        false,
    ));
    status.add_condition(AivenApplicationCondition::new(
        AivenApplicationConditionType::LocalFailure,
        false,
    ));
}

/// Record a failed reconciliation attempt. The condition type follows the
/// error classification.
pub(crate) fn failure<A: ManagedApplication>(application: &mut A, err: &AivenatorError) {
    let condition_type = match err {
        AivenatorError::Aiven(_) => AivenApplicationConditionType::AivenFailure,
        _ => AivenApplicationConditionType::LocalFailure,
    };
    let status = application.status_mut();
    status.add_condition(AivenApplicationCondition::new(condition_type, true));
    status.synchronization_state = Some(ROLLOUT_FAILED.to_string());
}

/// The state label for metrics; "unknown" before the first attempt settles.
pub(crate) fn sync_state<A: ManagedApplication>(application: &A) -> String {
    application
        .status()
        .and_then(|status| status.synchronization_state.clone())
        .filter(|state| !state.is_empty())
        .unwrap_or_else(|| UNKNOWN_STATE.to_string())
}

/// Runs at the end of every reconciliation, success or failure: stamp the
/// attempt and push the status subresource. A conflict here is logged and
/// resolved by the next event.
pub(crate) async fn finalize<A: ManagedApplication>(client: &Client, application: &mut A) {
    let name = application.name_any();
    let namespace = application.namespace().unwrap_or_default();
    let generation = application.meta().generation;

    {
        let status = application.status_mut();
        status.synchronization_time = Some(Utc::now().to_rfc3339());
        status.observed_generation = generation;
    }

    let api: Api<A> = Api::namespaced(client.clone(), &namespace);
    let patch = serde_json::json!({ "status": application.status() });
    let result = observe_kubernetes_latency(
        "AivenApplication_Update",
        api.patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch)),
    )
    .await;

    match result {
        Ok(_) => metrics::inc_resources_written(&namespace, "AivenApplication"),
        Err(err) => error!(
            application = %name,
            error = %err,
            status = ?application.status(),
            "unable to update status of application"
        ),
    }
}
