//! # Synchronization decision
//!
//! Decides whether an application needs reconciliation. The rules are
//! ordered; the first match wins:
//!
//! 1. Spec hash changed
//! 2. Secret missing from the cluster
//! 3. (secret unreadable: fail)
//! 4. Secret protected: skip
//! 5. A dependent workload's owner reference is absent from the secret
//! 6. No owner reference resolves to a pod-owning workload of the secret's
//!    rollout
//! 7. Otherwise: skip

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::constants::DEPLOYMENT_CORRELATION_ID_ANNOTATION;
use crate::crd::ManagedApplication;
use crate::error::{is_not_found, Result};
use crate::observability::metrics::{self, observe_kubernetes_latency, ProcessingReason};
use crate::utils::{is_protected, same_reference, Workload};

/// Decide whether reconciliation must proceed for this application.
pub(crate) async fn needs_synchronization<A: ManagedApplication>(
    client: &Client,
    application: &A,
    hash: &str,
    dependents: &[Workload],
) -> Result<bool> {
    let name = application.name_any();

    let applied_hash = application
        .status()
        .and_then(|status| status.synchronization_hash.as_deref());
    if applied_hash != Some(hash) {
        info!(application = %name, "hash changed; needs synchronization");
        metrics::inc_processing_reason(ProcessingReason::HashChanged);
        return Ok(true);
    }

    let namespace = application.namespace().unwrap_or_default();
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    let existing =
        match observe_kubernetes_latency("Secret_Get", secrets.get(application.secret_name())).await
        {
            Ok(secret) => secret,
            Err(err) if is_not_found(&err) => {
                info!(application = %name, "secret not found; needs synchronization");
                metrics::inc_processing_reason(ProcessingReason::MissingSecret);
                return Ok(true);
            }
            Err(err) => return Err(err.into()),
        };

    if is_protected(&existing) {
        info!(application = %name, "protected and already synchronized");
        return Ok(false);
    }

    if missing_actual_owner_reference(dependents, &existing) {
        info!(application = %name, "missing ownerReference for existing workload; needs synchronization");
        metrics::inc_processing_reason(ProcessingReason::MissingOwnerReference);
        return Ok(true);
    }

    if missing_relevant_owner_reference(client, &existing).await {
        info!(application = %name, "missing relevant ownerReference; needs synchronization");
        metrics::inc_processing_reason(ProcessingReason::MissingOwnerReference);
        return Ok(true);
    }

    info!(application = %name, "already synchronized");
    Ok(false)
}

/// True when some dependent workload has no matching owner reference on the
/// secret. Matching is on the full reference tuple.
fn missing_actual_owner_reference(dependents: &[Workload], secret: &Secret) -> bool {
    dependents.iter().any(|dependent| {
        let wanted = dependent.owner_reference();
        !secret
            .metadata
            .owner_references
            .iter()
            .flatten()
            .any(|existing| same_reference(existing, &wanted))
    })
}

/// True when none of the secret's owner references points at a pod-owning
/// workload carrying the secret's correlation id. A secret without a
/// correlation id has nothing to converge towards.
pub(crate) async fn missing_relevant_owner_reference(client: &Client, secret: &Secret) -> bool {
    let Some(correlation_id) = secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(DEPLOYMENT_CORRELATION_ID_ANNOTATION))
    else {
        return false;
    };

    let namespace = secret.namespace().unwrap_or_default();
    for reference in secret.metadata.owner_references.iter().flatten() {
        if reference_matches_rollout(client, reference, correlation_id, &namespace).await {
            return false;
        }
    }
    true
}

async fn reference_matches_rollout(
    client: &Client,
    reference: &OwnerReference,
    correlation_id: &str,
    namespace: &str,
) -> bool {
    let fetched = match reference.kind.as_str() {
        "ReplicaSet" => fetch_correlation_id::<ReplicaSet>(client, namespace, &reference.name).await,
        "Job" => fetch_correlation_id::<Job>(client, namespace, &reference.name).await,
        "CronJob" => fetch_correlation_id::<CronJob>(client, namespace, &reference.name).await,
        _ => return false,
    };

    match fetched {
        Ok(Some(id)) => id == correlation_id,
        Ok(None) => false,
        Err(err) => {
            warn!(
                kind = %reference.kind,
                name = %reference.name,
                error = %err,
                "unable to get referenced owner"
            );
            false
        }
    }
}

async fn fetch_correlation_id<K>(
    client: &Client,
    namespace: &str,
    name: &str,
) -> std::result::Result<Option<String>, kube::Error>
where
    K: kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + std::fmt::Debug,
{
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    let operation = format!("{}_Get", K::kind(&()));
    let metadata = observe_kubernetes_latency(&operation, api.get_metadata(name)).await?;
    Ok(metadata
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(DEPLOYMENT_CORRELATION_ID_ANNOTATION))
        .cloned())
}
