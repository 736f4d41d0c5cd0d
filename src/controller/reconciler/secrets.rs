//! # Secret writer
//!
//! Create-or-update of the managed secret under a bounded deadline. The
//! update copies the live `resourceVersion` onto the candidate, so the API
//! server rejects writes racing a newer version.

use anyhow::anyhow;
use k8s_openapi::api::core::v1::Secret;
use kube::api::PostParams;
use kube::{Api, Client, ResourceExt};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::constants::SECRET_WRITE_TIMEOUT_SECS;
use crate::crd::ManagedApplication;
use crate::error::{is_not_found, AivenatorError, Result};
use crate::observability::metrics::{self, observe_kubernetes_latency};

/// Read the existing secret as the baseline for composition, so unrelated
/// labels, annotations, finalizers and owner references survive the update.
/// Any problem reading it degrades to an empty baseline.
pub(crate) async fn init_secret<A: ManagedApplication>(client: &Client, application: &A) -> Secret {
    let namespace = application.namespace().unwrap_or_default();
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);
    match observe_kubernetes_latency("Secret_Get", api.get(application.secret_name())).await {
        Ok(secret) => secret,
        Err(err) if is_not_found(&err) => Secret::default(),
        Err(err) => {
            warn!(error = %err, "error retrieving existing secret from cluster");
            Secret::default()
        }
    }
}

/// Write the secret to the cluster, creating or updating as needed. The
/// whole sequence runs under the write deadline; identical inputs produce
/// identical server state up to `resourceVersion`.
pub(crate) async fn save_secret(client: &Client, secret: &Secret) -> Result<()> {
    let namespace = secret.namespace().unwrap_or_default();
    let name = secret
        .metadata
        .name
        .clone()
        .ok_or_else(|| AivenatorError::local("SaveSecret", anyhow!("secret has no name")))?;
    let api: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    let write = async {
        match observe_kubernetes_latency("Secret_Get", api.get(&name)).await {
            Err(err) if is_not_found(&err) => {
                info!(secret = %name, "saving secret");
                observe_kubernetes_latency("Secret_Create", api.create(&PostParams::default(), secret))
                    .await
                    .map(|_| ())
            }
            Err(err) => Err(err),
            Ok(old) => {
                info!(secret = %name, "updating secret");
                let mut candidate = secret.clone();
                candidate.metadata.resource_version = old.metadata.resource_version.clone();
                observe_kubernetes_latency(
                    "Secret_Update",
                    api.replace(&name, &PostParams::default(), &candidate),
                )
                .await
                .map(|_| ())
            }
        }
    };

    let deadline = Duration::from_secs(SECRET_WRITE_TIMEOUT_SECS);
    match timeout(deadline, write).await {
        Ok(Ok(())) => {
            metrics::inc_resources_written(&namespace, "Secret");
            Ok(())
        }
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(AivenatorError::local(
            "SaveSecret",
            anyhow!("secret write deadline of {deadline:?} exceeded"),
        )),
    }
}
