//! # Expiration
//!
//! Time-limited applications are deleted once `expiresAt` has passed. The
//! delete is idempotent: an application already gone counts as deleted.

use kube::api::DeleteParams;
use kube::{Api, ResourceExt};
use tracing::{debug, info};

use crate::crd::ManagedApplication;
use crate::error::{is_not_found, AivenatorError, Result};
use crate::observability::metrics::{self, observe_kubernetes_latency};
use crate::utils::{expired, parse_expires_at};

/// Delete the application if its time limit has passed. Returns `true` when
/// the application was deleted and the reconciliation must end.
pub(crate) async fn handle_time_limited<A: ManagedApplication>(
    api: &Api<A>,
    application: &A,
) -> Result<bool> {
    let Some(raw) = application.expires_at() else {
        return Ok(false);
    };

    let expires_at = parse_expires_at(raw).map_err(AivenatorError::unrecoverable)?;
    if !expired(expires_at) {
        return Ok(false);
    }

    info!(
        application = %application.name_any(),
        expires_at = %expires_at.to_rfc3339(),
        "application time limit exceeded"
    );
    delete_application(api, application).await?;
    Ok(true)
}

async fn delete_application<A: ManagedApplication>(api: &Api<A>, application: &A) -> Result<()> {
    let name = application.name_any();
    match observe_kubernetes_latency(
        "AivenApplication_Delete",
        api.delete(&name, &DeleteParams::default()),
    )
    .await
    {
        Ok(_) => {
            info!(application = %name, "application deleted from cluster");
            metrics::inc_resources_deleted(
                &application.namespace().unwrap_or_default(),
                "AivenApplication",
            );
            Ok(())
        }
        Err(err) if is_not_found(&err) => {
            debug!(application = %name, "application does not exist in cluster");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
