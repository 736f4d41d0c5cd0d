//! # Credentials manager
//!
//! The contract between the reconciler and the credentials provider. The
//! reconciler hands over the application, the dependent workloads and the
//! existing secret as a baseline, and gets back the fully populated secret
//! to write.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;

use crate::crd::ManagedApplication;
use crate::credentials::secret::SecretHandler;
use crate::error::Result;
use crate::utils::Workload;

/// Synthesizes the managed secret for an application.
///
/// Implementations must preserve the baseline's pre-existing labels,
/// annotations, finalizers and unrelated owner references, merge one owner
/// reference per dependent, stamp the creation timestamp, and fail
/// unrecoverably when the target secret name is empty or invalid.
#[async_trait]
pub trait Manager<A: ManagedApplication>: Send + Sync + 'static {
    async fn create_secret(
        &self,
        application: &A,
        dependents: &[Workload],
        baseline: Secret,
    ) -> Result<Secret>;
}

/// The production manager. Composition happens here; the credential material
/// itself comes from the upstream Aiven handlers plugged in behind this
/// type.
#[derive(Debug, Clone, Default)]
pub struct CredentialsManager {
    secrets: SecretHandler,
}

impl CredentialsManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl<A: ManagedApplication> Manager<A> for CredentialsManager {
    async fn create_secret(
        &self,
        application: &A,
        dependents: &[Workload],
        baseline: Secret,
    ) -> Result<Secret> {
        let mut secret = baseline;
        self.secrets.apply(application, dependents, &mut secret)?;
        Ok(secret)
    }
}
