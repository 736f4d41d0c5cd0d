//! # Custom resources
//!
//! The `AivenApplication` CRD, its status types, and the
//! [`ManagedApplication`] abstraction the reconciliation engine is written
//! against. The platform ships two near-identical application schemas; the
//! engine only ever talks to the trait, so a second schema plugs in without
//! touching the reconciler.

use chrono::Utc;
use k8s_openapi::NamespaceResourceScope;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::DEPLOYMENT_CORRELATION_ID_ANNOTATION;
use crate::error::{AivenatorError, Result};

/// AivenApplication describes the desired credential provisioning for one
/// workload: which secret to write, whether it is protected against
/// overwrite, and when (if ever) the application expires.
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "aiven.nais.io",
    version = "v1",
    kind = "AivenApplication",
    namespaced,
    status = "AivenApplicationStatus",
    shortname = "aivenapp",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.synchronizationState"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AivenApplicationSpec {
    /// Name of the secret the credentials are written to
    pub secret_name: String,
    /// Once the secret is written, never overwrite or delete it
    #[serde(default)]
    pub protected: bool,
    /// Delete the application after this instant (RFC3339 or YYYY-MM-DD)
    #[serde(default)]
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AivenApplicationStatus {
    /// Hash of the last successfully applied spec
    #[serde(default)]
    pub synchronization_hash: Option<String>,
    /// "", RolloutComplete or RolloutFailed
    #[serde(default)]
    pub synchronization_state: Option<String>,
    #[serde(default)]
    pub synchronized_generation: Option<i64>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// RFC3339 timestamp of the last reconciliation attempt
    #[serde(default)]
    pub synchronization_time: Option<String>,
    #[serde(default)]
    pub conditions: Vec<AivenApplicationCondition>,
}

impl AivenApplicationStatus {
    /// Record a condition, replacing any previous entry of the same type.
    pub fn add_condition(&mut self, condition: AivenApplicationCondition) {
        if let Some(existing) = self
            .conditions
            .iter_mut()
            .find(|c| c.r#type == condition.r#type)
        {
            *existing = condition;
        } else {
            self.conditions.push(condition);
        }
    }

    pub fn condition(
        &self,
        r#type: AivenApplicationConditionType,
    ) -> Option<&AivenApplicationCondition> {
        self.conditions.iter().find(|c| c.r#type == r#type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AivenApplicationConditionType {
    Succeeded,
    AivenFailure,
    LocalFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AivenApplicationCondition {
    pub r#type: AivenApplicationConditionType,
    /// "True" or "False"
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
}

impl AivenApplicationCondition {
    pub fn new(r#type: AivenApplicationConditionType, value: bool) -> Self {
        Self {
            r#type,
            status: (if value { "True" } else { "False" }).to_string(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
        }
    }
}

/// Fields that feed the synchronization hash. Struct-field order fixes the
/// serialization, so the digest is stable across restarts and never depends
/// on map iteration order.
#[derive(Serialize)]
struct Fingerprint<'a> {
    name: String,
    namespace: String,
    secret_name: &'a str,
    protected: bool,
    expires_at: Option<&'a str>,
    correlation_id: Option<&'a str>,
}

/// The application schema seen by the reconciliation engine.
///
/// Everything the engine needs (identity, the secret spec, expiry, the
/// deployment correlation id and the shared status block) is exposed here,
/// so the engine works for every CR variant implementing it.
pub trait ManagedApplication:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn secret_name(&self) -> &str;
    fn is_protected(&self) -> bool;
    fn expires_at(&self) -> Option<&str>;
    fn status(&self) -> Option<&AivenApplicationStatus>;
    fn status_mut(&mut self) -> &mut AivenApplicationStatus;

    fn correlation_id(&self) -> Option<&str> {
        self.meta()
            .annotations
            .as_ref()?
            .get(DEPLOYMENT_CORRELATION_ID_ANNOTATION)
            .map(String::as_str)
    }

    /// Stable content hash of the desired state. Unchanged hash means no
    /// credential work is required.
    fn hash(&self) -> Result<String> {
        let fingerprint = Fingerprint {
            name: self.name_any(),
            namespace: self.namespace().unwrap_or_default(),
            secret_name: self.secret_name(),
            protected: self.is_protected(),
            expires_at: self.expires_at(),
            correlation_id: self.correlation_id(),
        };
        let encoded = serde_json::to_vec(&fingerprint)
            .map_err(|err| AivenatorError::local("Hash", err))?;
        let mut hasher = Sha256::new();
        hasher.update(&encoded);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl ManagedApplication for AivenApplication {
    fn secret_name(&self) -> &str {
        &self.spec.secret_name
    }

    fn is_protected(&self) -> bool {
        self.spec.protected
    }

    fn expires_at(&self) -> Option<&str> {
        self.spec.expires_at.as_deref()
    }

    fn status(&self) -> Option<&AivenApplicationStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut AivenApplicationStatus {
        self.status.get_or_insert_with(AivenApplicationStatus::default)
    }
}
