//! # Secret composition
//!
//! Builds the managed secret for an application: identity, the managed-type
//! labels, rollout annotations, owner references for the dependent
//! workloads, and the creation timestamp. The baseline secret read from the
//! cluster passes through untouched apart from these additions, so
//! unrelated labels, annotations, finalizers and owner references survive
//! updates.

use anyhow::{anyhow, bail};
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use regex::Regex;

use crate::constants::{
    AIVENATOR_PROTECTED_ANNOTATION, AIVENATOR_SECRET_TYPE, AIVEN_CREATED_KEY, APP_LABEL,
    DEPLOYMENT_CORRELATION_ID_ANNOTATION, SECRET_TYPE_LABEL, TEAM_LABEL,
};
use crate::crd::ManagedApplication;
use crate::error::{AivenatorError, Result};
use crate::utils::{same_reference, Workload};

#[derive(Debug, Clone, Copy, Default)]
pub struct SecretHandler;

impl SecretHandler {
    pub fn apply<A: ManagedApplication>(
        &self,
        application: &A,
        dependents: &[Workload],
        secret: &mut Secret,
    ) -> Result<()> {
        let secret_name = application.secret_name();
        validate_secret_name(secret_name).map_err(AivenatorError::unrecoverable)?;

        let namespace = application.namespace().unwrap_or_default();
        secret.metadata.name = Some(secret_name.to_string());
        secret.metadata.namespace = Some(namespace.clone());

        let labels = secret.metadata.labels.get_or_insert_with(Default::default);
        labels.insert(SECRET_TYPE_LABEL.to_string(), AIVENATOR_SECRET_TYPE.to_string());
        labels.insert(APP_LABEL.to_string(), application.name_any());
        labels.insert(TEAM_LABEL.to_string(), namespace);

        let annotations = secret
            .metadata
            .annotations
            .get_or_insert_with(Default::default);
        if let Some(correlation_id) = application.correlation_id() {
            annotations.insert(
                DEPLOYMENT_CORRELATION_ID_ANNOTATION.to_string(),
                correlation_id.to_string(),
            );
        }
        if application.is_protected() {
            annotations.insert(AIVENATOR_PROTECTED_ANNOTATION.to_string(), "true".to_string());
        }

        let references = secret
            .metadata
            .owner_references
            .get_or_insert_with(Default::default);
        for dependent in dependents {
            let reference = dependent.owner_reference();
            if !references.iter().any(|existing| same_reference(existing, &reference)) {
                references.push(reference);
            }
        }

        secret
            .string_data
            .get_or_insert_with(Default::default)
            .insert(AIVEN_CREATED_KEY.to_string(), Utc::now().to_rfc3339());

        Ok(())
    }
}

/// Validate the target secret name as an RFC 1123 subdomain.
/// An empty or invalid name can never become writable, so callers treat a
/// failure here as unrecoverable.
pub fn validate_secret_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        bail!("secret name is empty");
    }

    if name.len() > 253 {
        bail!(
            "secret name {:?} exceeds maximum length of 253 characters (got {})",
            name,
            name.len()
        );
    }

    // RFC 1123 subdomain: lowercase alphanumeric, hyphens, dots;
    // cannot start/end with hyphen or dot
    let name_regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| anyhow!("Failed to compile regex: {e}"))?;

    if !name_regex.is_match(name) {
        bail!(
            "secret name {:?} must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)",
            name
        );
    }

    Ok(())
}
