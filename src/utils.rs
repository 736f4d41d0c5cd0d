//! # Utilities
//!
//! Owner-reference plumbing and timestamp handling shared by the reconciler
//! and the janitor.

use anyhow::{bail, Context};
use chrono::{DateTime, Local, NaiveDate, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::constants::AIVENATOR_PROTECTED_ANNOTATION;

/// A pod-owning workload that should own the managed secret.
///
/// Captures exactly the fields an owner reference carries, so the finder can
/// return plain values instead of the typed list items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl Workload {
    /// Capture a listed workload object. Returns `None` when the object has
    /// no name or uid, which the API server never produces.
    pub fn from_object<K>(object: &K) -> Option<Self>
    where
        K: kube::Resource<DynamicType = ()> + k8s_openapi::Resource,
    {
        let metadata = object.meta();
        Some(Self {
            api_version: <K as k8s_openapi::Resource>::API_VERSION.to_string(),
            kind: <K as k8s_openapi::Resource>::KIND.to_string(),
            name: metadata.name.clone()?,
            uid: metadata.uid.clone()?,
        })
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            name: self.name.clone(),
            uid: self.uid.clone(),
            ..OwnerReference::default()
        }
    }
}

/// Two references identify the same owner iff api-version, kind, name and
/// uid all match. Controller and deletion flags do not participate.
pub fn same_reference(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.api_version == b.api_version && a.kind == b.kind && a.name == b.name && a.uid == b.uid
}

/// True when the secret carries the protected annotation with value "true".
pub fn is_protected(secret: &Secret) -> bool {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(AIVENATOR_PROTECTED_ANNOTATION))
        .is_some_and(|value| value == "true")
}

/// Parse an application expiry timestamp.
///
/// Accepted grammar: RFC3339, or a bare `YYYY-MM-DD` interpreted as
/// 23:59:59 in the local zone. Anything else is rejected.
pub fn parse_expires_at(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let end_of_day = date
            .and_hms_opt(23, 59, 59)
            .context("constructing end-of-day timestamp")?;
        let local = end_of_day
            .and_local_timezone(Local)
            .earliest()
            .with_context(|| format!("no valid local time for {value}"))?;
        return Ok(local.with_timezone(&Utc));
    }

    bail!("unsupported timestamp format: {value:?} (expected RFC3339 or YYYY-MM-DD)")
}

pub fn expired(timestamp: DateTime<Utc>) -> bool {
    timestamp <= Utc::now()
}
