//! # Dependent workloads
//!
//! Finds the pod-owning workloads that should own an application's secret.
//! A workload qualifies when it lives in the application's namespace,
//! carries the application's `app` label, belongs to the same deployment
//! rollout (correlation id), and mounts the secret through the
//! `aiven-credentials` volume.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ListParams;
use kube::{Api, Client, ResourceExt};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::constants::{AIVEN_VOLUME_NAME, APP_LABEL, DEPLOYMENT_CORRELATION_ID_ANNOTATION};
use crate::crd::ManagedApplication;
use crate::observability::metrics::observe_kubernetes_latency;
use crate::utils::Workload;

/// Uniform access to the pod template of the workload kinds that can own a
/// managed secret.
pub(crate) trait PodOwner:
    kube::Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + k8s_openapi::Resource
    + Clone
    + DeserializeOwned
    + std::fmt::Debug
{
    fn pod_spec(&self) -> Option<&PodSpec>;
}

impl PodOwner for ReplicaSet {
    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()?.template.as_ref()?.spec.as_ref()
    }
}

impl PodOwner for Job {
    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec.as_ref()?.template.spec.as_ref()
    }
}

impl PodOwner for CronJob {
    fn pod_spec(&self) -> Option<&PodSpec> {
        self.spec
            .as_ref()?
            .job_template
            .spec
            .as_ref()?
            .template
            .spec
            .as_ref()
    }
}

/// All pod-owning workloads that should own the application's secret.
/// The kinds queried here are the same ones the decider accepts as relevant
/// owner references.
pub(crate) async fn find_dependent_objects<A: ManagedApplication>(
    client: &Client,
    application: &A,
) -> Vec<Workload> {
    let mut result = Vec::new();
    result.extend(find_pod_owners::<ReplicaSet, A>(client, application).await);
    result.extend(find_pod_owners::<CronJob, A>(client, application).await);
    result.extend(find_pod_owners::<Job, A>(client, application).await);
    result
}

async fn find_pod_owners<K, A>(client: &Client, application: &A) -> Vec<Workload>
where
    K: PodOwner,
    A: ManagedApplication,
{
    let kind = <K as k8s_openapi::Resource>::KIND;
    let name = application.name_any();

    let Some(correlation_id) = application.correlation_id() else {
        info!(
            application = %name,
            kind,
            "missing deployment correlation id; unable to find owning workloads"
        );
        return Vec::new();
    };

    let namespace = application.namespace().unwrap_or_default();
    let api: Api<K> = Api::namespaced(client.clone(), &namespace);
    let params = ListParams::default().labels(&format!("{APP_LABEL}={name}"));

    let list = match observe_kubernetes_latency(&format!("{kind}_List"), api.list(&params)).await {
        Ok(list) => list,
        Err(err) => {
            warn!(kind, error = %err, "failed to list workloads");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    for object in &list.items {
        let same_rollout = object
            .meta()
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(DEPLOYMENT_CORRELATION_ID_ANNOTATION))
            .is_some_and(|id| id == correlation_id);
        if !same_rollout {
            continue;
        }

        let Some(pod_spec) = object.pod_spec() else {
            continue;
        };
        if !mounts_credentials_volume(pod_spec, application.secret_name()) {
            continue;
        }

        if let Some(workload) = Workload::from_object(object) {
            found.push(workload);
        }
    }

    if found.is_empty() {
        info!(
            kind,
            correlation_id,
            secret_name = application.secret_name(),
            "no matching workload found"
        );
    }
    found
}

fn mounts_credentials_volume(pod_spec: &PodSpec, secret_name: &str) -> bool {
    pod_spec.volumes.iter().flatten().any(|volume| {
        volume.name == AIVEN_VOLUME_NAME
            && volume
                .secret
                .as_ref()
                .and_then(|source| source.secret_name.as_deref())
                == Some(secret_name)
    })
}
