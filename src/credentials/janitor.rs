//! # Janitor
//!
//! Removes managed secrets that nothing uses anymore. Two modes:
//!
//! - Per-application cleanup, invoked from the reconciler: secrets labeled
//!   for the application that are no longer its current target and are not
//!   mounted by any pod.
//! - Cluster sweep, on a periodic tick: every managed secret that no pod
//!   volume references.
//!
//! Protected secrets are never deleted. A not-found on delete is success;
//! other delete errors are collected so one bad secret does not stop the
//! rest of the pass.

use std::collections::{HashMap, HashSet};

use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{DeleteParams, ListParams};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use crate::constants::{AIVENATOR_SECRET_TYPE, APP_LABEL, SECRET_TYPE_LABEL};
use crate::crd::ManagedApplication;
use crate::error::{is_not_found, AivenatorError, Result};
use crate::observability::metrics;
use crate::utils::is_protected;

const STATE_IN_USE: &str = "in_use";
const STATE_ORPHANED: &str = "orphaned";
const STATE_PROTECTED: &str = "protected";

#[derive(Clone)]
pub struct Janitor {
    client: Client,
}

impl Janitor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Delete secrets previously written for this application that are no
    /// longer its current target and are not mounted by any pod in its
    /// namespace. Returns the delete errors; list failures surface as a
    /// single error.
    pub async fn clean_unused_secrets<A: ManagedApplication>(
        &self,
        application: &A,
    ) -> Vec<AivenatorError> {
        let namespace = application.namespace().unwrap_or_default();
        let selector = format!(
            "{SECRET_TYPE_LABEL}={AIVENATOR_SECRET_TYPE},{APP_LABEL}={}",
            application.name_any()
        );

        let secrets = match self.list_secrets(Some(&namespace), &selector).await {
            Ok(secrets) => secrets,
            Err(err) => return vec![err],
        };
        let in_use = match self.list_volume_sources(Some(&namespace)).await {
            Ok(in_use) => in_use,
            Err(err) => return vec![err],
        };

        let mut errors = Vec::new();
        for secret in &secrets {
            let name = secret.name_any();
            if name == application.secret_name() {
                continue;
            }
            if is_protected(secret) {
                debug!(secret = %name, "skipping protected secret");
                continue;
            }
            if in_use.contains(&(namespace.clone(), name.clone())) {
                continue;
            }
            info!(secret = %name, %namespace, "deleting unused secret");
            if let Err(err) = self.delete_secret(secret).await {
                errors.push(err);
            }
        }
        errors
    }

    /// Cluster-wide sweep over every managed secret. List errors abort the
    /// sweep; delete errors are collected and returned.
    pub async fn sweep(&self) -> Result<Vec<AivenatorError>> {
        let selector = format!("{SECRET_TYPE_LABEL}={AIVENATOR_SECRET_TYPE}");
        let secrets = self.list_secrets(None, &selector).await?;
        let in_use = self.list_volume_sources(None).await?;

        let mut errors = Vec::new();
        let mut states: HashMap<(String, &'static str), i64> = HashMap::new();
        for secret in &secrets {
            let namespace = secret.namespace().unwrap_or_default();
            let name = secret.name_any();
            let state = if is_protected(secret) {
                STATE_PROTECTED
            } else if in_use.contains(&(namespace.clone(), name.clone())) {
                STATE_IN_USE
            } else {
                STATE_ORPHANED
            };
            *states.entry((namespace.clone(), state)).or_default() += 1;

            if state != STATE_ORPHANED {
                continue;
            }
            info!(secret = %name, %namespace, "deleting unused secret");
            if let Err(err) = self.delete_secret(secret).await {
                errors.push(err);
            }
        }

        for ((namespace, state), count) in states {
            metrics::set_secrets_managed(&namespace, state, count);
        }

        Ok(errors)
    }

    async fn list_secrets(&self, namespace: Option<&str>, selector: &str) -> Result<Vec<Secret>> {
        let api: Api<Secret> = match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let params = ListParams::default().labels(selector);
        let list = metrics::observe_kubernetes_latency("Secret_List", api.list(&params))
            .await
            .map_err(|err| AivenatorError::local("ListSecrets", err))?;
        Ok(list.items)
    }

    /// All `(namespace, secret name)` pairs mounted by a pod volume.
    async fn list_volume_sources(
        &self,
        namespace: Option<&str>,
    ) -> Result<HashSet<(String, String)>> {
        let api: Api<Pod> = match namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        };
        let list = metrics::observe_kubernetes_latency("Pod_List", api.list(&ListParams::default()))
            .await
            .map_err(|err| AivenatorError::local("ListPods", err))?;
        Ok(volume_sources(&list.items))
    }

    async fn delete_secret(&self, secret: &Secret) -> Result<()> {
        let namespace = secret.namespace().unwrap_or_default();
        let name = secret.name_any();
        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        match metrics::observe_kubernetes_latency(
            "Secret_Delete",
            api.delete(&name, &DeleteParams::default()),
        )
        .await
        {
            Ok(_) => {
                metrics::inc_resources_deleted(&namespace, "Secret");
                Ok(())
            }
            Err(err) if is_not_found(&err) => {
                debug!(secret = %name, "secret already deleted");
                Ok(())
            }
            Err(err) => Err(AivenatorError::local("DeleteSecret", err)),
        }
    }
}

fn volume_sources(pods: &[Pod]) -> HashSet<(String, String)> {
    let mut sources = HashSet::new();
    for pod in pods {
        let namespace = pod.namespace().unwrap_or_default();
        let volumes = pod.spec.iter().flat_map(|spec| spec.volumes.iter().flatten());
        for volume in volumes {
            if let Some(secret_name) = volume.secret.as_ref().and_then(|s| s.secret_name.clone()) {
                sources.insert((namespace.clone(), secret_name));
            }
        }
    }
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::test_applications::application;
    use crate::test_utils::{status_json, MockApiServer};
    use k8s_openapi::api::core::v1::{PodSpec, SecretVolumeSource, Volume};
    use kube::api::ObjectMeta;

    const NAMESPACE: &str = "namespace";

    fn managed_secret(name: &str, namespace: &str) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(
                    [(SECRET_TYPE_LABEL.to_string(), AIVENATOR_SECRET_TYPE.to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        }
    }

    fn protect(mut secret: Secret) -> Secret {
        secret
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(
                crate::constants::AIVENATOR_PROTECTED_ANNOTATION.to_string(),
                "true".to_string(),
            );
        secret
    }

    fn pod_for_secret(name: &str, namespace: &str, secret_name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(PodSpec {
                volumes: Some(vec![Volume {
                    name: "credentials".to_string(),
                    secret: Some(SecretVolumeSource {
                        secret_name: Some(secret_name.to_string()),
                        ..SecretVolumeSource::default()
                    }),
                    ..Volume::default()
                }]),
                ..PodSpec::default()
            }),
            ..Pod::default()
        }
    }

    fn secret_list_json(secrets: &[&Secret]) -> String {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "SecretList",
            "metadata": {},
            "items": secrets.iter().map(|s| serde_json::to_value(s).unwrap()).collect::<Vec<_>>(),
        })
        .to_string()
    }

    fn pod_list_json(pods: &[&Pod]) -> String {
        serde_json::json!({
            "apiVersion": "v1",
            "kind": "PodList",
            "metadata": {},
            "items": pods.iter().map(|p| serde_json::to_value(p).unwrap()).collect::<Vec<_>>(),
        })
        .to_string()
    }

    #[tokio::test]
    async fn sweep_with_no_secrets_is_a_noop() {
        let mock = MockApiServer::new()
            .on_get("/api/v1/secrets", 200, &secret_list_json(&[]))
            .on_get("/api/v1/pods", 200, &pod_list_json(&[]));
        let janitor = Janitor::new(mock.client());

        let errors = janitor.sweep().await.unwrap();
        assert!(errors.is_empty());
        assert!(mock.requests_with_method("DELETE").is_empty());
    }

    #[tokio::test]
    async fn sweep_deletes_only_unreferenced_unprotected_secrets() {
        let orphan = managed_secret("secret1", NAMESPACE);
        let in_use = managed_secret("secret3", NAMESPACE);
        let protected = protect(managed_secret("secret4", NAMESPACE));
        let pod = pod_for_secret("pod1", NAMESPACE, "secret3");

        let mock = MockApiServer::new()
            .on_get(
                "/api/v1/secrets",
                200,
                &secret_list_json(&[&orphan, &in_use, &protected]),
            )
            .on_get("/api/v1/pods", 200, &pod_list_json(&[&pod]))
            .on_delete(
                "/api/v1/namespaces/namespace/secrets/secret1",
                200,
                &status_json("Success", 200),
            );
        let janitor = Janitor::new(mock.client());

        let errors = janitor.sweep().await.unwrap();
        assert!(errors.is_empty());

        let deletes = mock.requests_with_method("DELETE");
        assert_eq!(deletes, vec!["/api/v1/namespaces/namespace/secrets/secret1"]);
    }

    #[tokio::test]
    async fn sweep_aborts_when_secrets_cannot_be_listed() {
        let mock = MockApiServer::new().on_get(
            "/api/v1/secrets",
            500,
            &status_json("Failure", 500),
        );
        let janitor = Janitor::new(mock.client());

        assert!(janitor.sweep().await.is_err());
    }

    #[tokio::test]
    async fn sweep_treats_delete_not_found_as_success() {
        let orphan = managed_secret("secret1", NAMESPACE);
        // No DELETE route registered: the mock answers 404.
        let mock = MockApiServer::new()
            .on_get("/api/v1/secrets", 200, &secret_list_json(&[&orphan]))
            .on_get("/api/v1/pods", 200, &pod_list_json(&[]));
        let janitor = Janitor::new(mock.client());

        let errors = janitor.sweep().await.unwrap();
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn per_application_cleanup_spares_current_and_in_use_secrets() {
        let app = application("app", NAMESPACE, "current-secret");
        let current = managed_secret("current-secret", NAMESPACE);
        let stale = managed_secret("stale-secret", NAMESPACE);
        let in_use = managed_secret("mounted-secret", NAMESPACE);
        let pod = pod_for_secret("pod1", NAMESPACE, "mounted-secret");

        let mock = MockApiServer::new()
            .on_get(
                "/api/v1/namespaces/namespace/secrets",
                200,
                &secret_list_json(&[&current, &stale, &in_use]),
            )
            .on_get("/api/v1/namespaces/namespace/pods", 200, &pod_list_json(&[&pod]))
            .on_delete(
                "/api/v1/namespaces/namespace/secrets/stale-secret",
                200,
                &status_json("Success", 200),
            );
        let janitor = Janitor::new(mock.client());

        let errors = janitor.clean_unused_secrets(&app).await;
        assert!(errors.is_empty());

        let deletes = mock.requests_with_method("DELETE");
        assert_eq!(
            deletes,
            vec!["/api/v1/namespaces/namespace/secrets/stale-secret"]
        );
    }
}
