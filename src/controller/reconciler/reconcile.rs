//! # Reconciliation Logic
//!
//! Orchestrates one reconciliation pass for a single application event.
//! Failures never propagate to the harness: they are folded into the status
//! conditions and encoded as a requeue action, so the harness applies no
//! backoff of its own on top.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kube::{Api, ResourceExt};
use kube_runtime::controller::Action;
use tracing::{debug, error, info};

use crate::constants::{MAX_REQUEUE_INTERVAL_SECS, REQUEUE_INTERVAL_SECS, UNKNOWN_STATE};
use crate::controller::backoff::next_requeue_interval;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::{decision, dependents, expiration, secrets, status};
use crate::crd::ManagedApplication;
use crate::credentials::Manager;
use crate::error::{is_not_found, AivenatorError, Result};
use crate::observability::metrics;

const REQUEUE_INTERVAL: Duration = Duration::from_secs(REQUEUE_INTERVAL_SECS);
const MAX_REQUEUE_INTERVAL: Duration = Duration::from_secs(MAX_REQUEUE_INTERVAL_SECS);

/// One reconciliation pass. Always returns `Ok`; the action encodes whether
/// and when the event is retried.
pub async fn reconcile<A, M>(
    object: Arc<A>,
    ctx: Arc<Reconciler<A, M>>,
) -> std::result::Result<Action, ReconcilerError>
where
    A: ManagedApplication,
    M: Manager<A>,
{
    let name = object.name_any();
    let namespace = object.namespace().unwrap_or_default();
    info!(application = %name, %namespace, "processing request");

    let api: Api<A> = Api::namespaced(ctx.client.clone(), &namespace);

    // The event only carries a cached object; reconcile against a fresh read.
    let mut application =
        match metrics::observe_kubernetes_latency("AivenApplication_Get", api.get(&name)).await {
            Ok(application) => application,
            Err(err) if is_not_found(&err) => {
                debug!(application = %name, "resource deleted from cluster; noop");
                metrics::inc_applications_processed(UNKNOWN_STATE);
                return Ok(Action::await_change());
            }
            Err(err) => {
                error!(application = %name, error = %err, "unable to retrieve resource from cluster");
                metrics::inc_applications_processed(UNKNOWN_STATE);
                return Ok(Action::requeue(REQUEUE_INTERVAL));
            }
        };

    // A deleted application has no status left to finalize.
    match expiration::handle_time_limited(&api, &application).await {
        Ok(true) => {
            metrics::inc_applications_processed(&status::sync_state(&application));
            info!(application = %name, "finished processing request");
            return Ok(Action::await_change());
        }
        Ok(false) => {}
        Err(err) => {
            let action = fail(&mut application, &err);
            status::finalize(&ctx.client, &mut application).await;
            metrics::inc_applications_processed(&status::sync_state(&application));
            return Ok(action);
        }
    }

    let action = match process(&ctx, &mut application).await {
        Ok(action) => action,
        Err(err) => fail(&mut application, &err),
    };

    status::finalize(&ctx.client, &mut application).await;
    metrics::inc_applications_processed(&status::sync_state(&application));
    info!(application = %name, "finished processing request");
    Ok(action)
}

/// Backstop for the harness; `reconcile` encodes its own failures, so this
/// only fires on panics inside the machinery.
pub fn error_policy<A, M>(
    _object: Arc<A>,
    error: &ReconcilerError,
    _ctx: Arc<Reconciler<A, M>>,
) -> Action
where
    A: ManagedApplication,
    M: Manager<A>,
{
    error!(error = %error, "reconciliation error");
    Action::requeue(REQUEUE_INTERVAL)
}

fn fail<A: ManagedApplication>(application: &mut A, err: &AivenatorError) -> Action {
    error!(error = %err, "reconciliation failed");
    status::failure(application, err);
    if err.is_unrecoverable() {
        Action::await_change()
    } else {
        Action::requeue(REQUEUE_INTERVAL)
    }
}

async fn process<A, M>(ctx: &Reconciler<A, M>, application: &mut A) -> Result<Action>
where
    A: ManagedApplication,
    M: Manager<A>,
{
    let name = application.name_any();

    for err in ctx.janitor.clean_unused_secrets(application).await {
        error!(application = %name, error = %err, "cleaning unused secrets");
    }

    let hash = application.hash()?;
    let dependents = dependents::find_dependent_objects(&ctx.client, application).await;

    if !decision::needs_synchronization(&ctx.client, application, &hash, &dependents).await? {
        return Ok(Action::await_change());
    }

    let start = Instant::now();
    let result = synchronize(ctx, application, &hash, &dependents).await;
    metrics::observe_processing_time(
        &status::sync_state(application),
        start.elapsed().as_secs_f64(),
    );
    result
}

async fn synchronize<A, M>(
    ctx: &Reconciler<A, M>,
    application: &mut A,
    hash: &str,
    dependents: &[crate::utils::Workload],
) -> Result<Action>
where
    A: ManagedApplication,
    M: Manager<A>,
{
    let name = application.name_any();

    info!(application = %name, "creating secret");
    let baseline = secrets::init_secret(&ctx.client, application).await;
    let secret = ctx
        .manager
        .create_secret(application, dependents, baseline)
        .await
        .map_err(|err| match err {
            err @ (AivenatorError::Unrecoverable(_) | AivenatorError::Aiven(_)) => err,
            other => AivenatorError::aiven(other),
        })?;

    info!(application = %name, "saving secret to cluster");
    secrets::save_secret(&ctx.client, &secret).await?;

    status::success(application, hash);

    // Dependents may trail the secret write while a rollout is still
    // producing its workloads; requeue until a relevant reference exists.
    if decision::missing_relevant_owner_reference(&ctx.client, &secret).await {
        let interval = next_requeue_interval(&secret, REQUEUE_INTERVAL, MAX_REQUEUE_INTERVAL);
        info!(
            application = %name,
            seconds = interval.as_secs(),
            "missing pod-owning owner reference; requeueing"
        );
        metrics::inc_applications_requeued(&status::sync_state(application));
        return Ok(Action::requeue(interval));
    }

    Ok(Action::await_change())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::AIVENATOR_PROTECTED_ANNOTATION;
    use crate::controller::reconciler::dependents::fixtures::{
        replica_set, replica_set_list_json,
    };
    use crate::crd::test_applications::{application, with_correlation_id};
    use crate::crd::{AivenApplication, AivenApplicationStatus};
    use crate::credentials::CredentialsManager;
    use crate::test_utils::{not_found_json, status_json, MockApiServer};
    use crate::utils::Workload;
    use k8s_openapi::api::core::v1::Secret;
    use kube::api::ObjectMeta;

    const APP_PATH: &str = "/apis/aiven.nais.io/v1/namespaces/foo/aivenapplications/bar";
    const SECRETS_PATH: &str = "/api/v1/namespaces/foo/secrets";
    const SECRET_PATH: &str = "/api/v1/namespaces/foo/secrets/foo-creds";

    fn app() -> AivenApplication {
        application("bar", "foo", "foo-creds")
    }

    fn context(
        mock: &MockApiServer,
    ) -> Arc<Reconciler<AivenApplication, CredentialsManager>> {
        Arc::new(Reconciler::new(mock.client(), CredentialsManager::new()))
    }

    fn empty_list(kind: &str) -> String {
        serde_json::json!({"apiVersion": "v1", "kind": kind, "metadata": {}, "items": []})
            .to_string()
    }

    /// Routes shared by most scenarios: the application itself, empty janitor
    /// listings, and the status patch.
    fn base_mock(app: &AivenApplication) -> MockApiServer {
        MockApiServer::new()
            .on_get(APP_PATH, 200, &serde_json::to_string(app).unwrap())
            .on_get(SECRETS_PATH, 200, &empty_list("SecretList"))
            .on_get("/api/v1/namespaces/foo/pods", 200, &empty_list("PodList"))
            .on_patch(
                &format!("{APP_PATH}/status"),
                200,
                &serde_json::to_string(app).unwrap(),
            )
    }

    #[tokio::test]
    async fn first_reconciliation_creates_the_secret() {
        let app = with_correlation_id(app(), "c1");
        let owner = replica_set("rs1", "foo", Some("c1"), Some("foo-creds"));
        let created = Secret {
            metadata: ObjectMeta {
                name: Some("foo-creds".to_string()),
                namespace: Some("foo".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };

        let mock = base_mock(&app)
            .on_get(SECRET_PATH, 404, &not_found_json("secrets", "foo-creds"))
            .on_get(
                "/apis/apps/v1/namespaces/foo/replicasets",
                200,
                &replica_set_list_json(&[&owner]),
            )
            .on_get(
                "/apis/apps/v1/namespaces/foo/replicasets/rs1",
                200,
                &serde_json::to_string(&owner).unwrap(),
            )
            .on_post(SECRETS_PATH, 201, &serde_json::to_string(&created).unwrap());

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(mock.requests_with_method("POST"), vec![SECRETS_PATH]);
        assert_eq!(
            mock.requests_with_method("PATCH"),
            vec![format!("{APP_PATH}/status")]
        );
    }

    #[tokio::test]
    async fn unchanged_spec_with_satisfied_references_issues_no_writes() {
        let mut app = with_correlation_id(app(), "c1");
        let hash = app.hash().unwrap();
        app.status = Some(AivenApplicationStatus {
            synchronization_hash: Some(hash),
            ..AivenApplicationStatus::default()
        });

        let owner = replica_set("rs1", "foo", Some("c1"), Some("foo-creds"));
        let dependent = Workload::from_object(&owner).unwrap();
        let mut existing = Secret {
            metadata: ObjectMeta {
                name: Some("foo-creds".to_string()),
                namespace: Some("foo".to_string()),
                owner_references: Some(vec![dependent.owner_reference()]),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        existing
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(
                crate::constants::DEPLOYMENT_CORRELATION_ID_ANNOTATION.to_string(),
                "c1".to_string(),
            );

        let mock = base_mock(&app)
            .on_get(SECRET_PATH, 200, &serde_json::to_string(&existing).unwrap())
            .on_get(
                "/apis/apps/v1/namespaces/foo/replicasets",
                200,
                &replica_set_list_json(&[&owner]),
            )
            .on_get(
                "/apis/apps/v1/namespaces/foo/replicasets/rs1",
                200,
                &serde_json::to_string(&owner).unwrap(),
            );

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(mock.requests_with_method("POST").is_empty());
        assert!(mock.requests_with_method("PUT").is_empty());
        // Only the status timestamp is refreshed.
        assert_eq!(
            mock.requests_with_method("PATCH"),
            vec![format!("{APP_PATH}/status")]
        );
    }

    #[tokio::test]
    async fn protected_secret_is_never_rewritten() {
        let mut app = app();
        let hash = app.hash().unwrap();
        app.status = Some(AivenApplicationStatus {
            synchronization_hash: Some(hash),
            ..AivenApplicationStatus::default()
        });

        let mut existing = Secret {
            metadata: ObjectMeta {
                name: Some("foo-creds".to_string()),
                namespace: Some("foo".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        existing
            .metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(AIVENATOR_PROTECTED_ANNOTATION.to_string(), "true".to_string());

        let mock = base_mock(&app).on_get(
            SECRET_PATH,
            200,
            &serde_json::to_string(&existing).unwrap(),
        );

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert!(mock.requests_with_method("POST").is_empty());
        assert!(mock.requests_with_method("PUT").is_empty());
        assert!(mock.requests_with_method("DELETE").is_empty());
    }

    #[tokio::test]
    async fn missing_owner_reference_requeues_after_writing() {
        let app = with_correlation_id(app(), "c1");
        let created = Secret::default();

        // No workload of the rollout exists yet: all finder lists answer 404.
        let mock = base_mock(&app)
            .on_get(SECRET_PATH, 404, &not_found_json("secrets", "foo-creds"))
            .on_post(SECRETS_PATH, 201, &serde_json::to_string(&created).unwrap());

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        // Secret written eagerly, then requeued at the base interval to pick
        // up the owner reference once the rollout produces the workload.
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
        assert_eq!(mock.requests_with_method("POST"), vec![SECRETS_PATH]);
    }

    #[tokio::test]
    async fn expired_application_is_deleted_without_requeue() {
        let mut app = app();
        app.spec.expires_at = Some("2000-01-01".to_string());

        let mock = MockApiServer::new()
            .on_get(APP_PATH, 200, &serde_json::to_string(&app).unwrap())
            .on_delete(APP_PATH, 200, &status_json("Success", 200));

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(mock.requests_with_method("DELETE"), vec![APP_PATH]);
        // The application is gone; no status left to finalize.
        assert!(mock.requests_with_method("PATCH").is_empty());
    }

    #[tokio::test]
    async fn vanished_application_terminates_the_event() {
        let app = app();
        // Nothing registered: the fetch answers 404.
        let mock = MockApiServer::new();

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn fetch_errors_requeue_at_the_standard_interval() {
        let app = app();
        let mock = MockApiServer::new().on_get(APP_PATH, 500, &status_json("Failure", 500));

        let action = reconcile(Arc::new(app), context(&mock)).await.unwrap();

        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    }
}
