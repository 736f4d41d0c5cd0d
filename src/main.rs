//! # Aivenator
//!
//! Controller entry point: wires up tracing, metrics, the probe server, the
//! janitor tick and the reconciliation loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use kube::{Api, Client};
use kube_runtime::{controller, watcher, Controller};
use tracing::{debug, error, info, warn};

use aivenator::config::Config;
use aivenator::controller::reconciler::{error_policy, reconcile, Reconciler};
use aivenator::crd::AivenApplication;
use aivenator::credentials::{CredentialsManager, Janitor};
use aivenator::observability::metrics;
use aivenator::server::{serve, ProbeState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aivenator=info".into()),
        )
        .init();

    info!("starting aivenator");

    let config = Config::from_env()?;
    metrics::register_metrics()?;

    let probes = Arc::new(ProbeState::new());
    let server_probes = probes.clone();
    let server_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(err) = serve(server_port, server_probes).await {
            error!(error = %err, "HTTP server error");
        }
    });

    let client = Client::try_default().await?;
    info!("connected to Kubernetes cluster");

    let janitor = Janitor::new(client.clone());
    tokio::spawn(run_janitor(janitor, config.janitor_interval, probes.clone()));

    let applications: Api<AivenApplication> = Api::all(client.clone());
    let context = Arc::new(Reconciler::<AivenApplication, _>::new(
        client,
        CredentialsManager::new(),
    ));

    probes.mark_controller_started();

    Controller::new(applications, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciles))
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .for_each(|result| async move {
            match result {
                Ok(object) => debug!(?object, "reconciled"),
                Err(err) => warn!(error = %err, "reconciliation error"),
            }
        })
        .await;

    info!("controller stopped");
    Ok(())
}

/// Periodic cluster sweep for managed secrets nothing references anymore.
/// Every attempt is reported to the probe state.
async fn run_janitor(janitor: Janitor, period: Duration, probes: Arc<ProbeState>) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        match janitor.sweep().await {
            Ok(errors) => {
                probes.record_sweep(true);
                for err in errors {
                    error!(error = %err, "janitor failed to delete secret");
                }
            }
            Err(err) => {
                probes.record_sweep(false);
                error!(error = %err, "janitor sweep aborted");
            }
        }
    }
}
