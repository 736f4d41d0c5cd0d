//! # Probe and metrics server
//!
//! Serves the Prometheus registry and the probes the controller deployment
//! points Kubernetes at. Readiness flips once the reconciliation loop is
//! running; the janitor reports every sweep attempt here, so `/readyz` also
//! shows how garbage collection has been doing. Liveness stays unconditional:
//! a failing janitor must not restart the pod.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::observability::metrics::REGISTRY;

/// What the probes report on. The controller marks itself started once the
/// watch loop is up; the janitor records the outcome of each sweep.
#[derive(Debug, Default)]
pub struct ProbeState {
    controller_started: AtomicBool,
    sweeps_completed: AtomicU64,
    sweeps_aborted: AtomicU64,
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_controller_started(&self) {
        self.controller_started.store(true, Ordering::Relaxed);
    }

    /// Record one janitor sweep attempt; `completed` is false when the sweep
    /// aborted on a list error.
    pub fn record_sweep(&self, completed: bool) {
        let counter = if completed {
            &self.sweeps_completed
        } else {
            &self.sweeps_aborted
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn controller_started(&self) -> bool {
        self.controller_started.load(Ordering::Relaxed)
    }

    fn sweeps(&self) -> (u64, u64) {
        (
            self.sweeps_completed.load(Ordering::Relaxed),
            self.sweeps_aborted.load(Ordering::Relaxed),
        )
    }
}

pub fn router(state: Arc<ProbeState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<ProbeState>) -> Result<(), anyhow::Error> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "probe and metrics server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn metrics_handler() -> Response {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn readyz_handler(State(state): State<Arc<ProbeState>>) -> Response {
    if !state.controller_started() {
        return (StatusCode::SERVICE_UNAVAILABLE, "waiting for controller start").into_response();
    }
    let (completed, aborted) = state.sweeps();
    (
        StatusCode::OK,
        format!("ok (janitor sweeps: {completed} completed, {aborted} aborted)"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn readyz_stays_unavailable_until_the_controller_starts() {
        let state = Arc::new(ProbeState::new());

        let response = readyz_handler(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        state.mark_controller_started();
        let response = readyz_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn liveness_does_not_depend_on_state() {
        assert_eq!(healthz_handler().await, "ok");
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_the_registry() {
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn sweep_outcomes_are_counted_separately() {
        let state = ProbeState::new();
        state.record_sweep(true);
        state.record_sweep(true);
        state.record_sweep(false);
        assert_eq!(state.sweeps(), (2, 1));
    }
}
