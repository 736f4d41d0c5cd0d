//! # Observability
//!
//! Prometheus metrics for monitoring the controller. The metrics and probe
//! endpoints are served by [`crate::server`].

pub mod metrics;
