//! # Aivenator
//!
//! A Kubernetes controller that reconciles `AivenApplication` resources into
//! managed credential `Secret`s.
//!
//! The controller:
//! - Watches `AivenApplication` resources across all namespaces
//! - Detects spec changes through a stable content hash
//! - Asks the credentials provider to compose the secret for the application
//! - Writes the secret with owner references to the pod-owning workloads
//!   (`ReplicaSet`, `Job`, `CronJob`) of the same deployment rollout
//! - Deletes expired time-limited applications
//! - Garbage-collects managed secrets that no pod references anymore
//!
//! Protected secrets (annotation `aivenator.aiven.nais.io/protected=true`)
//! are never overwritten or deleted once written.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod credentials;
pub mod error;
pub mod observability;
pub mod server;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
