//! # Reconciler
//!
//! Core reconciliation logic for applications implementing
//! [`crate::crd::ManagedApplication`].
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the application (not-found is terminal; deletes arrive here)
//! 2. Delete it instead if its time limit has expired
//! 3. Clean up secrets it no longer uses
//! 4. Hash the spec and find the dependent pod-owning workloads
//! 5. Decide whether synchronization is needed
//! 6. Compose the secret through the credentials provider and write it
//! 7. Record success; requeue if owner references have not converged yet
//! 8. Always finalize status and publish processing metrics

pub mod decision;
pub mod dependents;
pub mod expiration;
pub mod reconcile;
pub mod secrets;
pub mod status;
pub mod types;

// Re-export public API
pub use reconcile::{error_policy, reconcile};
pub use types::{Reconciler, ReconcilerError};
