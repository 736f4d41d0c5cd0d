//! # Credentials
//!
//! The seam towards the Aiven credentials provider and the housekeeping
//! around the secrets it produces.
//!
//! [`manager::Manager`] is the contract the reconciler programs against;
//! [`secret::SecretHandler`] composes the secret object itself, and
//! [`janitor::Janitor`] removes managed secrets nothing references anymore.

pub mod janitor;
pub mod manager;
pub mod secret;

pub use janitor::Janitor;
pub use manager::{CredentialsManager, Manager};
pub use secret::SecretHandler;
