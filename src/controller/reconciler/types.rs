//! # Types
//!
//! Core types for the reconciler.

use std::marker::PhantomData;

use kube::Client;
use thiserror::Error;

use crate::crd::ManagedApplication;
use crate::credentials::{Janitor, Manager};
use crate::error::AivenatorError;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("reconciliation failed: {0}")]
    ReconciliationFailed(#[from] AivenatorError),
}

/// Context shared by every reconciliation. The manager is the seam towards
/// the credentials provider; everything else is per-request.
pub struct Reconciler<A, M>
where
    A: ManagedApplication,
    M: Manager<A>,
{
    pub client: Client,
    pub manager: M,
    pub janitor: Janitor,
    _application: PhantomData<fn() -> A>,
}

impl<A, M> Reconciler<A, M>
where
    A: ManagedApplication,
    M: Manager<A>,
{
    pub fn new(client: Client, manager: M) -> Self {
        Self {
            janitor: Janitor::new(client.clone()),
            client,
            manager,
            _application: PhantomData,
        }
    }
}
