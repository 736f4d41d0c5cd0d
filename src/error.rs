//! # Errors
//!
//! Error taxonomy for the controller. The reconciler picks the requeue
//! behavior and the status condition from the variant, never from message
//! contents.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AivenatorError {
    /// The spec can never be reconciled as written (invalid secret name,
    /// unparseable timestamp, resource vanished). The event is dropped
    /// without requeue; only a spec change delivers a new one.
    #[error("unrecoverable: {0}")]
    Unrecoverable(#[source] anyhow::Error),

    /// Application-scoped failure in this controller (hashing, deciding,
    /// writing). Sets the LocalFailure condition and requeues.
    #[error("{operation}: {source}")]
    Local {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Failure surfaced from the credentials provider. Sets the AivenFailure
    /// condition and requeues.
    #[error("credentials provider: {0}")]
    Aiven(#[source] anyhow::Error),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl AivenatorError {
    pub fn unrecoverable(err: impl Into<anyhow::Error>) -> Self {
        Self::Unrecoverable(err.into())
    }

    pub fn local(operation: &'static str, err: impl Into<anyhow::Error>) -> Self {
        Self::Local {
            operation,
            source: err.into(),
        }
    }

    pub fn aiven(err: impl Into<anyhow::Error>) -> Self {
        Self::Aiven(err.into())
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable(_))
    }
}

/// True for a 404 from the API server. Not-found is benign on deletes and
/// drives the create path of the secret writer.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

pub type Result<T> = std::result::Result<T, AivenatorError>;
