//! Error types for the operator library

use crate::store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Operator error type
#[derive(Debug, Error)]
pub enum Error {
    /// Object store call failed
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// A field the operator relies on is not set
    #[error("Missing field {field} on {kind}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    /// Object could not be serialized
    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The reconcile did not finish before its deadline
    #[error("Reconcile deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Kubernetes client error outside of the object store
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

/// Result type for operator operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Label used when counting errors
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::Store(StoreError::Conflict { .. }) => "conflict",
            Error::Store(StoreError::NotFound { .. }) => "not_found",
            Error::Store(StoreError::Transport(_)) => "transport",
            Error::Store(_) => "store",
            Error::MissingField { .. } => "missing_field",
            Error::Encode(_) => "encode",
            Error::DeadlineExceeded(_) => "deadline",
            Error::Kube(_) => "kube",
        }
    }

    /// Whether the failure points at the object store being unavailable
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Store(StoreError::Transport(_)) | Error::DeadlineExceeded(_) | Error::Kube(_)
        )
    }
}
