//! Error types for the mock service controller.

use swarm_service::{ServiceError, ServiceErrorKind};
use thiserror::Error;

use crate::Operation;

/// Error type for the mock service controller.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
#[error("mock {operation} failed ({kind})")]
pub struct Error {
    /// The operation that was scripted to fail.
    pub operation: Operation,

    /// How the failure should be classified.
    pub kind: ServiceErrorKind,
}

impl ServiceError for Error {
    fn kind(&self) -> ServiceErrorKind {
        self.kind
    }
}
