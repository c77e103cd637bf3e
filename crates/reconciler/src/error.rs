//! Error types for reconciliation rounds.

use std::time::Duration;

use swarm_service::{ServiceError, ServiceErrorKind};
use swarm_state::NodeId;
use thiserror::Error;

/// Result type for reconciliation operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether retrying with the same inputs can succeed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Classification {
    /// The round is postponed and retried later.
    Retryable,

    /// Operator intervention is required.
    Structural,
}

/// Errors that can occur during a round.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The carry-forward blob could not be decoded.
    #[error("malformed carry-forward state: {0}")]
    CarryForward(String),

    /// A cluster-wide flag holds something other than a flag.
    #[error("contradictory cluster state: {name} is {value:?}")]
    Contradictory {
        /// Property name.
        name: String,
        /// Offending value.
        value: String,
    },

    /// The local node has no address to advertise.
    #[error("node {0} has no address")]
    MissingAddress(NodeId),

    /// The managed service reported an error.
    #[error("{operation} failed: {message}")]
    Service {
        /// Controller operation.
        operation: &'static str,
        /// Classification reported by the controller.
        kind: ServiceErrorKind,
        /// Error message.
        message: String,
    },

    /// A departed member could not be dropped from the managed service.
    #[error("{0}")]
    Retirement(String),

    /// Invalid input state.
    #[error(transparent)]
    State(#[from] swarm_state::Error),

    /// A controller call did not return in time.
    #[error("{operation} timed out after {}s", after.as_secs())]
    Timeout {
        /// Controller operation.
        operation: &'static str,
        /// The bound that expired.
        after: Duration,
    },
}

impl Error {
    pub(crate) fn service<E: ServiceError>(operation: &'static str, error: &E) -> Self {
        Self::Service {
            operation,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// How the round should react to this error.
    #[must_use]
    pub const fn classification(&self) -> Classification {
        match self {
            Self::Service {
                kind: ServiceErrorKind::Transient,
                ..
            }
            | Self::Timeout { .. } => Classification::Retryable,
            Self::CarryForward(_)
            | Self::Contradictory { .. }
            | Self::MissingAddress(_)
            | Self::Retirement(_)
            | Self::Service {
                kind: ServiceErrorKind::Structural,
                ..
            }
            | Self::State(_) => Classification::Structural,
        }
    }

    /// Shorthand for `classification() == Retryable`.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.classification() == Classification::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let timeout = Error::Timeout {
            operation: "start",
            after: Duration::from_secs(3),
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.to_string(), "start timed out after 3s");

        let structural = Error::Service {
            operation: "configure",
            kind: ServiceErrorKind::Structural,
            message: "binary missing".to_string(),
        };
        assert_eq!(structural.classification(), Classification::Structural);
        assert!(Error::MissingAddress(NodeId::from("a")).classification() == Classification::Structural);
    }
}
