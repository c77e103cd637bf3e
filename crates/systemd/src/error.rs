use std::path::PathBuf;
use std::time::Duration;

use swarm_service::{ServiceError, ServiceErrorKind};
use thiserror::Error;

/// Result type for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A hook command exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        /// Program that ran.
        program: String,
        /// Exit status.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// Filesystem error.
    #[error("{0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    /// A blocking task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A required hook is not configured.
    #[error("no {0} hook configured")]
    MissingHook(&'static str),

    /// A configured output pattern does not compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// A hook command could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The unit did not stop within its grace period.
    #[error("{unit} did not stop within {grace:?}")]
    StopTimeout {
        /// Unit name.
        unit: String,
        /// Grace period given.
        grace: Duration,
    },

    /// `systemctl` could not be run.
    #[error("systemctl {action} {unit} failed: {source}")]
    Systemctl {
        /// Action such as `start`.
        action: &'static str,
        /// Unit name.
        unit: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// `systemctl` ran but reported failure.
    #[error("systemctl {action} {unit} exited with {status}")]
    UnitCommand {
        /// Action such as `start`.
        action: &'static str,
        /// Unit name.
        unit: String,
        /// Exit status.
        status: String,
    },
}

impl ServiceError for Error {
    fn kind(&self) -> ServiceErrorKind {
        match self {
            Self::MissingHook(_) | Self::Pattern(_) => ServiceErrorKind::Structural,
            Self::Spawn { source, .. } | Self::Systemctl { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                ServiceErrorKind::Structural
            }
            Self::Io(_, source) if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ServiceErrorKind::Structural
            }
            _ => ServiceErrorKind::Transient,
        }
    }
}
