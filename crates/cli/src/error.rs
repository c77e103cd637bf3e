use std::path::PathBuf;

use thiserror::Error;

/// Result type for the CLI.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// CLI-specific error type
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration file could not be read.
    #[error("failed to read {0}: {1}")]
    ConfigRead(PathBuf, #[source] std::io::Error),

    /// The configuration file is not valid.
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Reading input or writing output failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The input document is not valid JSON.
    #[error("invalid input: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid node id in the input.
    #[error(transparent)]
    State(#[from] swarm_state::Error),

    /// The controller could not be built.
    #[error(transparent)]
    Systemd(#[from] swarm_systemd::Error),

    /// Logging could not be installed.
    #[error("failed to install logging: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
}
