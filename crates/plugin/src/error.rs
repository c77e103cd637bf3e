use thiserror::Error;

/// Errors that can occur while decoding host input.
#[derive(Debug, Error)]
pub enum Error {
    /// The `state` document does not have the expected shape.
    #[error("invalid state format: {0}")]
    InvalidState(#[from] serde_json::Error),

    /// The state names an invalid node or property.
    #[error("invalid state format: {0}")]
    State(#[from] swarm_state::Error),
}
