use swarm_property_store::PropertyStoreError;
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Clone, Debug, Error)]
#[error("Property store error")]
pub struct Error;

impl PropertyStoreError for Error {}
