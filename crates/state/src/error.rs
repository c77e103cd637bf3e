use thiserror::Error;

/// Errors raised while decoding externally supplied state.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A cluster-scoped property carried an owner.
    #[error("cluster-scoped property '{0}' must not have an owner")]
    UnexpectedOwner(String),

    /// A node-scoped property carried no owner.
    #[error("node-scoped property '{0}' has no owner")]
    MissingOwner(String),

    /// The scope tag was neither `node` nor `cluster`.
    #[error("unknown property scope '{0}'")]
    UnknownScope(String),

    /// A node id was empty.
    #[error("node id must not be empty")]
    EmptyNodeId,
}
