use std::error::Error;
use std::fmt::{self, Debug, Display};

/// The kind of service error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServiceErrorKind {
    /// Expected to clear up on its own; retried on a later round.
    Transient,

    /// Will not clear up by retrying with the same inputs.
    Structural,
}

impl Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => f.write_str("transient"),
            Self::Structural => f.write_str("structural"),
        }
    }
}

/// Marker trait for `ServiceController` errors
pub trait ServiceError: Debug + Error + Send + Sync + 'static {
    /// Returns the kind of this error
    fn kind(&self) -> ServiceErrorKind;
}
