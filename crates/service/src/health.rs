/// Result of probing the local instance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Health {
    /// The instance answers as expected.
    Healthy,

    /// The instance is not (yet) usable.
    Unhealthy(String),
}

impl Health {
    /// Whether the probe succeeded.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Why the probe failed.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Healthy => None,
            Self::Unhealthy(reason) => Some(reason),
        }
    }
}
