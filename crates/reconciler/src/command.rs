//! Lifecycle commands.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle command a round runs.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// One-time local preparation.
    Init,
    /// Full reconciliation.
    Apply,
    /// Re-validate the local instance.
    Health,
    /// Graceful local stop.
    Finalize,
    /// Stop, tear down and retract everything this node published.
    Destroy,
}

impl Command {
    /// The command's wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Apply => "apply",
            Self::Health => "health",
            Self::Finalize => "finalize",
            Self::Destroy => "destroy",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown command name.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Self::Init),
            "apply" => Ok(Self::Apply),
            "health" => Ok(Self::Health),
            "finalize" => Ok(Self::Finalize),
            "destroy" => Ok(Self::Destroy),
            other => Err(UnknownCommand(other.to_string())),
        }
    }
}
