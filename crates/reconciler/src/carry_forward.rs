//! Node-local state handed from one round to the next.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_state::NodeId;

use crate::error::{Error, Result};

/// Current layout of the carry-forward blob.
pub const CARRY_FORWARD_VERSION: u32 = 1;

/// What a node remembers between rounds of one service.
///
/// The host stores this as an opaque JSON blob. A `null` or empty object
/// decodes to the initial state.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct CarryForwardState {
    /// Layout version.
    pub version: u32,

    /// Fingerprint of the configuration last written to the service.
    pub config_fingerprint: Option<String>,

    /// Whether the local instance was healthy at the end of the last round.
    pub service_ready: bool,

    /// Member ids recorded for departure detection.
    pub known_members: BTreeSet<NodeId>,

    /// Names of node-scoped properties this node has published.
    pub published: BTreeSet<String>,
}

impl CarryForwardState {
    /// Decode a blob as handed over by the host.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CarryForward`] if the blob is not a valid state, or
    /// was written by a newer layout.
    pub fn decode(raw: &Value) -> Result<Self> {
        if raw.is_null() || raw.as_object().is_some_and(serde_json::Map::is_empty) {
            return Ok(Self::initial());
        }

        let state: Self =
            serde_json::from_value(raw.clone()).map_err(|e| Error::CarryForward(e.to_string()))?;

        if state.version > CARRY_FORWARD_VERSION {
            return Err(Error::CarryForward(format!(
                "version {} is newer than supported version {CARRY_FORWARD_VERSION}",
                state.version
            )));
        }

        Ok(state)
    }

    /// Encode for the host.
    #[must_use]
    pub fn encode(&self) -> Value {
        let mut state = self.clone();
        state.version = CARRY_FORWARD_VERSION;
        serde_json::to_value(state).unwrap_or(Value::Null)
    }

    /// State of a node that has never run a round.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            version: CARRY_FORWARD_VERSION,
            ..Self::default()
        }
    }

    /// Add `members` to the recorded set.
    pub fn remember(&mut self, members: impl IntoIterator<Item = NodeId>) {
        self.known_members.extend(members);
    }
}
