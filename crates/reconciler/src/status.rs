//! Turning a round's outcome into the single result handed back to the host.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_state::PropertyDelta;

use crate::carry_forward::CarryForwardState;
use crate::error::{Classification, Error};

/// Longest message a result carries, in characters.
pub const MAX_MESSAGE_LEN: usize = 512;

/// Status of a round.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Nothing further to do until the next trigger.
    Completed,
    /// A precondition is unmet or a retryable failure happened.
    Postponed,
    /// Retrying with the same inputs will not help.
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Postponed => f.write_str("postponed"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// How a round ended, before it is reported.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// Done, with an optional note.
    Completed(Option<String>),

    /// Precondition unmet.
    Postponed(String),

    /// Failed; reported according to the error's classification.
    Failed(Error),

    /// Failed; always reported as an error.
    Fatal(Error),
}

impl Outcome {
    /// Completed without a note.
    #[must_use]
    pub const fn completed() -> Self {
        Self::Completed(None)
    }

    /// Postponed with `reason`.
    pub fn postponed(reason: impl Into<String>) -> Self {
        Self::Postponed(reason.into())
    }
}

impl From<Error> for Outcome {
    fn from(error: Error) -> Self {
        Self::Failed(error)
    }
}

/// The single output of one round. Immutable once produced.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundResult {
    status: Status,
    message: Option<String>,
    published: PropertyDelta,
    carry_forward: Value,
}

impl RoundResult {
    /// Status of the round.
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Single-line diagnostic. Always present unless completed.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Properties published or retracted by the round.
    #[must_use]
    pub const fn published(&self) -> &PropertyDelta {
        &self.published
    }

    /// The blob to hand to the next round.
    #[must_use]
    pub const fn carry_forward(&self) -> &Value {
        &self.carry_forward
    }

    /// Split into parts.
    #[must_use]
    pub fn into_parts(self) -> (Status, Option<String>, PropertyDelta, Value) {
        (self.status, self.message, self.published, self.carry_forward)
    }
}

/// Collapse whitespace into single spaces and cap the length.
#[must_use]
pub fn single_line(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_MESSAGE_LEN {
        return collapsed;
    }

    let mut truncated: String = collapsed.chars().take(MAX_MESSAGE_LEN - 3).collect();
    truncated.push_str("...");
    truncated
}

/// Builds [`RoundResult`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatusReporter;

impl StatusReporter {
    /// Report a round whose carry-forward state is known.
    #[must_use]
    pub fn report(
        outcome: Outcome,
        published: PropertyDelta,
        carry_forward: &CarryForwardState,
    ) -> RoundResult {
        Self::report_raw(outcome, published, carry_forward.encode())
    }

    /// Report a round with an arbitrary carry-forward blob, such as an
    /// undecodable one echoed back, or the empty one after `destroy`.
    #[must_use]
    pub fn report_raw(outcome: Outcome, published: PropertyDelta, carry_forward: Value) -> RoundResult {
        let (status, message) = match outcome {
            Outcome::Completed(note) => (Status::Completed, note),
            Outcome::Postponed(reason) => (Status::Postponed, Some(reason)),
            Outcome::Failed(error) => match error.classification() {
                Classification::Retryable => (Status::Postponed, Some(error.to_string())),
                Classification::Structural => (Status::Error, Some(error.to_string())),
            },
            Outcome::Fatal(error) => (Status::Error, Some(error.to_string())),
        };

        RoundResult {
            status,
            message: message.map(|message| single_line(&message)),
            published,
            carry_forward,
        }
    }
}
