//! Safe retirement of members that left the swarm.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use swarm_service::ServiceController;
use swarm_state::{NodeId, StateView};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::poll::bounded;

/// A cleanup action against one departed member.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Step {
    /// Stop scheduling new work onto the member.
    Quiesce,
    /// Move existing work off the member.
    Drain,
    /// Drop the member from the managed service.
    Remove,
}

impl Step {
    const fn operation(self) -> &'static str {
        match self {
            Self::Quiesce => "quiesce_member",
            Self::Drain => "drain_member",
            Self::Remove => "remove_member",
        }
    }

    async fn run<C: ServiceController>(
        self,
        controller: &C,
        id: &NodeId,
        limit: Duration,
    ) -> Result<()> {
        let operation = self.operation();
        match self {
            Self::Quiesce => bounded(operation, limit, controller.quiesce_member(id)).await,
            Self::Drain => bounded(operation, limit, controller.drain_member(id)).await,
            Self::Remove => bounded(operation, limit, controller.remove_member(id)).await,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation())
    }
}

/// A best-effort step. Failures are logged and never block retirement.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Attempt(pub Step);

impl Attempt {
    /// Run the step, swallowing any failure.
    pub async fn run<C: ServiceController>(self, controller: &C, id: &NodeId, limit: Duration) {
        if let Err(e) = self.0.run(controller, id, limit).await {
            warn!(member = %id, step = %self.0, error = %e, "best-effort cleanup step failed");
        }
    }
}

/// The step whose failure means the member is still part of the service.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Required(pub Step);

impl Required {
    /// Run the step.
    ///
    /// # Errors
    ///
    /// Returns the classified controller error.
    pub async fn run<C: ServiceController>(
        self,
        controller: &C,
        id: &NodeId,
        limit: Duration,
    ) -> Result<()> {
        self.0.run(controller, id, limit).await
    }
}

/// The ordered cleanup for one departed member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetirementPlan {
    /// Best-effort steps, in order.
    pub attempts: Vec<Attempt>,

    /// The single required step, run last.
    pub required: Required,
}

impl Default for RetirementPlan {
    fn default() -> Self {
        Self {
            attempts: vec![Attempt(Step::Quiesce), Attempt(Step::Drain)],
            required: Required(Step::Remove),
        }
    }
}

/// Outcome of one membership pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MembershipReport {
    /// Member ids to record in the carry-forward state.
    pub known_members: BTreeSet<NodeId>,

    /// Members retired by this pass.
    pub retired: Vec<NodeId>,

    /// Why the pass could not finish, if it could not.
    pub postponed: Option<String>,

    /// Whether any required step failed structurally, so that retrying
    /// alone will not finish the pass.
    pub structural: bool,
}

/// Compares recorded membership with the current swarm and retires members
/// that left. Leader only.
#[derive(Clone, Debug)]
pub struct MembershipReconciler {
    plan: RetirementPlan,
    operation_timeout: Duration,
}

impl MembershipReconciler {
    /// Create a reconciler bounding every controller call by `operation_timeout`.
    #[must_use]
    pub fn new(operation_timeout: Duration) -> Self {
        Self {
            plan: RetirementPlan::default(),
            operation_timeout,
        }
    }

    /// Replace the retirement plan.
    #[must_use]
    pub fn with_plan(mut self, plan: RetirementPlan) -> Self {
        self.plan = plan;
        self
    }

    /// Run one pass against `previous_known`, the set recorded last round.
    pub async fn reconcile<C: ServiceController>(
        &self,
        controller: &C,
        view: &StateView,
        previous_known: &BTreeSet<NodeId>,
    ) -> MembershipReport {
        let current = view.member_ids();
        let local = view.local_node_id();
        let disappeared: BTreeSet<NodeId> = previous_known
            .difference(&current)
            .filter(|id| *id != local)
            .cloned()
            .collect();

        if disappeared.is_empty() {
            return MembershipReport {
                known_members: current,
                ..MembershipReport::default()
            };
        }

        let accumulated: BTreeSet<NodeId> = previous_known.union(&current).cloned().collect();

        let listed = match bounded(
            "list_members",
            self.operation_timeout,
            controller.list_members(),
        )
        .await
        {
            Ok(listed) if listed.is_empty() => {
                warn!("managed service reports no members, skipping retirement");
                return MembershipReport {
                    known_members: accumulated,
                    postponed: Some("managed service reported an empty member list".to_string()),
                    ..MembershipReport::default()
                };
            }
            Ok(listed) => listed.into_iter().collect::<BTreeSet<_>>(),
            Err(e) => {
                warn!(error = %e, "could not list service members, skipping retirement");
                return MembershipReport {
                    known_members: accumulated,
                    postponed: Some(format!("cannot list service members: {e}")),
                    ..MembershipReport::default()
                };
            }
        };

        let mut retired = Vec::new();
        let mut failed: Vec<(NodeId, Error)> = Vec::new();

        for id in &disappeared {
            if !listed.contains(id) {
                debug!(member = %id, "already retired");
                continue;
            }

            info!(member = %id, "retiring departed member");
            for attempt in &self.plan.attempts {
                attempt.run(controller, id, self.operation_timeout).await;
            }

            match self.plan.required.run(controller, id, self.operation_timeout).await {
                Ok(()) => {
                    info!(member = %id, "member retired");
                    retired.push(id.clone());
                }
                Err(e) => {
                    warn!(member = %id, error = %e, "failed to retire member");
                    failed.push((id.clone(), e));
                }
            }
        }

        let mut known_members = current;
        known_members.extend(failed.iter().map(|(id, _)| id.clone()));

        let postponed = (!failed.is_empty()).then(|| {
            let names: Vec<String> = failed
                .iter()
                .map(|(id, e)| format!("{id} ({e})"))
                .collect();
            format!("failed to retire {}", names.join(", "))
        });
        let structural = failed.iter().any(|(_, e)| !e.is_retryable());

        MembershipReport {
            known_members,
            retired,
            postponed,
            structural,
        }
    }
}
