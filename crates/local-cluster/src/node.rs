//! One simulated node.

use serde_json::Value;
use swarm_reconciler::{Command, Reconciler, RoundResult};
use swarm_service_mock::MockServiceController;
use swarm_state::{NodeId, StateView};
use tracing::debug;

/// A node: its service instance, its reconciler and the carry-forward
/// state the provisioning host would keep for it.
pub struct ManagedNode {
    id: NodeId,
    controller: MockServiceController,
    reconciler: Reconciler<MockServiceController>,
    carry_forward: Value,
    last: Option<RoundResult>,
    rounds: usize,
}

impl ManagedNode {
    pub(crate) fn new(
        id: NodeId,
        controller: MockServiceController,
        reconciler: Reconciler<MockServiceController>,
    ) -> Self {
        Self {
            id,
            controller,
            reconciler,
            carry_forward: Value::Null,
            last: None,
            rounds: 0,
        }
    }

    /// Node id.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// The node's service instance.
    #[must_use]
    pub const fn controller(&self) -> &MockServiceController {
        &self.controller
    }

    /// Carry-forward state the next round will receive.
    #[must_use]
    pub const fn carry_forward(&self) -> &Value {
        &self.carry_forward
    }

    /// Overwrite the carry-forward state, as a host restoring a backup would.
    pub fn set_carry_forward(&mut self, carry_forward: Value) {
        self.carry_forward = carry_forward;
    }

    /// Result of the most recent round.
    #[must_use]
    pub const fn last_result(&self) -> Option<&RoundResult> {
        self.last.as_ref()
    }

    /// Number of rounds run.
    #[must_use]
    pub const fn rounds(&self) -> usize {
        self.rounds
    }

    pub(crate) async fn run(&mut self, command: Command, view: &StateView) -> RoundResult {
        let result = self.reconciler.run(command, view, &self.carry_forward).await;
        self.rounds += 1;
        self.carry_forward = result.carry_forward().clone();
        self.last = Some(result.clone());

        debug!(
            node = %self.id,
            %command,
            status = %result.status(),
            round = self.rounds,
            "round finished"
        );

        result
    }
}
