#![allow(dead_code)]

use std::time::Duration;

use serde_json::Value;
use swarm_reconciler::{Command, Reconciler, ReconcilerConfig, RoundResult, Timeouts};
use swarm_service_mock::MockServiceController;
use swarm_state::{Member, StateView, StateViewBuilder};

pub const SERVICE: &str = "redis";

pub fn config() -> ReconcilerConfig {
    let mut config = ReconcilerConfig::new(SERVICE);
    config.timeouts = Timeouts {
        operation: Duration::from_secs(1),
        prepare: Duration::from_secs(5),
        ready: Duration::from_secs(3),
        verify: Duration::from_secs(3),
        poll_interval: Duration::from_millis(500),
        stop_grace: Duration::from_secs(1),
    };
    config
}

pub fn address(id: &str) -> String {
    format!("10.0.0.{}", id.bytes().map(u32::from).sum::<u32>() % 250)
}

/// View in which every member has published its address.
pub fn view(local: &str, members: &[&str], leader: Option<&str>) -> StateViewBuilder {
    let mut builder = StateView::builder(local)
        .members(members.iter().copied().map(Member::new))
        .maybe_leader(leader.map(Into::into));
    for member in members {
        builder = builder.node_property(*member, "tunnel_ip", address(member));
    }
    builder
}

pub fn initialized(builder: StateViewBuilder) -> StateViewBuilder {
    builder.cluster_property("redis_cluster_initialized", true)
}

pub fn ready(builder: StateViewBuilder, members: &[&str]) -> StateViewBuilder {
    members.iter().fold(builder, |builder, member| {
        builder.node_property(*member, "redis_node_ready", true)
    })
}

/// A node running rounds and remembering its carry-forward.
pub struct Node {
    pub controller: MockServiceController,
    pub reconciler: Reconciler<MockServiceController>,
    pub carry: Value,
}

impl Node {
    pub fn new(controller: MockServiceController) -> Self {
        Self::with_config(controller, config())
    }

    pub fn with_config(controller: MockServiceController, config: ReconcilerConfig) -> Self {
        Self {
            reconciler: Reconciler::new(controller.clone(), config),
            controller,
            carry: Value::Null,
        }
    }

    pub async fn run(&mut self, command: Command, view: &StateView) -> RoundResult {
        let result = self.reconciler.run(command, view, &self.carry).await;
        self.carry = result.carry_forward().clone();
        result
    }

    pub async fn apply(&mut self, view: &StateView) -> RoundResult {
        self.run(Command::Apply, view).await
    }
}
