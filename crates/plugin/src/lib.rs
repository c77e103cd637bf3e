//! JSON documents exchanged with the provisioning host, and their conversion
//! to and from reconciler types.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod state;

pub use error::Error;
pub use state::{ClusterInfo, ClusterNode, ClusterPropertyEntry, NodePropertyEntry, SwarmState};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_reconciler::{Command, Reconciler, RoundResult, Status, single_line};
use swarm_service::ServiceController;
use swarm_state::{NodeId, PropertyScope};
use tracing::{error, warn};

/// Properties as the host expects them: `null` requests deletion.
pub type PropertyMap = BTreeMap<String, Option<String>>;

/// One invocation as handed over by the host.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PluginInput {
    /// Command to run.
    pub command: Command,

    /// Id of the node the plugin runs on.
    pub local_node_id: String,

    /// Swarm state document.
    #[serde(default)]
    pub state: Value,

    /// Carry-forward blob from the previous round.
    #[serde(default)]
    pub local_state: Value,
}

/// Result of one invocation as handed back to the host.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PluginOutput {
    /// Round status.
    pub status: Status,

    /// Single-line diagnostic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Node-scoped properties of the local node to set or delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_properties: Option<PropertyMap>,

    /// Cluster-scoped properties to set or delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_properties: Option<PropertyMap>,

    /// Carry-forward blob for the next round.
    pub local_state: Value,
}

impl PluginOutput {
    /// An error output that echoes `local_state`.
    #[must_use]
    pub fn error(message: &str, local_state: Value) -> Self {
        Self {
            status: Status::Error,
            error_message: Some(single_line(message)),
            node_properties: None,
            cluster_properties: None,
            local_state,
        }
    }

    /// Convert a round's result.
    ///
    /// Node properties owned by anyone but `local_node_id` are dropped; a
    /// round only ever speaks for its own node.
    #[must_use]
    pub fn from_result(result: RoundResult, local_node_id: &NodeId) -> Self {
        let (status, message, published, local_state) = result.into_parts();

        let mut node_properties = PropertyMap::new();
        let mut cluster_properties = PropertyMap::new();
        for (key, value) in published {
            let value = value.map(|value| value.encode());
            match key.scope() {
                PropertyScope::Cluster => {
                    cluster_properties.insert(key.name().to_string(), value);
                }
                PropertyScope::Node(owner) if owner == local_node_id => {
                    node_properties.insert(key.name().to_string(), value);
                }
                PropertyScope::Node(owner) => {
                    warn!(%owner, name = key.name(), "dropping property owned by another node");
                }
            }
        }

        Self {
            status,
            error_message: message,
            node_properties: (!node_properties.is_empty()).then_some(node_properties),
            cluster_properties: (!cluster_properties.is_empty()).then_some(cluster_properties),
            local_state,
        }
    }
}

/// Decode the input, run one round, and encode the result.
pub async fn handle<C: ServiceController>(reconciler: &Reconciler<C>, input: PluginInput) -> PluginOutput {
    let view = match SwarmState::from_value(&input.state)
        .and_then(|state| state.into_view(&input.local_node_id))
    {
        Ok(view) => view,
        Err(e) => {
            error!(error = %e, "rejecting host input");
            return PluginOutput::error(&e.to_string(), input.local_state);
        }
    };

    let result = reconciler.run(input.command, &view, &input.local_state).await;
    PluginOutput::from_result(result, view.local_node_id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use swarm_reconciler::ReconcilerConfig;
    use swarm_service_mock::MockServiceController;

    fn input(command: &str, state: Value, local_state: Value) -> PluginInput {
        serde_json::from_value(json!({
            "command": command,
            "local_node_id": "n1",
            "state": state,
            "local_state": local_state,
        }))
        .unwrap()
    }

    fn single_node_state() -> Value {
        json!({
            "clusterNodes": [{"node_id": "n1"}],
            "cluster": {"leader_node": "n1"},
            "wgNodeProperties": [{"node_id": "n1", "name": "tunnel_ip", "value": "10.13.0.1"}],
        })
    }

    #[tokio::test]
    async fn test_apply_round_trip() {
        let reconciler = Reconciler::new(
            MockServiceController::new("redis", "n1"),
            ReconcilerConfig::new("redis"),
        );

        let output = handle(&reconciler, input("apply", single_node_state(), Value::Null)).await;

        assert_eq!(output.status, Status::Completed);
        assert_eq!(
            output.node_properties,
            Some(PropertyMap::from([(
                "redis_node_ready".to_string(),
                Some("true".to_string())
            )]))
        );
        assert_eq!(
            output.cluster_properties,
            Some(PropertyMap::from([(
                "redis_cluster_initialized".to_string(),
                Some("true".to_string())
            )]))
        );
        assert_eq!(output.local_state["service_ready"], json!(true));

        let encoded = serde_json::to_value(&output).unwrap();
        assert_eq!(encoded["status"], json!("completed"));
        assert!(encoded.get("error_message").is_none());
    }

    #[tokio::test]
    async fn test_invalid_state_echoes_local_state() {
        let reconciler = Reconciler::new(
            MockServiceController::new("redis", "n1"),
            ReconcilerConfig::new("redis"),
        );
        let local_state = json!({"known_members": ["n1"]});

        let output = handle(&reconciler, input("apply", json!("nope"), local_state.clone())).await;

        assert_eq!(output.status, Status::Error);
        assert!(output.error_message.unwrap().starts_with("invalid state format"));
        assert_eq!(output.local_state, local_state);
        assert!(reconciler.controller().calls().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_emits_nulls() {
        let reconciler = Reconciler::new(
            MockServiceController::new("redis", "n1"),
            ReconcilerConfig::new("redis"),
        );

        let output = handle(&reconciler, input("destroy", single_node_state(), json!({}))).await;

        assert_eq!(output.status, Status::Completed);
        assert_eq!(output.local_state, json!({}));
        let encoded = serde_json::to_value(&output).unwrap();
        assert_eq!(encoded["node_properties"], json!({"redis_node_ready": null}));
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        let result: Result<PluginInput, _> = serde_json::from_value(json!({
            "command": "upgrade",
            "local_node_id": "n1",
        }));
        assert!(result.is_err());
    }
}
