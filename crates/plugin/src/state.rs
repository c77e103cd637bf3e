//! The host's swarm state document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use swarm_state::{Member, NodeId, PropertyValue, StateView};

use crate::error::Error;

/// Suffix of every list of node-scoped properties in the state document.
pub const NODE_PROPERTIES_SUFFIX: &str = "NodeProperties";

/// A swarm member as listed by the host.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterNode {
    /// Member id.
    pub node_id: String,

    /// Address the host declared for the member.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Cluster-level facts decided by the host.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ClusterInfo {
    /// Leader for this round.
    #[serde(default)]
    pub leader_node: Option<String>,
}

/// One node-scoped property.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NodePropertyEntry {
    /// Owning node.
    pub node_id: String,

    /// Property name.
    pub name: String,

    /// Value; `null` means absent.
    #[serde(default)]
    pub value: Option<String>,
}

/// One cluster-scoped property.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ClusterPropertyEntry {
    /// Property name.
    pub name: String,

    /// Value; `null` means absent.
    #[serde(default)]
    pub value: Option<String>,
}

/// The `state` document.
///
/// Node properties arrive grouped by the service that published them
/// (`wgNodeProperties`, `redisNodeProperties`, ...); every group is merged
/// into one view.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmState {
    /// Intended members.
    #[serde(default)]
    pub cluster_nodes: Vec<ClusterNode>,

    /// Leadership.
    #[serde(default)]
    pub cluster: ClusterInfo,

    /// Cluster-scoped properties.
    #[serde(default)]
    pub cluster_properties: Vec<ClusterPropertyEntry>,

    /// Everything else, including the node property groups.
    #[serde(flatten)]
    pub rest: BTreeMap<String, Value>,
}

impl SwarmState {
    /// Decode a state document. `null` is an empty swarm.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the document has the wrong shape.
    pub fn from_value(value: &Value) -> Result<Self, Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value.clone())?)
    }

    /// Node property entries of every group, in group-name order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if a group is not a list of entries.
    pub fn node_properties(&self) -> Result<Vec<NodePropertyEntry>, Error> {
        let mut entries = Vec::new();
        for (group, value) in &self.rest {
            if !group.ends_with(NODE_PROPERTIES_SUFFIX) || value.is_null() {
                continue;
            }
            let group: Vec<NodePropertyEntry> = serde_json::from_value(value.clone())?;
            entries.extend(group);
        }
        Ok(entries)
    }

    /// Build the view the reconciler works on.
    ///
    /// # Errors
    ///
    /// Returns an error if the document names blank node ids or has the
    /// wrong shape.
    pub fn into_view(self, local_node_id: &str) -> Result<StateView, Error> {
        let local = NodeId::new(local_node_id)?;
        let node_properties = self.node_properties()?;

        let mut builder = StateView::builder(local);
        for node in self.cluster_nodes {
            let mut member = Member::new(NodeId::new(node.node_id)?);
            if let Some(address) = node.address {
                member = member.with_declared_address(address);
            }
            builder = builder.member(member);
        }

        let leader = self
            .cluster
            .leader_node
            .filter(|leader| !leader.trim().is_empty())
            .map(NodeId::new)
            .transpose()?;
        builder = builder.maybe_leader(leader);

        for entry in node_properties {
            if let Some(value) = entry.value {
                builder = builder.node_property(
                    NodeId::new(entry.node_id)?,
                    entry.name,
                    PropertyValue::decode(&value),
                );
            }
        }
        for entry in self.cluster_properties {
            if let Some(value) = entry.value {
                builder = builder.cluster_property(entry.name, PropertyValue::decode(&value));
            }
        }

        Ok(builder.build())
    }
}
