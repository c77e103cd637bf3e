//! Main cluster management implementation

use crate::node::ManagedNode;

use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use swarm_property_store::PropertyStore;
use swarm_property_store_memory::MemoryPropertyStore;
use swarm_reconciler::{Command, Reconciler, ReconcilerConfig, RoundResult, Status};
use swarm_service_mock::{MockServiceController, Operation};
use swarm_state::{Member, NodeId, PropertyDelta, PropertyKey, PropertyValue, StateView};
use tracing::info;

/// Builder for [`LocalCluster`].
#[derive(Clone, Debug)]
pub struct ClusterBuilder {
    config: ReconcilerConfig,
    nodes: Vec<String>,
    leader: Option<String>,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self {
            config: ReconcilerConfig::new("service"),
            nodes: Vec::new(),
            leader: None,
        }
    }
}

impl ClusterBuilder {
    /// Reconciler configuration shared by every node.
    #[must_use]
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a member node.
    #[must_use]
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.nodes.push(name.into());
        self
    }

    /// Add several member nodes.
    #[must_use]
    pub fn nodes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes.extend(names.into_iter().map(Into::into));
        self
    }

    /// Elect `name`. Without this the first node leads.
    #[must_use]
    pub fn leader(mut self, name: impl Into<String>) -> Self {
        self.leader = Some(name.into());
        self
    }

    /// Build the cluster, publishing every node's address.
    ///
    /// # Errors
    ///
    /// Returns an error if a node name is invalid or the leader is unknown.
    pub async fn build(self) -> Result<LocalCluster> {
        let mut cluster = LocalCluster::new(self.config);
        for name in &self.nodes {
            cluster.add_node(name).await?;
        }

        let leader = self.leader.or_else(|| self.nodes.first().cloned());
        if let Some(leader) = leader {
            cluster.set_leader(Some(NodeId::new(leader)?))?;
        }

        Ok(cluster)
    }
}

/// Several nodes sharing one property store and one service cluster.
///
/// Membership and leadership are decided by the caller, the way the
/// provisioning host would decide them. Every round reads a fresh snapshot
/// of the store and writes its published properties back.
pub struct LocalCluster {
    config: ReconcilerConfig,

    /// Properties every node coordinates through
    store: MemoryPropertyStore,

    /// Source of the shared service cluster model
    service: MockServiceController,

    /// Every node ever added, including ones no longer members
    nodes: BTreeMap<NodeId, ManagedNode>,

    /// Current members, in join order
    members: Vec<NodeId>,

    leader: Option<NodeId>,

    next_address: u8,
}

impl LocalCluster {
    /// Create a new cluster builder
    #[must_use]
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    fn new(config: ReconcilerConfig) -> Self {
        let service = MockServiceController::new(config.service.clone(), "local-cluster");

        Self {
            config,
            store: MemoryPropertyStore::new(),
            service,
            nodes: BTreeMap::new(),
            members: Vec::new(),
            leader: None,
            next_address: 1,
        }
    }

    // --- Membership ---

    /// Create a node, publish its address and make it a member.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a valid node id or already in use.
    pub async fn add_node(&mut self, name: &str) -> Result<NodeId> {
        let id = NodeId::new(name)?;
        if self.nodes.contains_key(&id) {
            bail!("node {id} already exists");
        }

        let address = format!("10.0.0.{}", self.next_address);
        self.next_address = self.next_address.wrapping_add(1);
        let property = self.config.address_property.clone();
        self.publish(&id, &property, address).await?;

        let controller = self.service.peer(id.clone());
        let reconciler = Reconciler::new(controller.clone(), self.config.clone());
        self.nodes
            .insert(id.clone(), ManagedNode::new(id.clone(), controller, reconciler));
        self.members.push(id.clone());

        info!(node = %id, "added node");
        Ok(id)
    }

    /// Drop `id` from the member list. The node keeps its service instance
    /// and can still run rounds, such as `destroy`.
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not a member.
    pub fn remove_member(&mut self, id: &NodeId) -> Result<()> {
        let before = self.members.len();
        self.members.retain(|member| member != id);
        if self.members.len() == before {
            bail!("{id} is not a member");
        }
        if self.leader.as_ref() == Some(id) {
            self.leader = None;
        }

        info!(node = %id, "removed member");
        Ok(())
    }

    /// Make an existing node a member again.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn readmit(&mut self, id: &NodeId) -> Result<()> {
        if !self.nodes.contains_key(id) {
            bail!("unknown node {id}");
        }
        if !self.members.contains(id) {
            self.members.push(id.clone());
        }
        Ok(())
    }

    /// Elect `leader`, or leave the swarm leaderless.
    ///
    /// # Errors
    ///
    /// Returns an error if `leader` is not a member.
    pub fn set_leader(&mut self, leader: Option<NodeId>) -> Result<()> {
        if let Some(id) = &leader
            && !self.members.contains(id)
        {
            bail!("{id} is not a member");
        }

        info!(leader = ?leader.as_ref().map(NodeId::as_str), "leader changed");
        self.leader = leader;
        Ok(())
    }

    /// Current members, in join order.
    #[must_use]
    pub fn members(&self) -> &[NodeId] {
        &self.members
    }

    /// Current leader.
    #[must_use]
    pub const fn leader(&self) -> Option<&NodeId> {
        self.leader.as_ref()
    }

    // --- Properties ---

    /// Publish a property on behalf of another plugin on `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn publish(
        &self,
        owner: &NodeId,
        name: &str,
        value: impl Into<PropertyValue> + Send,
    ) -> Result<()> {
        let mut delta = PropertyDelta::new();
        delta.publish(PropertyKey::node(owner.clone(), name), value);
        self.store.apply(delta).await?;
        Ok(())
    }

    /// Retract a property.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn retract(&self, key: PropertyKey) -> Result<()> {
        let mut delta = PropertyDelta::new();
        delta.retract(key);
        self.store.apply(delta).await?;
        Ok(())
    }

    /// The shared store.
    #[must_use]
    pub const fn store(&self) -> &MemoryPropertyStore {
        &self.store
    }

    /// Snapshot of the swarm as seen by `local`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn view(&self, local: &NodeId) -> Result<StateView> {
        let builder = StateView::builder(local.clone())
            .members(self.members.iter().cloned().map(Member::new))
            .maybe_leader(self.leader.clone());
        Ok(self.store.view(builder).await?)
    }

    // --- Nodes ---

    /// A node by id.
    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&ManagedNode> {
        self.nodes.get(id)
    }

    /// A node by id, mutably.
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut ManagedNode> {
        self.nodes.get_mut(id)
    }

    /// The service instance of a node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown.
    pub fn controller(&self, id: &NodeId) -> Result<&MockServiceController> {
        self.node(id)
            .map(ManagedNode::controller)
            .ok_or_else(|| anyhow!("unknown node {id}"))
    }

    /// The shared service cluster, as any node's service sees it.
    #[must_use]
    pub const fn service(&self) -> &MockServiceController {
        &self.service
    }

    /// Calls of `operation` made by every node's service so far.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.nodes
            .values()
            .map(|node| node.controller().count(operation))
            .sum()
    }

    /// Members removed from the service cluster by any node, successfully or
    /// not, oldest first per node.
    #[must_use]
    pub fn removals(&self) -> Vec<NodeId> {
        self.nodes
            .values()
            .flat_map(|node| node.controller().removed())
            .collect()
    }

    // --- Rounds ---

    /// Run one round on `id` and write its published properties back.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is unknown or the store fails.
    pub async fn run(&mut self, id: &NodeId, command: Command) -> Result<RoundResult> {
        let view = self.view(id).await?;
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| anyhow!("unknown node {id}"))?;

        let result = node.run(command, &view).await;
        self.store
            .apply(result.published().clone())
            .await
            .with_context(|| format!("failed to store properties published by {id}"))?;

        Ok(result)
    }

    /// Run `apply` on `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn apply(&mut self, id: &NodeId) -> Result<RoundResult> {
        self.run(id, Command::Apply).await
    }

    /// Run `apply` on the given nodes in the given order.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn apply_in_order(&mut self, order: &[NodeId]) -> Result<Vec<RoundResult>> {
        let mut results = Vec::with_capacity(order.len());
        for id in order {
            results.push(self.apply(id).await?);
        }
        Ok(results)
    }

    /// Run `apply` once on every member, in join order.
    ///
    /// # Errors
    ///
    /// See [`Self::run`].
    pub async fn sweep(&mut self) -> Result<Vec<RoundResult>> {
        let order = self.members.clone();
        self.apply_in_order(&order).await
    }

    /// Sweep until every member completes in the same sweep. Returns the
    /// number of sweeps taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the swarm has not converged after `max_sweeps`.
    pub async fn converge(&mut self, max_sweeps: usize) -> Result<usize> {
        self.converge_with(max_sweeps, |members| members.to_vec())
            .await
    }

    /// Like [`Self::converge`], with the order of each sweep chosen by
    /// `order` from the current members and the sweep number.
    ///
    /// # Errors
    ///
    /// Returns an error if the swarm has not converged after `max_sweeps`.
    pub async fn converge_with<F>(&mut self, max_sweeps: usize, mut order: F) -> Result<usize>
    where
        F: FnMut(&[NodeId]) -> Vec<NodeId>,
    {
        let mut last = Vec::new();
        for sweep in 1..=max_sweeps {
            let ids = order(&self.members);
            let results = self.apply_in_order(&ids).await?;
            if results
                .iter()
                .all(|result| result.status() == Status::Completed)
            {
                info!(sweep, "swarm converged");
                return Ok(sweep);
            }
            last = ids
                .into_iter()
                .zip(results)
                .filter(|(_, result)| result.status() != Status::Completed)
                .map(|(id, result)| format!("{id}: {}", result.message().unwrap_or_default()))
                .collect();
        }

        bail!(
            "swarm did not converge after {max_sweeps} sweeps: {}",
            last.join("; ")
        )
    }
}
