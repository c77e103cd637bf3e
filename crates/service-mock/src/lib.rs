//! Mock implementation of the service controller interface for testing purposes.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use swarm_service::{Health, ServiceConfig, ServiceController, ServiceErrorKind};
use swarm_state::{Member, NodeId, PropertyValue};
use tracing::debug;

/// Operations a script can target.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// `prepare`
    Prepare,
    /// `configure`
    Configure,
    /// `start`
    Start,
    /// `stop`
    Stop,
    /// `probe_healthy`
    ProbeHealthy,
    /// `form_cluster`
    FormCluster,
    /// `list_members`
    ListMembers,
    /// `quiesce_member`
    QuiesceMember,
    /// `drain_member`
    DrainMember,
    /// `remove_member`
    RemoveMember,
    /// `teardown`
    Teardown,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Prepare => "prepare",
            Self::Configure => "configure",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::ProbeHealthy => "probe_healthy",
            Self::FormCluster => "form_cluster",
            Self::ListMembers => "list_members",
            Self::QuiesceMember => "quiesce_member",
            Self::DrainMember => "drain_member",
            Self::RemoveMember => "remove_member",
            Self::Teardown => "teardown",
        };
        f.write_str(name)
    }
}

/// A recorded controller call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    /// `prepare()`
    Prepare,
    /// `configure(config)`
    Configure(ServiceConfig),
    /// `start()`
    Start,
    /// `stop(grace_period)`
    Stop(Duration),
    /// `form_cluster(members)`
    FormCluster(Vec<NodeId>),
    /// `list_members()`
    ListMembers,
    /// `quiesce_member(id)`
    QuiesceMember(NodeId),
    /// `drain_member(id)`
    DrainMember(NodeId),
    /// `remove_member(id)`
    RemoveMember(NodeId),
    /// `teardown()`
    Teardown,
}

impl Call {
    /// The operation this call belongs to.
    #[must_use]
    pub const fn operation(&self) -> Operation {
        match self {
            Self::Prepare => Operation::Prepare,
            Self::Configure(_) => Operation::Configure,
            Self::Start => Operation::Start,
            Self::Stop(_) => Operation::Stop,
            Self::FormCluster(_) => Operation::FormCluster,
            Self::ListMembers => Operation::ListMembers,
            Self::QuiesceMember(_) => Operation::QuiesceMember,
            Self::DrainMember(_) => Operation::DrainMember,
            Self::RemoveMember(_) => Operation::RemoveMember,
            Self::Teardown => Operation::Teardown,
        }
    }
}

/// Cluster-wide view of the managed service, shared by every node's mock.
#[derive(Debug, Default)]
struct ClusterModel {
    formed: bool,
    members: BTreeSet<NodeId>,
}

#[derive(Debug, Default)]
struct NodeModel {
    advertised: Vec<(String, PropertyValue)>,
    calls: Vec<Call>,
    config: Option<ServiceConfig>,
    delays: HashMap<Operation, Duration>,
    failing_members: HashMap<(Operation, NodeId), ServiceErrorKind>,
    health: Option<Health>,
    one_shot_failures: HashMap<Operation, VecDeque<ServiceErrorKind>>,
    persistent_failures: HashMap<Operation, ServiceErrorKind>,
    running: bool,
    unhealthy_probes: usize,
}

/// Scriptable in-memory service controller.
///
/// Clones share state, so a test can keep a handle while the reconciler owns
/// another one.
#[derive(Clone)]
pub struct MockServiceController {
    cluster: Arc<Mutex<ClusterModel>>,
    name: String,
    node: Arc<Mutex<NodeModel>>,
    node_id: NodeId,
}

impl fmt::Debug for MockServiceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockServiceController")
            .field("name", &self.name)
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl MockServiceController {
    /// Create a controller for `node_id` with its own cluster model.
    pub fn new(name: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        Self {
            cluster: Arc::new(Mutex::new(ClusterModel::default())),
            name: name.into(),
            node: Arc::new(Mutex::new(NodeModel::default())),
            node_id: node_id.into(),
        }
    }

    /// Create a controller for another node of the same managed cluster.
    #[must_use]
    pub fn peer(&self, node_id: impl Into<NodeId>) -> Self {
        Self {
            cluster: self.cluster.clone(),
            name: self.name.clone(),
            node: Arc::new(Mutex::new(NodeModel::default())),
            node_id: node_id.into(),
        }
    }

    /// Seed the managed service's membership as if the cluster was formed
    /// earlier with `members`.
    #[must_use]
    pub fn with_formed_cluster<I, N>(self, members: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        {
            let mut cluster = self.cluster.lock();
            cluster.formed = true;
            cluster.members.extend(members.into_iter().map(Into::into));
        }
        self
    }

    /// Fail the next call of `operation` once.
    pub fn fail_next(&self, operation: Operation, kind: ServiceErrorKind) {
        self.node
            .lock()
            .one_shot_failures
            .entry(operation)
            .or_default()
            .push_back(kind);
    }

    /// Fail every call of `operation` until [`Self::clear_failures`].
    pub fn fail_always(&self, operation: Operation, kind: ServiceErrorKind) {
        self.node.lock().persistent_failures.insert(operation, kind);
    }

    /// Fail every member-targeted `operation` for `id` until healed.
    pub fn fail_member(&self, operation: Operation, id: impl Into<NodeId>, kind: ServiceErrorKind) {
        self.node
            .lock()
            .failing_members
            .insert((operation, id.into()), kind);
    }

    /// Stop failing member-targeted `operation` for `id`.
    pub fn heal_member(&self, operation: Operation, id: impl Into<NodeId>) {
        self.node
            .lock()
            .failing_members
            .remove(&(operation, id.into()));
    }

    /// Remove every scripted failure for `operation`.
    pub fn clear_failures(&self, operation: Operation) {
        let mut node = self.node.lock();
        node.one_shot_failures.remove(&operation);
        node.persistent_failures.remove(&operation);
        node.failing_members.retain(|(op, _), _| *op != operation);
    }

    /// Make every call of `operation` take `delay` first.
    pub fn delay(&self, operation: Operation, delay: Duration) {
        self.node.lock().delays.insert(operation, delay);
    }

    /// Force the probe result; `None` restores the default (healthy while running).
    pub fn set_health(&self, health: Option<Health>) {
        self.node.lock().health = health;
    }

    /// Report unhealthy for the next `count` probes.
    pub fn unhealthy_for(&self, count: usize) {
        self.node.lock().unhealthy_probes = count;
    }

    /// Node facts to advertise once healthy.
    pub fn advertise(&self, name: impl Into<String>, value: impl Into<PropertyValue>) {
        self.node
            .lock()
            .advertised
            .push((name.into(), value.into()));
    }

    /// Simulate the local process dying.
    pub fn crash(&self) {
        self.node.lock().running = false;
    }

    /// Every call made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.node.lock().calls.clone()
    }

    /// Number of calls of `operation` made so far.
    #[must_use]
    pub fn count(&self, operation: Operation) -> usize {
        self.node
            .lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Forget the call journal.
    pub fn clear_calls(&self) {
        self.node.lock().calls.clear();
    }

    /// Ids targeted by `remove_member` so far.
    #[must_use]
    pub fn removed(&self) -> Vec<NodeId> {
        self.node
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::RemoveMember(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    /// The last configuration written.
    #[must_use]
    pub fn config(&self) -> Option<ServiceConfig> {
        self.node.lock().config.clone()
    }

    /// Whether the local instance runs.
    #[must_use]
    pub fn running(&self) -> bool {
        self.node.lock().running
    }

    /// Whether the managed cluster has been formed.
    #[must_use]
    pub fn cluster_formed(&self) -> bool {
        self.cluster.lock().formed
    }

    /// Members according to the managed service.
    #[must_use]
    pub fn service_members(&self) -> BTreeSet<NodeId> {
        self.cluster.lock().members.clone()
    }

    /// Add a member to the managed service's own model.
    pub fn add_service_member(&self, id: impl Into<NodeId>) {
        self.cluster.lock().members.insert(id.into());
    }

    /// The node this controller runs on.
    #[must_use]
    pub const fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    async fn enter(&self, call: Call, target: Option<&NodeId>) -> Result<(), Error> {
        let operation = call.operation();
        let (delay, failure) = {
            let mut node = self.node.lock();
            node.calls.push(call);

            let delay = node.delays.get(&operation).copied();
            let member_failure =
                target.and_then(|id| node.failing_members.get(&(operation, id.clone())).copied());
            let one_shot = node
                .one_shot_failures
                .get_mut(&operation)
                .and_then(VecDeque::pop_front);
            let persistent = node.persistent_failures.get(&operation).copied();

            (delay, member_failure.or(one_shot).or(persistent))
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match failure {
            Some(kind) => {
                debug!(%operation, %kind, node = %self.node_id, "scripted failure");
                Err(Error { operation, kind })
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceController for MockServiceController {
    type Error = Error;

    fn name(&self) -> &str {
        &self.name
    }

    async fn prepare(&self) -> Result<(), Self::Error> {
        self.enter(Call::Prepare, None).await
    }

    async fn configure(&self, config: &ServiceConfig) -> Result<(), Self::Error> {
        self.enter(Call::Configure(config.clone()), None).await?;
        self.node.lock().config = Some(config.clone());
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.node.lock().running
    }

    async fn start(&self) -> Result<(), Self::Error> {
        self.enter(Call::Start, None).await?;
        self.node.lock().running = true;

        // A node started against an already formed cluster joins it.
        let mut cluster = self.cluster.lock();
        if cluster.formed {
            cluster.members.insert(self.node_id.clone());
        }
        Ok(())
    }

    async fn stop(&self, grace_period: Duration) -> Result<(), Self::Error> {
        self.enter(Call::Stop(grace_period), None).await?;
        self.node.lock().running = false;
        Ok(())
    }

    async fn probe_healthy(&self) -> Health {
        let delay = self.node.lock().delays.get(&Operation::ProbeHealthy).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut node = self.node.lock();
        if !node.running {
            return Health::Unhealthy("service is not running".to_string());
        }
        if node.unhealthy_probes > 0 {
            node.unhealthy_probes -= 1;
            return Health::Unhealthy("still starting".to_string());
        }
        node.health.clone().unwrap_or(Health::Healthy)
    }

    async fn form_cluster(&self, members: &[Member]) -> Result<(), Self::Error> {
        let ids: Vec<NodeId> = members.iter().map(|m| m.id().clone()).collect();
        self.enter(Call::FormCluster(ids.clone()), None).await?;

        let mut cluster = self.cluster.lock();
        cluster.formed = true;
        cluster.members.extend(ids);
        Ok(())
    }

    async fn list_members(&self) -> Result<Vec<NodeId>, Self::Error> {
        self.enter(Call::ListMembers, None).await?;
        Ok(self.cluster.lock().members.iter().cloned().collect())
    }

    async fn quiesce_member(&self, id: &NodeId) -> Result<(), Self::Error> {
        self.enter(Call::QuiesceMember(id.clone()), Some(id)).await
    }

    async fn drain_member(&self, id: &NodeId) -> Result<(), Self::Error> {
        self.enter(Call::DrainMember(id.clone()), Some(id)).await
    }

    async fn remove_member(&self, id: &NodeId) -> Result<(), Self::Error> {
        self.enter(Call::RemoveMember(id.clone()), Some(id)).await?;
        self.cluster.lock().members.remove(id);
        Ok(())
    }

    async fn teardown(&self) -> Result<(), Self::Error> {
        self.enter(Call::Teardown, None).await?;
        let mut node = self.node.lock();
        node.config = None;
        node.running = false;
        Ok(())
    }

    fn advertised_properties(&self, _config: &ServiceConfig) -> Vec<(String, PropertyValue)> {
        self.node.lock().advertised.clone()
    }
}
