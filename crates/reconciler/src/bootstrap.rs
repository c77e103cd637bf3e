//! Leader-only, one-time formation of the managed cluster.

use std::fmt;

use swarm_service::ServiceController;
use swarm_state::{Member, NodeId, PropertyKey, PropertyValue, StateView};
use tracing::{debug, info};

use crate::config::{JoinPolicy, ReconcilerConfig};
use crate::error::{Error, Result};
use crate::poll::{bounded, poll_until};
use crate::readiness::{NotReady, Readiness, ReadinessGate};

/// Where cluster formation stands, as seen from the leader.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BootstrapPhase {
    /// The local instance is not ready yet, so formation cannot start.
    NotInitialized,

    /// Some quorum member has not reported ready.
    WaitingForQuorum(NotReady),

    /// Every quorum member is ready; formation should run now.
    Bootstrapping,

    /// The cluster-initialized flag is set.
    Initialized,
}

impl fmt::Display for BootstrapPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => f.write_str("not initialized"),
            Self::WaitingForQuorum(not_ready) => write!(f, "waiting for quorum: {not_ready}"),
            Self::Bootstrapping => f.write_str("bootstrapping"),
            Self::Initialized => f.write_str("initialized"),
        }
    }
}

/// Reads the cluster-initialized flag.
///
/// # Errors
///
/// Returns [`Error::Contradictory`] if the flag holds a non-flag value.
pub fn cluster_initialized(view: &StateView, flag: &str) -> Result<bool> {
    match view.cluster_property(flag) {
        None => Ok(false),
        Some(value) => value.as_flag().ok_or_else(|| Error::Contradictory {
            name: flag.to_string(),
            value: value.encode(),
        }),
    }
}

/// Drives the `NotInitialized → WaitingForQuorum → Bootstrapping → Initialized`
/// state machine.
#[derive(Clone, Debug)]
pub struct ClusterBootstrapper {
    config: ReconcilerConfig,
    quorum_gate: ReadinessGate,
}

impl ClusterBootstrapper {
    /// Create a bootstrapper.
    #[must_use]
    pub fn new(config: ReconcilerConfig) -> Self {
        let quorum_gate = ReadinessGate::quorum(config.node_ready_property());
        Self {
            config,
            quorum_gate,
        }
    }

    /// Members whose readiness gates formation.
    #[must_use]
    pub fn quorum(&self, view: &StateView) -> Vec<NodeId> {
        match self.config.join_policy {
            JoinPolicy::Concurrent => view.members().map(|m| m.id().clone()).collect(),
            JoinPolicy::AfterBootstrap => view.leader().cloned().into_iter().collect(),
        }
    }

    /// Work out the phase. `locally_ready` is the local instance's health as
    /// established by the current round; it stands in for the local ready flag.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Contradictory`] if the initialized flag is not a flag.
    pub fn evaluate(&self, view: &StateView, locally_ready: bool) -> Result<BootstrapPhase> {
        if cluster_initialized(view, &self.config.cluster_initialized_property())? {
            return Ok(BootstrapPhase::Initialized);
        }

        if !locally_ready {
            return Ok(BootstrapPhase::NotInitialized);
        }

        let local = view.local_node_id();
        let quorum = self.quorum(view);
        let remote = quorum.iter().filter(|id| *id != local);

        Ok(match self.quorum_gate.evaluate_members(view, remote) {
            Readiness::Ready => BootstrapPhase::Bootstrapping,
            Readiness::NotReady(not_ready) => BootstrapPhase::WaitingForQuorum(not_ready),
        })
    }

    /// Form the cluster and wait until the local node shows up in the
    /// managed service's member list.
    ///
    /// Returns the cluster-initialized flag to publish.
    ///
    /// # Errors
    ///
    /// Returns the classified controller error, or a retryable
    /// [`Error::Timeout`] if verification runs out of time.
    pub async fn bootstrap<C: ServiceController>(
        &self,
        controller: &C,
        view: &StateView,
    ) -> Result<(PropertyKey, PropertyValue)> {
        let quorum = self.quorum(view);
        let members: Vec<Member> = quorum
            .iter()
            .filter_map(|id| view.member(id).cloned())
            .collect();

        info!(
            service = %self.config.service,
            members = members.len(),
            "forming cluster"
        );

        let timeouts = &self.config.timeouts;
        bounded("form_cluster", timeouts.operation, controller.form_cluster(&members)).await?;

        let local = view.local_node_id();
        poll_until(timeouts.verify, timeouts.poll_interval, move || async move {
            let listed = bounded("list_members", timeouts.operation, controller.list_members())
                .await
                .map_err(|e| e.to_string())?;
            if listed.contains(local) {
                Ok(())
            } else {
                debug!(listed = listed.len(), "local node not listed yet");
                Err(format!("{local} not yet listed as a member"))
            }
        })
        .await
        .map_err(|expired| {
            debug!(%expired, "cluster formation not verified");
            Error::Timeout {
                operation: "verify_cluster",
                after: expired.after,
            }
        })?;

        info!(service = %self.config.service, "cluster formed");

        Ok((
            PropertyKey::cluster(self.config.cluster_initialized_property()),
            PropertyValue::Flag(true),
        ))
    }
}
