//! Command dispatch: one round per invocation.

use serde_json::{Map, Value};
use swarm_service::{Health, ServiceConfig, ServiceController};
use swarm_state::{NodeId, PropertyDelta, PropertyKey, PropertyValue, StateView};
use tracing::{debug, error, info, warn};

use crate::bootstrap::{BootstrapPhase, ClusterBootstrapper, cluster_initialized};
use crate::carry_forward::CarryForwardState;
use crate::command::Command;
use crate::config::{JoinPolicy, ReconcilerConfig};
use crate::desired_config::desired_config;
use crate::error::{Error, Result};
use crate::membership::MembershipReconciler;
use crate::poll::{bounded, bounded_infallible, poll_until};
use crate::readiness::{Readiness, ReadinessGate};
use crate::status::{Outcome, RoundResult, Status, StatusReporter};

/// State of the local instance after converging it.
enum Local {
    Ready,
    NotReady(String),
}

/// Mutable state of a round in progress.
struct Round {
    local: NodeId,
    carry: CarryForwardState,
    published: PropertyDelta,
}

impl Round {
    fn new(view: &StateView, carry: CarryForwardState) -> Self {
        Self {
            local: view.local_node_id().clone(),
            carry,
            published: PropertyDelta::new(),
        }
    }

    fn publish_node(&mut self, name: String, value: impl Into<PropertyValue>) {
        self.published
            .publish(PropertyKey::node(self.local.clone(), name.clone()), value);
        self.carry.published.insert(name);
    }

    fn remember_members(&mut self, view: &StateView) {
        self.carry.remember(view.member_ids());
    }

    fn finish(self, outcome: Outcome) -> RoundResult {
        StatusReporter::report(outcome, self.published, &self.carry)
    }
}

/// Reconciles one managed service on the local node.
#[derive(Debug)]
pub struct Reconciler<C>
where
    C: ServiceController,
{
    bootstrapper: ClusterBootstrapper,
    config: ReconcilerConfig,
    controller: C,
    gate: ReadinessGate,
    membership: MembershipReconciler,
}

impl<C> Reconciler<C>
where
    C: ServiceController,
{
    /// Create a reconciler driving `controller`.
    pub fn new(controller: C, config: ReconcilerConfig) -> Self {
        Self {
            bootstrapper: ClusterBootstrapper::new(config.clone()),
            gate: ReadinessGate::dependencies(config.dependency_properties.iter().cloned()),
            membership: MembershipReconciler::new(config.timeouts.operation),
            config,
            controller,
        }
    }

    /// The controller.
    pub const fn controller(&self) -> &C {
        &self.controller
    }

    /// The configuration.
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run `command` once against `view`.
    ///
    /// Never fails: every problem ends up in the result's status. An
    /// undecodable `carry_forward` is echoed back unchanged.
    pub async fn run(&self, command: Command, view: &StateView, carry_forward: &Value) -> RoundResult {
        info!(
            service = %self.config.service,
            %command,
            node = %view.local_node_id(),
            leader = ?view.leader().map(NodeId::as_str),
            members = view.member_count(),
            "starting round"
        );

        let decoded = CarryForwardState::decode(carry_forward);
        let result = match (command, decoded) {
            (Command::Destroy, decoded) => self.destroy(view, decoded.ok()).await,
            (_, Err(e)) => {
                error!(error = %e, "cannot decode carry-forward state");
                StatusReporter::report_raw(e.into(), PropertyDelta::new(), carry_forward.clone())
            }
            (Command::Init, Ok(carry)) => self.init(view, carry).await,
            (Command::Apply, Ok(carry)) => self.apply(view, carry).await,
            (Command::Health, Ok(carry)) => self.health(view, carry).await,
            (Command::Finalize, Ok(carry)) => self.finalize(view, carry).await,
        };

        match result.status() {
            Status::Completed => info!(%command, "round completed"),
            Status::Postponed => info!(%command, reason = ?result.message(), "round postponed"),
            Status::Error => error!(%command, reason = ?result.message(), "round failed"),
        }

        result
    }

    async fn init(&self, view: &StateView, carry: CarryForwardState) -> RoundResult {
        let round = Round::new(view, carry);
        let outcome = match bounded(
            "prepare",
            self.config.timeouts.prepare,
            self.controller.prepare(),
        )
        .await
        {
            Ok(()) => Outcome::completed(),
            Err(e) => e.into(),
        };
        round.finish(outcome)
    }

    async fn apply(&self, view: &StateView, carry: CarryForwardState) -> RoundResult {
        let mut round = Round::new(view, carry);
        let outcome = match self.converge(view, &mut round).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        };
        round.finish(outcome)
    }

    async fn converge(&self, view: &StateView, round: &mut Round) -> Result<Outcome> {
        let config = &self.config;
        let local = view.local_node_id();

        if let Readiness::NotReady(not_ready) = self.gate.evaluate(view) {
            debug!(%not_ready, "dependencies not ready");
            return Ok(Outcome::postponed(not_ready.to_string()));
        }

        if view.member_count() < config.min_members {
            return Ok(Outcome::postponed(format!(
                "waiting for at least {} members, have {}",
                config.min_members,
                view.member_count()
            )));
        }

        if !view.contains_member(local) {
            return Ok(Outcome::postponed(format!(
                "node {local} is not a member of the swarm yet"
            )));
        }

        let initialized = cluster_initialized(view, &config.cluster_initialized_property())?;
        let is_leader = view.is_leader();

        if !is_leader && config.join_policy == JoinPolicy::AfterBootstrap {
            if let Some(reason) = self.follower_blocked(view, initialized) {
                round.remember_members(view);
                return Ok(Outcome::Postponed(reason));
            }
        }

        let desired = desired_config(view, config)?;
        if let Local::NotReady(reason) = self.converge_local(&desired, round).await? {
            return Ok(Outcome::Postponed(reason));
        }

        round.publish_node(config.node_ready_property(), true);
        for (name, value) in self.controller.advertised_properties(&desired) {
            round.publish_node(config.scoped_property(&name), value);
        }

        if !is_leader {
            round.remember_members(view);
            if initialized {
                return Ok(Outcome::completed());
            }
            return Ok(Outcome::Postponed(view.leader().map_or_else(
                || "no leader elected yet".to_string(),
                |leader| format!("waiting for leader {leader} to form the cluster"),
            )));
        }

        match self.bootstrapper.evaluate(view, true)? {
            BootstrapPhase::Initialized => {}
            BootstrapPhase::NotInitialized => {
                return Ok(Outcome::postponed("local instance not ready"));
            }
            BootstrapPhase::WaitingForQuorum(not_ready) => {
                debug!(%not_ready, "quorum not ready");
                round.remember_members(view);
                return Ok(Outcome::Postponed(not_ready.to_string()));
            }
            BootstrapPhase::Bootstrapping => {
                let (key, value) = self.bootstrapper.bootstrap(&self.controller, view).await?;
                round.published.publish(key, value);
                round.carry.known_members = view.member_ids();
                return Ok(Outcome::Completed(Some("cluster formed".to_string())));
            }
        }

        Ok(self.retire_departed(view, round).await)
    }

    fn follower_blocked(&self, view: &StateView, initialized: bool) -> Option<String> {
        let Some(leader) = view.leader() else {
            return Some("no leader elected yet".to_string());
        };

        if !initialized {
            return Some(format!("waiting for leader {leader} to bootstrap the cluster"));
        }

        let node_ready = self.config.node_ready_property();
        let leader_ready = view
            .node_property(leader, &node_ready)
            .and_then(PropertyValue::as_flag)
            .unwrap_or(false);
        (!leader_ready).then(|| format!("waiting for leader {leader} to report {node_ready}=true"))
    }

    /// Bring the local instance in line with `desired`. Restarts only when
    /// the configuration changed.
    async fn converge_local(&self, desired: &ServiceConfig, round: &mut Round) -> Result<Local> {
        let timeouts = &self.config.timeouts;
        let fingerprint = desired.fingerprint();
        let unchanged = round.carry.config_fingerprint.as_deref() == Some(fingerprint.as_str());
        let running =
            bounded_infallible("is_running", timeouts.operation, self.controller.is_running())
                .await?;

        if unchanged && running {
            if round.carry.service_ready {
                let health = bounded_infallible(
                    "probe_healthy",
                    timeouts.operation,
                    self.controller.probe_healthy(),
                )
                .await?;
                return Ok(match health {
                    Health::Healthy => Local::Ready,
                    Health::Unhealthy(reason) => {
                        warn!(%reason, "service unhealthy");
                        round.carry.service_ready = false;
                        Local::NotReady(format!("service unhealthy: {reason}"))
                    }
                });
            }
            debug!("configuration unchanged, waiting for the service to become healthy");
        } else {
            if !unchanged {
                info!(%fingerprint, "writing configuration");
                round.carry.service_ready = false;
                bounded("configure", timeouts.operation, self.controller.configure(desired))
                    .await?;
            }

            if running {
                info!("restarting service");
                bounded(
                    "stop",
                    timeouts.operation + timeouts.stop_grace,
                    self.controller.stop(timeouts.stop_grace),
                )
                .await?;
            } else {
                info!("starting service");
            }
            bounded("start", timeouts.operation, self.controller.start()).await?;
            // Applied only once the instance runs with it.
            round.carry.config_fingerprint = Some(fingerprint);
        }

        let controller = &self.controller;
        let limit = timeouts.operation;
        let healthy = poll_until(timeouts.ready, timeouts.poll_interval, move || async move {
            match bounded_infallible("probe_healthy", limit, controller.probe_healthy()).await {
                Ok(Health::Healthy) => Ok(()),
                Ok(Health::Unhealthy(reason)) => Err(reason),
                Err(e) => Err(e.to_string()),
            }
        })
        .await;

        Ok(match healthy {
            Ok(()) => {
                round.carry.service_ready = true;
                Local::Ready
            }
            Err(expired) => {
                round.carry.service_ready = false;
                Local::NotReady(format!("service not healthy: {expired}"))
            }
        })
    }

    async fn retire_departed(&self, view: &StateView, round: &mut Round) -> Outcome {
        let report = self
            .membership
            .reconcile(&self.controller, view, &round.carry.known_members)
            .await;
        round.carry.known_members = report.known_members;
        match report.postponed {
            Some(reason) if report.structural => Outcome::Failed(Error::Retirement(reason)),
            Some(reason) => Outcome::Postponed(reason),
            None => Outcome::completed(),
        }
    }

    async fn health(&self, view: &StateView, carry: CarryForwardState) -> RoundResult {
        let mut round = Round::new(view, carry);
        let outcome = match self.check_health(view, &mut round).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        };
        round.finish(outcome)
    }

    async fn check_health(&self, view: &StateView, round: &mut Round) -> Result<Outcome> {
        let timeouts = &self.config.timeouts;

        let running =
            bounded_infallible("is_running", timeouts.operation, self.controller.is_running())
                .await?;
        if !running {
            round.carry.service_ready = false;
            return Ok(Outcome::postponed("service is not running"));
        }

        let health = bounded_infallible(
            "probe_healthy",
            timeouts.operation,
            self.controller.probe_healthy(),
        )
        .await?;
        if let Health::Unhealthy(reason) = health {
            round.carry.service_ready = false;
            return Ok(Outcome::Postponed(format!("service unhealthy: {reason}")));
        }

        let initialized = cluster_initialized(view, &self.config.cluster_initialized_property())?;
        if initialized {
            if let Some(reason) = self.missing_from_cluster(view.local_node_id()).await? {
                warn!(%reason, "local node not in managed cluster");
                return Ok(Outcome::Postponed(reason));
            }
        }

        if !view.is_leader() {
            round.remember_members(view);
            return Ok(Outcome::completed());
        }

        if initialized {
            return Ok(self.retire_departed(view, round).await);
        }

        Ok(Outcome::completed())
    }

    /// Whether the managed service still lists `local` as a member.
    async fn missing_from_cluster(&self, local: &NodeId) -> Result<Option<String>> {
        let members = bounded(
            "list_members",
            self.config.timeouts.operation,
            self.controller.list_members(),
        )
        .await?;

        Ok((!members.contains(local))
            .then(|| format!("node {local} is not in the {} cluster", self.config.service)))
    }

    async fn finalize(&self, view: &StateView, carry: CarryForwardState) -> RoundResult {
        let mut round = Round::new(view, carry);
        self.stop_best_effort().await;
        round.carry.service_ready = false;
        round.finish(Outcome::completed())
    }

    async fn stop_best_effort(&self) {
        let timeouts = &self.config.timeouts;
        if let Err(e) = bounded(
            "stop",
            timeouts.operation + timeouts.stop_grace,
            self.controller.stop(timeouts.stop_grace),
        )
        .await
        {
            warn!(error = %e, "failed to stop service");
        }
    }

    /// Stop, tear down, and retract every node property this service
    /// published from this node. Always hands back an empty carry-forward.
    async fn destroy(&self, view: &StateView, carry: Option<CarryForwardState>) -> RoundResult {
        let local = view.local_node_id();
        let prefix = self.config.property_prefix();

        let mut owned = carry.map(|carry| carry.published).unwrap_or_default();
        owned.insert(self.config.node_ready_property());
        owned.extend(
            view.properties_owned_by(local)
                .map(|(name, _)| name)
                .filter(|name| name.starts_with(&prefix))
                .map(str::to_string),
        );

        let mut published = PropertyDelta::new();
        for name in owned {
            published.retract(PropertyKey::node(local.clone(), name));
        }

        self.stop_best_effort().await;

        let outcome = match bounded(
            "teardown",
            self.config.timeouts.operation,
            self.controller.teardown(),
        )
        .await
        {
            Ok(()) => Outcome::completed(),
            Err(e) => Outcome::Fatal(e),
        };

        StatusReporter::report_raw(outcome, published, Value::Object(Map::new()))
    }
}
