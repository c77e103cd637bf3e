//! Reconciler configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default name of the address every member publishes before anything starts.
pub const DEFAULT_ADDRESS_PROPERTY: &str = "tunnel_ip";

/// How followers join the managed cluster.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JoinPolicy {
    /// Every member starts its instance; the leader forms the cluster once
    /// all of them are ready.
    #[default]
    Concurrent,

    /// Only the leader starts first; followers wait until the cluster is
    /// initialized and the leader is ready.
    AfterBootstrap,
}

/// Bounds for controller calls and polls.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timeouts {
    /// Bound on every single controller call.
    pub operation: Duration,
    /// Bound on `prepare` during `init`.
    pub prepare: Duration,
    /// How long to wait for the local instance to become healthy.
    pub ready: Duration,
    /// How long to wait for formation to show up in the member list.
    pub verify: Duration,
    /// Interval between poll attempts.
    pub poll_interval: Duration,
    /// Grace period handed to `stop`.
    pub stop_grace: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            operation: Duration::from_secs(30),
            prepare: Duration::from_secs(600),
            ready: Duration::from_secs(60),
            verify: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
            stop_grace: Duration::from_secs(10),
        }
    }
}

/// Configuration for a reconciler.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Service name. Prefixes every property the reconciler publishes.
    pub service: String,

    /// Node property holding each member's address.
    pub address_property: String,

    /// Node properties every member must publish before anything happens.
    pub dependency_properties: Vec<String>,

    /// Fewest members the swarm must have before the service is configured.
    pub min_members: usize,

    /// How followers join.
    pub join_policy: JoinPolicy,

    /// Version of the managed service, part of the desired configuration.
    pub service_version: Option<String>,

    /// Static parameters merged into the desired configuration.
    pub params: BTreeMap<String, String>,

    /// Call and poll bounds.
    pub timeouts: Timeouts,
}

impl ReconcilerConfig {
    /// Configuration with defaults for `service`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            address_property: DEFAULT_ADDRESS_PROPERTY.to_string(),
            dependency_properties: vec![DEFAULT_ADDRESS_PROPERTY.to_string()],
            min_members: 1,
            join_policy: JoinPolicy::default(),
            service_version: None,
            params: BTreeMap::new(),
            timeouts: Timeouts::default(),
        }
    }

    /// Name of the flag a node publishes once its instance is healthy.
    #[must_use]
    pub fn node_ready_property(&self) -> String {
        format!("{}_node_ready", self.service)
    }

    /// Name of the cluster flag published once formation is verified.
    #[must_use]
    pub fn cluster_initialized_property(&self) -> String {
        format!("{}_cluster_initialized", self.service)
    }

    /// Name under which an advertised fact is published.
    #[must_use]
    pub fn scoped_property(&self, name: &str) -> String {
        let prefix = self.property_prefix();
        if name.starts_with(&prefix) {
            name.to_string()
        } else {
            format!("{prefix}{name}")
        }
    }

    /// Prefix shared by every node property this service owns.
    #[must_use]
    pub fn property_prefix(&self) -> String {
        format!("{}_", self.service)
    }
}
