//! The configuration a node's instance should run with, derived from the view.

use swarm_service::ServiceConfig;
use swarm_state::{NodeId, StateView};

use crate::config::ReconcilerConfig;
use crate::error::{Error, Result};

/// Parameter: the local node's id.
pub const PARAM_NODE_ID: &str = "node_id";
/// Parameter: the address the local instance advertises.
pub const PARAM_ADVERTISE_ADDRESS: &str = "advertise_address";
/// Parameter: comma-separated, sorted peer addresses.
pub const PARAM_PEERS: &str = "peers";
/// Parameter: number of peers.
pub const PARAM_PEER_COUNT: &str = "peer_count";
/// Parameter: configured service version.
pub const PARAM_SERVICE_VERSION: &str = "service_version";

/// Address of `id`: its published address property, else its declared one.
fn member_address(view: &StateView, config: &ReconcilerConfig, id: &NodeId) -> Option<String> {
    view.node_property(id, &config.address_property)
        .map(|value| value.as_text().into_owned())
        .filter(|address| !address.is_empty())
        .or_else(|| {
            view.member(id)
                .and_then(|member| member.declared_address())
                .map(str::to_string)
        })
}

/// Compute the desired configuration for the local node.
///
/// Leadership is left out so that a leader change alone never restarts an
/// instance.
///
/// # Errors
///
/// Returns [`Error::MissingAddress`] if the local node has no address.
pub fn desired_config(view: &StateView, config: &ReconcilerConfig) -> Result<ServiceConfig> {
    let local = view.local_node_id();
    let advertise = member_address(view, config, local)
        .ok_or_else(|| Error::MissingAddress(local.clone()))?;

    let mut peers: Vec<String> = view
        .members()
        .filter(|member| member.id() != local)
        .filter_map(|member| member_address(view, config, member.id()))
        .collect();
    peers.sort();
    peers.dedup();

    let mut desired = ServiceConfig::new();
    for (key, value) in &config.params {
        desired.insert(key.clone(), value.clone());
    }
    if let Some(version) = &config.service_version {
        desired.insert(PARAM_SERVICE_VERSION, version.clone());
    }
    desired.insert(PARAM_NODE_ID, local.as_str());
    desired.insert(PARAM_ADVERTISE_ADDRESS, advertise);
    desired.insert(PARAM_PEER_COUNT, peers.len().to_string());
    desired.insert(PARAM_PEERS, peers.join(","));

    Ok(desired)
}
