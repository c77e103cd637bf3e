//! Configuration for [`crate::SystemdController`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// An external command run for one controller operation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct HookConfig {
    /// Program to run.
    pub program: String,

    /// Arguments. `{target}` is replaced by the targeted member's id.
    #[serde(default)]
    pub args: Vec<String>,

    /// Output (stdout or stderr) matching this pattern counts as success
    /// even on a non-zero exit, e.g. "already initialized".
    #[serde(default)]
    pub success_pattern: Option<String>,
}

/// Optional commands the controller delegates cluster operations to.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct Hooks {
    /// One-time preparation, such as installing packages.
    #[serde(default)]
    pub prepare: Option<HookConfig>,

    /// Forms the cluster. Receives the member ids in `SWARM_MEMBERS`.
    #[serde(default)]
    pub form_cluster: Option<HookConfig>,

    /// Prints one member id per line.
    #[serde(default)]
    pub list_members: Option<HookConfig>,

    /// Quiesces `SWARM_TARGET_NODE`.
    #[serde(default)]
    pub quiesce_member: Option<HookConfig>,

    /// Drains `SWARM_TARGET_NODE`.
    #[serde(default)]
    pub drain_member: Option<HookConfig>,

    /// Removes `SWARM_TARGET_NODE`.
    #[serde(default)]
    pub remove_member: Option<HookConfig>,
}

/// How a systemd-managed service is run on this node.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct SystemdConfig {
    /// Service name; prefixes published properties.
    pub service: String,

    /// Unit to start and stop.
    pub unit: String,

    /// Environment file the unit reads its configuration from.
    pub env_file: PathBuf,

    /// Directories removed on teardown.
    #[serde(default)]
    pub data_dirs: Vec<PathBuf>,

    /// Port probed for health, on the advertised address.
    #[serde(default)]
    pub health_port: Option<u16>,

    /// Static facts published once healthy.
    #[serde(default)]
    pub advertise: BTreeMap<String, String>,

    /// External commands.
    #[serde(default)]
    pub hooks: Hooks,
}
