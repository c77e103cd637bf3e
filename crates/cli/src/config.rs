//! The configuration file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use swarm_reconciler::{DEFAULT_ADDRESS_PROPERTY, JoinPolicy, ReconcilerConfig, Timeouts};
use swarm_systemd::SystemdConfig;

use crate::error::{Error, Result};

/// Call and poll bounds, in whole seconds unless noted.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutSection {
    pub operation_secs: u64,
    pub prepare_secs: u64,
    pub ready_secs: u64,
    pub verify_secs: u64,
    pub poll_interval_ms: u64,
    pub stop_grace_secs: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            operation_secs: defaults.operation.as_secs(),
            prepare_secs: defaults.prepare.as_secs(),
            ready_secs: defaults.ready.as_secs(),
            verify_secs: defaults.verify.as_secs(),
            poll_interval_ms: u64::try_from(defaults.poll_interval.as_millis()).unwrap_or(2000),
            stop_grace_secs: defaults.stop_grace.as_secs(),
        }
    }
}

impl From<TimeoutSection> for Timeouts {
    fn from(section: TimeoutSection) -> Self {
        Self {
            operation: Duration::from_secs(section.operation_secs),
            prepare: Duration::from_secs(section.prepare_secs),
            ready: Duration::from_secs(section.ready_secs),
            verify: Duration::from_secs(section.verify_secs),
            poll_interval: Duration::from_millis(section.poll_interval_ms),
            stop_grace: Duration::from_secs(section.stop_grace_secs),
        }
    }
}

/// The `[reconciler]` table.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcilerSection {
    pub address_property: String,
    pub dependency_properties: Option<Vec<String>>,
    pub min_members: usize,
    pub join_policy: JoinPolicy,
    pub service_version: Option<String>,
    pub params: BTreeMap<String, String>,
    pub timeouts: TimeoutSection,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            address_property: DEFAULT_ADDRESS_PROPERTY.to_string(),
            dependency_properties: None,
            min_members: 1,
            join_policy: JoinPolicy::default(),
            service_version: None,
            params: BTreeMap::new(),
            timeouts: TimeoutSection::default(),
        }
    }
}

/// Whole configuration file.
#[derive(Clone, Debug, Deserialize)]
pub struct FileConfig {
    /// Reconciliation settings.
    #[serde(default)]
    pub reconciler: ReconcilerSection,

    /// The managed unit.
    pub systemd: SystemdConfig,
}

impl FileConfig {
    /// Load and parse `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::ConfigRead(path.to_path_buf(), e))?;
        Ok(toml::from_str(&contents)?)
    }

    /// Reconciler configuration; the service name comes from `[systemd]`.
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let section = self.reconciler.clone();
        let mut config = ReconcilerConfig::new(self.systemd.service.clone());
        config.dependency_properties = section
            .dependency_properties
            .unwrap_or_else(|| vec![section.address_property.clone()]);
        config.address_property = section.address_property;
        config.min_members = section.min_members;
        config.join_policy = section.join_policy;
        config.service_version = section.service_version;
        config.params = section.params;
        config.timeouts = section.timeouts.into();
        config
    }
}
