//! A [`ServiceController`] for services run as systemd units.
//!
//! Configuration is written to an environment file the unit reads, health is
//! a TCP connect to the advertised address, and cluster operations are
//! delegated to configurable external commands.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod env_file;
mod error;
mod hook;
mod systemctl;

pub use config::{HookConfig, Hooks, SystemdConfig};
pub use env_file::FINGERPRINT_VAR;
pub use error::{Error, Result};
pub use hook::Hook;

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use swarm_service::{Health, ServiceConfig, ServiceController};
use swarm_state::{Member, NodeId, PropertyValue};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Bound on a single health probe connect.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Parameter holding the address the instance listens on.
const ADVERTISE_ADDRESS_PARAM: &str = "advertise_address";

#[derive(Clone, Debug)]
struct CompiledHooks {
    prepare: Option<Hook>,
    form_cluster: Option<Hook>,
    list_members: Option<Hook>,
    quiesce_member: Option<Hook>,
    drain_member: Option<Hook>,
    remove_member: Option<Hook>,
}

impl CompiledHooks {
    fn new(hooks: &Hooks) -> Result<Self> {
        let compile = |hook: &Option<HookConfig>| hook.as_ref().map(Hook::new).transpose();
        Ok(Self {
            prepare: compile(&hooks.prepare)?,
            form_cluster: compile(&hooks.form_cluster)?,
            list_members: compile(&hooks.list_members)?,
            quiesce_member: compile(&hooks.quiesce_member)?,
            drain_member: compile(&hooks.drain_member)?,
            remove_member: compile(&hooks.remove_member)?,
        })
    }
}

/// Controller for a systemd unit.
#[derive(Debug)]
pub struct SystemdController {
    config: SystemdConfig,
    current: RwLock<Option<ServiceConfig>>,
    hooks: CompiledHooks,
    node_id: NodeId,
}

impl SystemdController {
    /// Create a controller for `node_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if a hook's success pattern does not compile.
    pub fn new(config: SystemdConfig, node_id: NodeId) -> Result<Self> {
        Ok(Self {
            hooks: CompiledHooks::new(&config.hooks)?,
            config,
            current: RwLock::new(None),
            node_id,
        })
    }

    fn env(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("SWARM_SERVICE", self.config.service.clone()),
            ("SWARM_NODE_ID", self.node_id.to_string()),
            ("SWARM_ENV_FILE", self.config.env_file.display().to_string()),
        ])
    }

    async fn run_member_hook(&self, hook: Option<&Hook>, id: &NodeId) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };

        let mut env = self.env();
        env.insert("SWARM_TARGET_NODE", id.to_string());
        hook.run(&env, Some(id.as_str())).await.map(drop)
    }

    /// Address the instance listens on: from the configuration written this
    /// process, else from the environment file, else loopback.
    async fn probe_host(&self) -> String {
        if let Some(config) = self.current.read().await.as_ref() {
            if let Some(address) = config.get(ADVERTISE_ADDRESS_PARAM) {
                return address.to_string();
            }
        }

        let variable = format!("SWARM_{}=", ADVERTISE_ADDRESS_PARAM.to_ascii_uppercase());
        tokio::fs::read_to_string(&self.config.env_file)
            .await
            .ok()
            .and_then(|contents| {
                contents
                    .lines()
                    .find_map(|line| line.strip_prefix(&variable))
                    .map(|value| value.trim_matches('"').to_string())
            })
            .unwrap_or_else(|| "127.0.0.1".to_string())
    }
}

fn socket_address(host: &str, port: u16) -> String {
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V6(ip)) => format!("[{ip}]:{port}"),
        _ => format!("{host}:{port}"),
    }
}

#[async_trait]
impl ServiceController for SystemdController {
    type Error = Error;

    fn name(&self) -> &str {
        &self.config.service
    }

    async fn prepare(&self) -> Result<()> {
        match &self.hooks.prepare {
            Some(hook) => hook.run(&self.env(), None).await.map(drop),
            None => Ok(()),
        }
    }

    async fn configure(&self, config: &ServiceConfig) -> Result<()> {
        info!(path = %self.config.env_file.display(), "writing environment file");
        env_file::write_atomic(&self.config.env_file, &env_file::render(config)).await?;
        *self.current.write().await = Some(config.clone());
        Ok(())
    }

    async fn is_running(&self) -> bool {
        systemctl::is_active(&self.config.unit).await
    }

    async fn start(&self) -> Result<()> {
        info!(unit = %self.config.unit, "starting unit");
        systemctl::restart(&self.config.unit).await
    }

    async fn stop(&self, grace_period: Duration) -> Result<()> {
        info!(unit = %self.config.unit, grace = ?grace_period, "stopping unit");
        systemctl::stop(&self.config.unit, grace_period).await
    }

    async fn probe_healthy(&self) -> Health {
        if !systemctl::is_active(&self.config.unit).await {
            return Health::Unhealthy(format!("{} is not active", self.config.unit));
        }

        let Some(port) = self.config.health_port else {
            return Health::Healthy;
        };

        let address = socket_address(&self.probe_host().await, port);
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(&address)).await {
            Ok(Ok(_)) => Health::Healthy,
            Ok(Err(e)) => Health::Unhealthy(format!("cannot connect to {address}: {e}")),
            Err(_) => Health::Unhealthy(format!("connect to {address} timed out")),
        }
    }

    async fn form_cluster(&self, members: &[Member]) -> Result<()> {
        let Some(hook) = &self.hooks.form_cluster else {
            debug!("no form_cluster hook, cluster forms on start");
            return Ok(());
        };

        let ids: Vec<&str> = members.iter().map(|member| member.id().as_str()).collect();
        let mut env = self.env();
        env.insert("SWARM_MEMBERS", ids.join(","));
        hook.run(&env, None).await.map(drop)
    }

    /// Without a `list_members` hook the service has no membership model of
    /// its own and only ever lists the local node.
    async fn list_members(&self) -> Result<Vec<NodeId>> {
        let Some(hook) = &self.hooks.list_members else {
            return Ok(vec![self.node_id.clone()]);
        };

        let stdout = hook.run(&self.env(), None).await?;
        Ok(stdout
            .lines()
            .filter_map(|line| NodeId::new(line.trim()).ok())
            .collect())
    }

    async fn quiesce_member(&self, id: &NodeId) -> Result<()> {
        self.run_member_hook(self.hooks.quiesce_member.as_ref(), id).await
    }

    async fn drain_member(&self, id: &NodeId) -> Result<()> {
        self.run_member_hook(self.hooks.drain_member.as_ref(), id).await
    }

    async fn remove_member(&self, id: &NodeId) -> Result<()> {
        let hook = self
            .hooks
            .remove_member
            .as_ref()
            .ok_or(Error::MissingHook("remove_member"))?;
        self.run_member_hook(Some(hook), id).await
    }

    async fn teardown(&self) -> Result<()> {
        let env_file = &self.config.env_file;
        match tokio::fs::remove_file(env_file).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(Error::Io(env_file.clone(), e));
            }
            _ => {}
        }

        for dir in &self.config.data_dirs {
            match tokio::fs::remove_dir_all(dir).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                    warn!(path = %dir.display(), error = %e, "failed to remove data directory");
                    return Err(Error::Io(dir.clone(), e));
                }
                _ => {}
            }
        }

        *self.current.write().await = None;
        Ok(())
    }

    fn advertised_properties(&self, config: &ServiceConfig) -> Vec<(String, PropertyValue)> {
        let mut properties: Vec<(String, PropertyValue)> = self
            .config
            .advertise
            .iter()
            .map(|(name, value)| (name.clone(), PropertyValue::decode(value)))
            .collect();

        if let (Some(port), Some(address)) =
            (self.config.health_port, config.get(ADVERTISE_ADDRESS_PARAM))
        {
            properties.push((
                "endpoint".to_string(),
                PropertyValue::Text(socket_address(address, port)),
            ));
        }

        properties
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(dir: &Path, hooks: Hooks) -> SystemdConfig {
        SystemdConfig {
            service: "redis".to_string(),
            unit: "swarm-test-nonexistent.service".to_string(),
            env_file: dir.join("redis.env"),
            data_dirs: vec![dir.join("data")],
            health_port: Some(6379),
            advertise: [("port".to_string(), "6379".to_string())].into(),
            hooks,
        }
    }

    fn sh(script: &str) -> Option<HookConfig> {
        Some(HookConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            success_pattern: None,
        })
    }

    #[tokio::test]
    async fn test_configure_and_teardown() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("data/db")).unwrap();
        let controller =
            SystemdController::new(config(dir.path(), Hooks::default()), NodeId::from("n1")).unwrap();

        let desired = ServiceConfig::new().with_param("advertise_address", "10.0.0.7");
        controller.configure(&desired).await.unwrap();

        let written = std::fs::read_to_string(dir.path().join("redis.env")).unwrap();
        assert!(written.contains("SWARM_ADVERTISE_ADDRESS=\"10.0.0.7\""));
        assert_eq!(controller.probe_host().await, "10.0.0.7");

        controller.teardown().await.unwrap();
        assert!(!dir.path().join("redis.env").exists());
        assert!(!dir.path().join("data").exists());

        // Idempotent.
        controller.teardown().await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_host_falls_back_to_env_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("redis.env"),
            "SWARM_ADVERTISE_ADDRESS=\"10.0.0.9\"\n",
        )
        .unwrap();
        let controller =
            SystemdController::new(config(dir.path(), Hooks::default()), NodeId::from("n1")).unwrap();

        assert_eq!(controller.probe_host().await, "10.0.0.9");
    }

    #[tokio::test]
    async fn test_list_members_hook() {
        let dir = tempfile::tempdir().unwrap();
        let hooks = Hooks {
            list_members: sh("printf 'n1\\n\\n n2 \\n'"),
            ..Hooks::default()
        };
        let controller = SystemdController::new(config(dir.path(), hooks), NodeId::from("n1")).unwrap();

        assert_eq!(
            controller.list_members().await.unwrap(),
            vec![NodeId::from("n1"), NodeId::from("n2")]
        );
    }

    #[tokio::test]
    async fn test_without_hooks() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            SystemdController::new(config(dir.path(), Hooks::default()), NodeId::from("n1")).unwrap();

        controller.form_cluster(&[Member::new("n1")]).await.unwrap();
        controller.drain_member(&NodeId::from("n2")).await.unwrap();
        assert_eq!(controller.list_members().await.unwrap(), vec![NodeId::from("n1")]);
        assert!(matches!(
            controller.remove_member(&NodeId::from("n2")).await,
            Err(Error::MissingHook("remove_member"))
        ));
    }

    #[tokio::test]
    async fn test_member_hooks_receive_target() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("removed");
        let hooks = Hooks {
            remove_member: sh(&format!(
                "echo \"$SWARM_TARGET_NODE by $SWARM_NODE_ID\" > {}",
                marker.display()
            )),
            ..Hooks::default()
        };
        let controller = SystemdController::new(config(dir.path(), hooks), NodeId::from("n1")).unwrap();

        controller.remove_member(&NodeId::from("n2")).await.unwrap();
        assert_eq!(std::fs::read_to_string(marker).unwrap().trim(), "n2 by n1");
    }

    #[test]
    fn test_advertised_properties() {
        let dir = tempfile::tempdir().unwrap();
        let controller =
            SystemdController::new(config(dir.path(), Hooks::default()), NodeId::from("n1")).unwrap();
        let desired = ServiceConfig::new().with_param("advertise_address", "fd00::7");

        assert_eq!(
            controller.advertised_properties(&desired),
            vec![
                ("port".to_string(), PropertyValue::Integer(6379)),
                (
                    "endpoint".to_string(),
                    PropertyValue::Text("[fd00::7]:6379".to_string())
                ),
            ]
        );
    }

    #[test]
    fn test_config_from_toml() {
        let config: SystemdConfig = toml::from_str(
            r#"
            service = "cockroachdb"
            unit = "cockroachdb.service"
            env_file = "/etc/cockroachdb/swarm.env"
            health_port = 26257

            [hooks.form_cluster]
            program = "cockroach"
            args = ["init", "--insecure"]
            success_pattern = "already been initialized"
            "#,
        )
        .unwrap();

        assert_eq!(config.hooks.form_cluster.unwrap().args, vec!["init", "--insecure"]);
        assert!(config.hooks.list_members.is_none());
        assert!(config.data_dirs.is_empty());
    }
}
