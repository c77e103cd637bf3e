//! Runs one reconciliation round for the provisioning host.
//!
//! Reads a plugin input document on stdin, drives the configured systemd
//! unit, and writes the plugin output document on stdout. Logs go to stderr.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod config;
mod error;

use error::Result;

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::Parser;
use serde_json::Value;
use swarm_plugin::{PluginInput, PluginOutput, handle};
use swarm_reconciler::Reconciler;
use swarm_state::NodeId;
use swarm_systemd::SystemdController;
use tracing::{Level, error, info};
use tracing_subscriber::FmtSubscriber;

use crate::config::FileConfig;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the service configuration file
    #[arg(long, env = "SWARM_CONFIG", default_value = "/etc/swarm/service.toml")]
    config: PathBuf,

    /// Read the input document from this file instead of stdin
    #[arg(long)]
    input: Option<PathBuf>,

    /// Maximum log level
    #[arg(long, env = "SWARM_LOG_LEVEL", default_value_t = Level::INFO)]
    log_level: Level,
}

fn read_input(args: &Args) -> Result<PluginInput> {
    let raw = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut raw = String::new();
            std::io::stdin().read_to_string(&mut raw)?;
            raw
        }
    };
    Ok(serde_json::from_str(&raw)?)
}

async fn run(args: &Args, input: PluginInput) -> Result<PluginOutput> {
    let config = FileConfig::load(&args.config)?;
    let node_id = NodeId::new(input.local_node_id.clone())?;
    let controller = SystemdController::new(config.systemd.clone(), node_id)?;
    let reconciler = Reconciler::new(controller, config.reconciler_config());

    info!(command = %input.command, service = %config.systemd.service, "handling command");
    Ok(handle(&reconciler, input).await)
}

/// Produce the output document for this invocation. Never fails: input that
/// cannot be read or parsed yields an error document with no local state.
async fn respond(args: &Args) -> PluginOutput {
    let input = match read_input(args) {
        Ok(input) => input,
        Err(e) => {
            error!(error = %e, "cannot read input document");
            return PluginOutput::error(&e.to_string(), Value::Null);
        }
    };
    let local_state = input.local_state.clone();

    match run(args, input).await {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, "cannot run round");
            PluginOutput::error(&e.to_string(), local_state)
        }
    }
}

fn write_output(output: &PluginOutput) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, output)?;
    stdout.write_all(b"\n")?;
    stdout.flush()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(args.log_level)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .finish(),
    )?;

    let output = respond(&args).await;
    write_output(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use std::path::Path;
    use swarm_reconciler::{Command, Status};

    #[test]
    fn test_read_input_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(
            &path,
            json!({"command": "health", "local_node_id": "n1", "state": {}}).to_string(),
        )
        .unwrap();

        let args = Args::parse_from(["swarm-reconcile", "--input", path.to_str().unwrap()]);
        let input = read_input(&args).unwrap();

        assert_eq!(input.command, Command::Health);
        assert_eq!(input.local_node_id, "n1");
        assert!(input.local_state.is_null());
    }

    #[tokio::test]
    async fn test_missing_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("missing.toml");
        let args = Args::parse_from(["swarm-reconcile", "--config", config.to_str().unwrap()]);
        let input: PluginInput =
            serde_json::from_value(json!({"command": "apply", "local_node_id": "n1"})).unwrap();

        let err = run(&args, input).await.unwrap_err();
        let output = PluginOutput::error(&err.to_string(), json!({"known_members": []}));

        assert!(matches!(err, Error::ConfigRead(..)));
        assert_eq!(output.status, Status::Error);
        assert_eq!(output.local_state, json!({"known_members": []}));
    }

    fn input_args(dir: &Path, body: &str) -> Args {
        let path = dir.join("input.json");
        std::fs::write(&path, body).unwrap();
        Args::parse_from(["swarm-reconcile", "--input", path.to_str().unwrap()])
    }

    #[tokio::test]
    async fn test_malformed_input_yields_error_output() {
        let dir = tempfile::tempdir().unwrap();
        let args = input_args(dir.path(), "{\"command\": ");

        let output = respond(&args).await;

        assert_eq!(output.status, Status::Error);
        assert!(output.local_state.is_null());
        assert!(output.error_message.is_some());
    }

    #[tokio::test]
    async fn test_unknown_command_yields_error_output() {
        let dir = tempfile::tempdir().unwrap();
        let body = json!({"command": "upgrade", "local_node_id": "n1", "local_state": {"version": 1}});
        let args = input_args(dir.path(), &body.to_string());

        let output = respond(&args).await;

        assert_eq!(output.status, Status::Error);
        assert!(output.local_state.is_null());
    }

    #[tokio::test]
    async fn test_missing_input_file_yields_error_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let args = Args::parse_from(["swarm-reconcile", "--input", path.to_str().unwrap()]);

        let output = respond(&args).await;

        assert_eq!(output.status, Status::Error);
        assert!(output.local_state.is_null());
    }
}
