//! Environment file rendering.

use std::fmt::Write;
use std::path::Path;

use swarm_service::ServiceConfig;

use crate::error::{Error, Result};

/// Variable holding the configuration fingerprint.
pub const FINGERPRINT_VAR: &str = "SWARM_CONFIG_FINGERPRINT";

fn variable_name(key: &str) -> String {
    let mut name = String::from("SWARM_");
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

/// Render `config` in systemd `EnvironmentFile=` syntax.
#[must_use]
pub fn render(config: &ServiceConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{FINGERPRINT_VAR}={}", config.fingerprint());
    for (key, value) in config.params() {
        let _ = writeln!(out, "{}={}", variable_name(key), quote(value));
    }
    out
}

/// Write `contents` to `path` through a temporary file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::Io(parent.to_path_buf(), e))?;
    }

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| Error::Io(tmp.clone(), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Io(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        let config = ServiceConfig::new()
            .with_param("node_id", "n1")
            .with_param("peers", "10.0.0.1,10.0.0.2")
            .with_param("motd", "say \"hi\"");

        let rendered = render(&config);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], format!("{FINGERPRINT_VAR}={}", config.fingerprint()));
        assert_eq!(
            &lines[1..],
            [
                "SWARM_MOTD=\"say \\\"hi\\\"\"",
                "SWARM_NODE_ID=\"n1\"",
                "SWARM_PEERS=\"10.0.0.1,10.0.0.2\"",
            ]
        );
    }

    #[tokio::test]
    async fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc/redis/swarm.env");

        write_atomic(&path, "A=1\n").await.unwrap();
        write_atomic(&path, "A=2\n").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A=2\n");
        assert!(!path.with_extension("tmp").exists());
    }
}
