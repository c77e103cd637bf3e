//! Running external commands for cluster operations.

use std::collections::HashMap;
use std::process::Stdio;

use regex::Regex;
use tokio::process::Command;
use tracing::debug;

use crate::config::HookConfig;
use crate::error::{Error, Result};

/// A hook ready to run.
#[derive(Clone, Debug)]
pub struct Hook {
    program: String,
    args: Vec<String>,
    success_pattern: Option<Regex>,
}

impl Hook {
    /// Compile a hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if the success pattern does not compile.
    pub fn new(config: &HookConfig) -> Result<Self> {
        Ok(Self {
            program: config.program.clone(),
            args: config.args.clone(),
            success_pattern: config
                .success_pattern
                .as_deref()
                .map(Regex::new)
                .transpose()?,
        })
    }

    /// Run with `env`, substituting `target` into the arguments. Returns stdout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Spawn`] if the program cannot start and
    /// [`Error::Exit`] if it fails without matching the success pattern.
    pub async fn run(&self, env: &HashMap<&str, String>, target: Option<&str>) -> Result<String> {
        let args = self.args.iter().map(|arg| match target {
            Some(target) => arg.replace("{target}", target),
            None => arg.clone(),
        });

        debug!(program = %self.program, "running hook");
        let output = Command::new(&self.program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (*k, v.as_str())))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            return Ok(stdout);
        }

        if let Some(pattern) = &self.success_pattern {
            if pattern.is_match(&stdout) || pattern.is_match(&stderr) {
                debug!(program = %self.program, "non-zero exit accepted by success pattern");
                return Ok(stdout);
            }
        }

        Err(Error::Exit {
            program: self.program.clone(),
            status: output.status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}
