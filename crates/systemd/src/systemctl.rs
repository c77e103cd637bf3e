//! Unit control through `systemctl`, off the async runtime.

use std::future::Future;
use std::process::ExitStatus;
use std::time::Duration;

use systemctl::SystemCtl;
use tokio::task::spawn_blocking;

use crate::error::{Error, Result};

fn check(action: &'static str, unit: &str, status: std::io::Result<ExitStatus>) -> Result<()> {
    let status = status.map_err(|source| Error::Systemctl {
        action,
        unit: unit.to_string(),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::UnitCommand {
            action,
            unit: unit.to_string(),
            status: status.to_string(),
        })
    }
}

/// Start the unit, or restart it when already active, so that it always
/// comes up with the current environment file.
pub async fn restart(unit: &str) -> Result<()> {
    let unit = unit.to_string();
    spawn_blocking(move || check("restart", &unit, SystemCtl::default().restart(&unit))).await?
}

/// Stop the unit, giving it at most `grace` to go down.
pub async fn stop(unit: &str, grace: Duration) -> Result<()> {
    let owned = unit.to_string();
    let stopping = async move {
        spawn_blocking(move || check("stop", &owned, SystemCtl::default().stop(&owned))).await?
    };
    within_grace(unit, grace, stopping).await
}

async fn within_grace<F>(unit: &str, grace: Duration, stopping: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tokio::time::timeout(grace, stopping)
        .await
        .map_err(|_| Error::StopTimeout {
            unit: unit.to_string(),
            grace,
        })?
}

/// Whether the unit is active. Any failure to ask counts as inactive.
pub async fn is_active(unit: &str) -> bool {
    let unit = unit.to_string();
    spawn_blocking(move || SystemCtl::default().is_active(&unit).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_service::{ServiceError, ServiceErrorKind};

    #[tokio::test]
    async fn test_stop_is_bounded_by_grace() {
        let err = within_grace(
            "redis-server.service",
            Duration::from_millis(20),
            std::future::pending(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::StopTimeout { ref unit, .. } if unit == "redis-server.service"));
        assert_eq!(err.kind(), ServiceErrorKind::Transient);
    }

    #[tokio::test]
    async fn test_stop_within_grace_passes_result_through() {
        within_grace("redis-server.service", Duration::from_secs(5), async { Ok(()) })
            .await
            .unwrap();

        let err = within_grace("redis-server.service", Duration::from_secs(5), async {
            Err(Error::MissingHook("stop"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::MissingHook("stop")));
    }
}
