//! Bounded controller calls and time-boxed polls.

use std::future::Future;
use std::time::Duration;

use swarm_service::ServiceError;
use tokio::time::{Instant, sleep, timeout, timeout_at};

use crate::error::{Error, Result};

/// Run a fallible controller call under `limit`.
pub async fn bounded<T, E, F>(operation: &'static str, limit: Duration, call: F) -> Result<T>
where
    E: ServiceError,
    F: Future<Output = Result<T, E>>,
{
    match timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(Error::service(operation, &e)),
        Err(_) => Err(Error::Timeout {
            operation,
            after: limit,
        }),
    }
}

/// Run an infallible controller call under `limit`.
pub async fn bounded_infallible<T, F>(operation: &'static str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = T>,
{
    timeout(limit, call).await.map_err(|_| Error::Timeout {
        operation,
        after: limit,
    })
}

/// Why a poll gave up.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollExpired {
    /// How long the poll ran.
    pub after: Duration,

    /// The failure reported by the last attempt.
    pub last: Option<String>,
}

impl std::fmt::Display for PollExpired {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.last {
            Some(last) => write!(f, "gave up after {}s: {last}", self.after.as_secs()),
            None => write!(f, "gave up after {}s", self.after.as_secs()),
        }
    }
}

/// Call `attempt` every `interval` until it succeeds or `limit` runs out.
///
/// Each attempt is cut off at the deadline. Attempts report failure with a
/// human readable reason.
pub async fn poll_until<T, F, Fut>(
    limit: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<T, PollExpired>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let deadline = Instant::now() + limit;
    let mut last = None;

    loop {
        match timeout_at(deadline, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(reason)) => last = Some(reason),
            Err(_) => break,
        }

        if Instant::now() + interval > deadline {
            break;
        }
        sleep(interval).await;
    }

    Err(PollExpired { after: limit, last })
}
