//! Abstract interface for managed services driven by the reconciler.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;
mod error;
mod health;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceErrorKind};
pub use health::Health;

use std::time::Duration;

use async_trait::async_trait;
use swarm_state::{Member, NodeId, PropertyValue};

/// Capability interface through which the reconciler drives one concrete
/// managed service on the local node.
///
/// Every method may block for a long time; callers bound each call with
/// their own timeout. Implementations must make `form_cluster` and
/// `remove_member` idempotent: a repeated call after partial success has to
/// succeed (or fail retryably) without corrupting the service's own
/// membership model.
#[async_trait]
pub trait ServiceController
where
    Self: Send + Sync + 'static,
{
    /// The error type for this controller.
    type Error: ServiceError;

    /// Name of the managed service; prefixes every property it publishes.
    fn name(&self) -> &str;

    /// One-time local preparation (installing binaries, creating directories).
    async fn prepare(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Write the service configuration. Must not restart the service.
    async fn configure(&self, config: &ServiceConfig) -> Result<(), Self::Error>;

    /// Whether the local instance is currently running.
    async fn is_running(&self) -> bool;

    /// Start the local instance.
    async fn start(&self) -> Result<(), Self::Error>;

    /// Stop the local instance, allowing `grace_period` for a clean exit.
    async fn stop(&self, grace_period: Duration) -> Result<(), Self::Error>;

    /// Probe the local instance.
    async fn probe_healthy(&self) -> Health;

    /// Form the cluster out of `members`. Only ever called on the leader.
    async fn form_cluster(&self, members: &[Member]) -> Result<(), Self::Error>;

    /// Members according to the managed service's own membership model.
    async fn list_members(&self) -> Result<Vec<NodeId>, Self::Error>;

    /// Stop new work landing on a departing member.
    async fn quiesce_member(&self, _id: &NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Move existing work off a departing member.
    async fn drain_member(&self, _id: &NodeId) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Remove a departed member from the managed service's membership.
    async fn remove_member(&self, id: &NodeId) -> Result<(), Self::Error>;

    /// Remove local configuration and data.
    async fn teardown(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Extra node facts to publish once the local instance is healthy.
    fn advertised_properties(&self, _config: &ServiceConfig) -> Vec<(String, PropertyValue)> {
        Vec::new()
    }
}
