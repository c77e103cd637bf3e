//! Local swarm simulation.
//!
//! This crate runs several reconcilers against one shared in-memory property
//! store and one shared mock service, so that membership changes, leader
//! changes and arbitrary round interleavings can be exercised in tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod cluster;
mod node;

pub use cluster::{ClusterBuilder, LocalCluster};
pub use node::ManagedNode;

// Re-export types from dependencies that users will need
pub use swarm_reconciler::{Command, JoinPolicy, ReconcilerConfig, RoundResult, Status};
pub use swarm_service_mock::{MockServiceController, Operation};
