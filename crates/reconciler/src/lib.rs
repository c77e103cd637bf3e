//! Per-node reconciliation of a managed service against the swarm's desired
//! state.
//!
//! One call to [`Reconciler::run`] is one round: it reads a [`StateView`],
//! drives the local [`ServiceController`], and produces a [`RoundResult`]
//! holding the status, the properties to publish and the state to hand to
//! the next round. The leader additionally forms the managed cluster once
//! and retires members that left the swarm.
//!
//! [`StateView`]: swarm_state::StateView
//! [`ServiceController`]: swarm_service::ServiceController
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod bootstrap;
mod carry_forward;
mod command;
mod config;
mod desired_config;
mod engine;
mod error;
mod membership;
mod poll;
mod readiness;
mod status;

pub use bootstrap::{BootstrapPhase, ClusterBootstrapper, cluster_initialized};
pub use carry_forward::{CARRY_FORWARD_VERSION, CarryForwardState};
pub use command::{Command, UnknownCommand};
pub use config::{DEFAULT_ADDRESS_PROPERTY, JoinPolicy, ReconcilerConfig, Timeouts};
pub use desired_config::{
    PARAM_ADVERTISE_ADDRESS, PARAM_NODE_ID, PARAM_PEER_COUNT, PARAM_PEERS, PARAM_SERVICE_VERSION,
    desired_config,
};
pub use engine::Reconciler;
pub use error::{Classification, Error, Result};
pub use membership::{
    Attempt, MembershipReconciler, MembershipReport, Required, RetirementPlan, Step,
};
pub use poll::{PollExpired, bounded, bounded_infallible, poll_until};
pub use readiness::{NotReady, Readiness, ReadinessGate, Requirement};
pub use status::{MAX_MESSAGE_LEN, Outcome, RoundResult, Status, StatusReporter, single_line};
