//! Read-only view of swarm membership, leadership and published properties.
//!
//! This crate provides:
//! - Node identity types (`NodeId`, `Member`)
//! - The typed property model (`Property`, `PropertyKey`, `PropertyValue`, `PropertyDelta`)
//! - The per-round snapshot (`StateView`)
//! - The string wire format properties travel in between nodes
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod member;
mod node_id;
mod property;
mod view;
pub mod wire;

pub use error::Error;
pub use member::Member;
pub use node_id::NodeId;
pub use property::{Property, PropertyDelta, PropertyKey, PropertyScope, PropertyValue};
pub use view::{StateView, StateViewBuilder};
