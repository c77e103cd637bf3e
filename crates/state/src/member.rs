use serde::{Deserialize, Serialize};

use crate::NodeId;

/// A node the external membership source intends to be part of the cluster.
///
/// The engine only observes members; it never creates or destroys them.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Member {
    id: NodeId,
    declared_address: Option<String>,
}

impl Member {
    /// Create a member without a declared address.
    #[must_use]
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            declared_address: None,
        }
    }

    /// Attach the address declared by the membership source.
    #[must_use]
    pub fn with_declared_address(mut self, address: impl Into<String>) -> Self {
        self.declared_address = Some(address.into());
        self
    }

    /// The member's id.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// The address declared by the membership source, if any.
    #[must_use]
    pub fn declared_address(&self) -> Option<&str> {
        self.declared_address.as_deref()
    }
}
