//! Node ID type for swarm members

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Opaque identifier of a swarm member, as assigned by the membership source.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node id, rejecting empty strings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyNodeId`] if `id` is empty or whitespace.
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(Error::EmptyNodeId);
        }
        Ok(Self(id))
    }

    /// Borrow the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty() {
        assert_eq!(NodeId::new("  "), Err(Error::EmptyNodeId));
        assert_eq!(NodeId::new("node-a").unwrap().as_str(), "node-a");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let id = NodeId::from("node-a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"node-a\"");
    }
}
