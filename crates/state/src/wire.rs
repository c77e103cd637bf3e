//! String wire format for properties.
//!
//! `(scope, [owner_node_id], name) -> string`. A missing value and a missing
//! key mean the same thing; there is no tombstone type.

use serde::{Deserialize, Serialize};

use crate::{Error, NodeId, Property, PropertyDelta, PropertyKey, PropertyScope, PropertyValue};

/// Scope tag used on the wire.
pub const SCOPE_NODE: &str = "node";

/// Scope tag used on the wire.
pub const SCOPE_CLUSTER: &str = "cluster";

/// A property as it travels between nodes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct WireProperty {
    /// `node` or `cluster`.
    pub scope: String,

    /// Owner, for node-scoped properties only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_node_id: Option<String>,

    /// Property name.
    pub name: String,

    /// String value; `None` retracts the key.
    #[serde(default)]
    pub value: Option<String>,
}

impl From<Property> for WireProperty {
    fn from(property: Property) -> Self {
        let (scope, owner_node_id) = match property.key.scope() {
            PropertyScope::Cluster => (SCOPE_CLUSTER, None),
            PropertyScope::Node(owner) => (SCOPE_NODE, Some(owner.to_string())),
        };

        Self {
            scope: scope.to_string(),
            owner_node_id,
            name: property.key.name().to_string(),
            value: property.value.map(|value| value.encode()),
        }
    }
}

impl TryFrom<WireProperty> for Property {
    type Error = Error;

    fn try_from(wire: WireProperty) -> Result<Self, Self::Error> {
        let key = match (wire.scope.as_str(), wire.owner_node_id) {
            (SCOPE_CLUSTER, None) => PropertyKey::cluster(wire.name),
            (SCOPE_CLUSTER, Some(_)) => return Err(Error::UnexpectedOwner(wire.name)),
            (SCOPE_NODE, Some(owner)) => PropertyKey::node(NodeId::new(owner)?, wire.name),
            (SCOPE_NODE, None) => return Err(Error::MissingOwner(wire.name)),
            (other, _) => return Err(Error::UnknownScope(other.to_string())),
        };

        Ok(Self {
            key,
            value: wire.value.as_deref().map(PropertyValue::decode),
        })
    }
}

/// Encode every write of a delta.
#[must_use]
pub fn encode_delta(delta: PropertyDelta) -> Vec<WireProperty> {
    delta
        .into_properties()
        .into_iter()
        .map(WireProperty::from)
        .collect()
}

/// Decode a list of wire properties into a delta.
///
/// # Errors
///
/// Returns the first malformed entry's error.
pub fn decode_delta(wire: Vec<WireProperty>) -> Result<PropertyDelta, Error> {
    wire.into_iter().map(Property::try_from).collect()
}
