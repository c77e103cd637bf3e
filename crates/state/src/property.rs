//! Typed property model.
//!
//! Properties cross node boundaries as plain strings; inside the engine they
//! are a tagged union so that flags and numbers are never compared as text.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

use crate::NodeId;

/// Where a property lives.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PropertyScope {
    /// Shared by the whole cluster; has no owner.
    Cluster,

    /// Published by, and owned by, a single node.
    Node(NodeId),
}

impl PropertyScope {
    /// The owning node for node-scoped properties.
    #[must_use]
    pub const fn owner(&self) -> Option<&NodeId> {
        match self {
            Self::Cluster => None,
            Self::Node(owner) => Some(owner),
        }
    }
}

/// Identity of a property: last-write-wins applies per key.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PropertyKey {
    scope: PropertyScope,
    name: String,
}

impl PropertyKey {
    /// Key of a node-scoped property.
    pub fn node(owner: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            scope: PropertyScope::Node(owner.into()),
            name: name.into(),
        }
    }

    /// Key of a cluster-scoped property.
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            scope: PropertyScope::Cluster,
            name: name.into(),
        }
    }

    /// The scope of the key.
    #[must_use]
    pub const fn scope(&self) -> &PropertyScope {
        &self.scope
    }

    /// The property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning node, if node-scoped.
    #[must_use]
    pub const fn owner(&self) -> Option<&NodeId> {
        self.scope.owner()
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            PropertyScope::Cluster => write!(f, "cluster/{}", self.name),
            PropertyScope::Node(owner) => write!(f, "node/{owner}/{}", self.name),
        }
    }
}

/// A typed property value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PropertyValue {
    /// Boolean, encoded as `"true"` / `"false"`.
    Flag(bool),

    /// Signed integer, encoded in decimal.
    Integer(i64),

    /// Anything else.
    Text(String),
}

impl PropertyValue {
    /// Decode a wire string, inferring the variant.
    ///
    /// Only canonical decimal integers become [`PropertyValue::Integer`], so
    /// `decode(raw).encode() == raw` holds for every input.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        match raw {
            "true" => Self::Flag(true),
            "false" => Self::Flag(false),
            _ => match raw.parse::<i64>() {
                Ok(value) if value.to_string() == raw => Self::Integer(value),
                _ => Self::Text(raw.to_string()),
            },
        }
    }

    /// Encode to the wire string.
    #[must_use]
    pub fn encode(&self) -> String {
        self.as_text().into_owned()
    }

    /// Read as a flag. Text values spelled `true`/`false` count as flags.
    #[must_use]
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(flag) => Some(*flag),
            Self::Text(text) if text == "true" => Some(true),
            Self::Text(text) if text == "false" => Some(false),
            _ => None,
        }
    }

    /// Read as an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(text) => text.parse().ok(),
            Self::Flag(_) => None,
        }
    }

    /// Read as text; always succeeds and yields the wire form.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Flag(true) => Cow::Borrowed("true"),
            Self::Flag(false) => Cow::Borrowed("false"),
            Self::Integer(value) => Cow::Owned(value.to_string()),
            Self::Text(text) => Cow::Borrowed(text),
        }
    }

    /// Whether this value is the flag `true`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.as_flag() == Some(true)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<bool> for PropertyValue {
    fn from(flag: bool) -> Self {
        Self::Flag(flag)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A single publication: a value, or `None` to retract the key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Property {
    /// The key being written.
    pub key: PropertyKey,

    /// The new value; `None` is a retraction request, not an error.
    pub value: Option<PropertyValue>,
}

impl Property {
    /// A node-scoped publication.
    pub fn node(
        owner: impl Into<NodeId>,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        Self {
            key: PropertyKey::node(owner, name),
            value: Some(value.into()),
        }
    }

    /// A cluster-scoped publication.
    pub fn cluster(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            key: PropertyKey::cluster(name),
            value: Some(value.into()),
        }
    }

    /// A retraction of `key`.
    #[must_use]
    pub const fn absent(key: PropertyKey) -> Self {
        Self { key, value: None }
    }
}

/// The set of writes produced by one round.
///
/// Writing the same key twice keeps only the last write.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PropertyDelta {
    writes: BTreeMap<PropertyKey, Option<PropertyValue>>,
}

impl PropertyDelta {
    /// An empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `value` under `key`.
    pub fn publish(&mut self, key: PropertyKey, value: impl Into<PropertyValue>) {
        self.writes.insert(key, Some(value.into()));
    }

    /// Retract `key`.
    pub fn retract(&mut self, key: PropertyKey) {
        self.writes.insert(key, None);
    }

    /// Record a write.
    pub fn push(&mut self, property: Property) {
        self.writes.insert(property.key, property.value);
    }

    /// Apply every write of `other` on top of this delta.
    pub fn merge(&mut self, other: Self) {
        self.writes.extend(other.writes);
    }

    /// The pending write for `key`: `Some(None)` means a retraction.
    #[must_use]
    pub fn get(&self, key: &PropertyKey) -> Option<Option<&PropertyValue>> {
        self.writes.get(key).map(Option::as_ref)
    }

    /// Whether nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Number of written keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Iterate over writes in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, PropertyKey, Option<PropertyValue>> {
        self.writes.iter()
    }

    /// Convert into a list of publications.
    #[must_use]
    pub fn into_properties(self) -> Vec<Property> {
        self.writes
            .into_iter()
            .map(|(key, value)| Property { key, value })
            .collect()
    }
}

impl FromIterator<Property> for PropertyDelta {
    fn from_iter<T: IntoIterator<Item = Property>>(iter: T) -> Self {
        let mut delta = Self::new();
        for property in iter {
            delta.push(property);
        }
        delta
    }
}

impl IntoIterator for PropertyDelta {
    type Item = (PropertyKey, Option<PropertyValue>);
    type IntoIter = btree_map::IntoIter<PropertyKey, Option<PropertyValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_infers_variant() {
        assert_eq!(PropertyValue::decode("true"), PropertyValue::Flag(true));
        assert_eq!(PropertyValue::decode("false"), PropertyValue::Flag(false));
        assert_eq!(PropertyValue::decode("26257"), PropertyValue::Integer(26257));
        assert_eq!(
            PropertyValue::decode("10.0.0.7"),
            PropertyValue::Text("10.0.0.7".to_string())
        );
    }

    #[test]
    fn test_decode_is_lossless() {
        for raw in ["0042", "+7", "-3", "true", "", "fd00::1", "9223372036854775808"] {
            assert_eq!(PropertyValue::decode(raw).encode(), raw);
        }
        assert_eq!(PropertyValue::decode("0042").as_integer(), Some(42));
    }

    #[test]
    fn test_flags_accept_textual_booleans() {
        assert_eq!(PropertyValue::from("true").as_flag(), Some(true));
        assert!(PropertyValue::Flag(true).is_true());
        assert!(!PropertyValue::from("yes").is_true());
        assert_eq!(PropertyValue::Integer(1).as_flag(), None);
    }

    #[test]
    fn test_delta_last_write_wins() {
        let key = PropertyKey::node("node-a", "redis_node_ready");
        let mut delta = PropertyDelta::new();
        delta.publish(key.clone(), true);
        delta.retract(key.clone());
        assert_eq!(delta.len(), 1);
        assert_eq!(delta.get(&key), Some(None));

        delta.publish(key.clone(), false);
        assert_eq!(delta.get(&key), Some(Some(&PropertyValue::Flag(false))));
    }

    #[test]
    fn test_key_display() {
        assert_eq!(
            PropertyKey::node("node-a", "tunnel_ip").to_string(),
            "node/node-a/tunnel_ip"
        );
        assert_eq!(
            PropertyKey::cluster("redis_cluster_initialized").to_string(),
            "cluster/redis_cluster_initialized"
        );
    }
}
