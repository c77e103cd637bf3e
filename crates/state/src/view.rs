//! The per-round snapshot the engine reconciles against.

use std::collections::{BTreeMap, BTreeSet};

use crate::{Member, NodeId, Property, PropertyDelta, PropertyKey, PropertyValue};

/// Immutable snapshot of intended membership, published properties and the
/// externally elected leader, as seen by one node for one round.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateView {
    local_node_id: NodeId,
    members: BTreeMap<NodeId, Member>,
    leader: Option<NodeId>,
    properties: BTreeMap<PropertyKey, PropertyValue>,
}

impl StateView {
    /// Start building a view for `local_node_id`.
    pub fn builder(local_node_id: impl Into<NodeId>) -> StateViewBuilder {
        StateViewBuilder {
            view: Self {
                local_node_id: local_node_id.into(),
                members: BTreeMap::new(),
                leader: None,
                properties: BTreeMap::new(),
            },
        }
    }

    /// The node this view was taken on.
    #[must_use]
    pub const fn local_node_id(&self) -> &NodeId {
        &self.local_node_id
    }

    /// Intended members, ordered by id.
    pub fn members(&self) -> impl ExactSizeIterator<Item = &Member> {
        self.members.values()
    }

    /// Number of intended members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Look up an intended member.
    #[must_use]
    pub fn member(&self, id: &NodeId) -> Option<&Member> {
        self.members.get(id)
    }

    /// Whether `id` is an intended member.
    #[must_use]
    pub fn contains_member(&self, id: &NodeId) -> bool {
        self.members.contains_key(id)
    }

    /// Ids of all intended members.
    #[must_use]
    pub fn member_ids(&self) -> BTreeSet<NodeId> {
        self.members.keys().cloned().collect()
    }

    /// The externally elected leader, if one is known.
    #[must_use]
    pub const fn leader(&self) -> Option<&NodeId> {
        self.leader.as_ref()
    }

    /// Whether the local node is the leader for this round.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.leader.as_ref() == Some(&self.local_node_id)
    }

    /// Look up any property.
    #[must_use]
    pub fn property(&self, key: &PropertyKey) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Look up a node-scoped property.
    #[must_use]
    pub fn node_property(&self, owner: &NodeId, name: &str) -> Option<&PropertyValue> {
        self.properties.get(&PropertyKey::node(owner.clone(), name))
    }

    /// Look up a cluster-scoped property.
    #[must_use]
    pub fn cluster_property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(&PropertyKey::cluster(name))
    }

    /// Node-scoped properties published by `owner`.
    pub fn properties_owned_by<'a>(
        &'a self,
        owner: &'a NodeId,
    ) -> impl Iterator<Item = (&'a str, &'a PropertyValue)> + 'a {
        self.properties
            .iter()
            .filter(move |(key, _)| key.owner() == Some(owner))
            .map(|(key, value)| (key.name(), value))
    }

    /// Every visible property, in key order.
    pub fn properties(&self) -> impl Iterator<Item = (&PropertyKey, &PropertyValue)> {
        self.properties.iter()
    }

    /// A new snapshot with `delta` applied on top of this one.
    #[must_use]
    pub fn overlay(&self, delta: &PropertyDelta) -> Self {
        let mut view = self.clone();
        for (key, value) in delta.iter() {
            match value {
                Some(value) => {
                    view.properties.insert(key.clone(), value.clone());
                }
                None => {
                    view.properties.remove(key);
                }
            }
        }
        view
    }
}

/// Builder for [`StateView`].
#[derive(Debug)]
pub struct StateViewBuilder {
    view: StateView,
}

impl StateViewBuilder {
    /// Add an intended member; a repeated id replaces the earlier entry.
    #[must_use]
    pub fn member(mut self, member: Member) -> Self {
        self.view.members.insert(member.id().clone(), member);
        self
    }

    /// Add several intended members.
    #[must_use]
    pub fn members(mut self, members: impl IntoIterator<Item = Member>) -> Self {
        for member in members {
            self = self.member(member);
        }
        self
    }

    /// Set the leader.
    #[must_use]
    pub fn leader(mut self, leader: impl Into<NodeId>) -> Self {
        self.view.leader = Some(leader.into());
        self
    }

    /// Set or clear the leader.
    #[must_use]
    pub fn maybe_leader(mut self, leader: Option<NodeId>) -> Self {
        self.view.leader = leader;
        self
    }

    /// Record a property; an absent value removes the key.
    #[must_use]
    pub fn property(mut self, property: Property) -> Self {
        match property.value {
            Some(value) => {
                self.view.properties.insert(property.key, value);
            }
            None => {
                self.view.properties.remove(&property.key);
            }
        }
        self
    }

    /// Record a node-scoped property.
    #[must_use]
    pub fn node_property(
        self,
        owner: impl Into<NodeId>,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.property(Property::node(owner, name, value))
    }

    /// Record a cluster-scoped property.
    #[must_use]
    pub fn cluster_property(
        self,
        name: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.property(Property::cluster(name, value))
    }

    /// Finish the view.
    #[must_use]
    pub fn build(self) -> StateView {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_node_view() -> StateView {
        StateView::builder("b")
            .members(["a", "b", "c"].map(Member::new))
            .leader("a")
            .node_property("a", "tunnel_ip", "10.0.0.1")
            .node_property("b", "tunnel_ip", "10.0.0.2")
            .node_property("b", "redis_node_ready", true)
            .cluster_property("redis_cluster_initialized", true)
            .build()
    }

    #[test]
    fn test_leadership_is_derived_from_the_snapshot() {
        let view = three_node_view();
        assert!(!view.is_leader());
        assert_eq!(view.leader(), Some(&NodeId::from("a")));

        let view = StateView::builder("a").leader("a").build();
        assert!(view.is_leader());

        let view = StateView::builder("a").build();
        assert!(!view.is_leader());
    }

    #[test]
    fn test_property_lookup_by_scope() {
        let view = three_node_view();
        assert_eq!(
            view.node_property(&NodeId::from("a"), "tunnel_ip"),
            Some(&PropertyValue::Text("10.0.0.1".to_string()))
        );
        assert_eq!(view.node_property(&NodeId::from("c"), "tunnel_ip"), None);
        assert!(view.cluster_property("redis_cluster_initialized").unwrap().is_true());
        assert_eq!(view.cluster_property("tunnel_ip"), None);
    }

    #[test]
    fn test_properties_owned_by() {
        let view = three_node_view();
        let owner = NodeId::from("b");
        let names: Vec<&str> = view.properties_owned_by(&owner).map(|(n, _)| n).collect();
        assert_eq!(names, vec!["redis_node_ready", "tunnel_ip"]);
    }

    #[test]
    fn test_overlay_applies_writes_and_retractions() {
        let view = three_node_view();
        let mut delta = PropertyDelta::new();
        delta.publish(PropertyKey::node("c", "tunnel_ip"), "10.0.0.3");
        delta.retract(PropertyKey::node("b", "redis_node_ready"));

        let next = view.overlay(&delta);
        assert!(next.node_property(&NodeId::from("c"), "tunnel_ip").is_some());
        assert!(next.node_property(&NodeId::from("b"), "redis_node_ready").is_none());
        // the original snapshot is untouched
        assert!(view.node_property(&NodeId::from("b"), "redis_node_ready").is_some());
    }

    #[test]
    fn test_duplicate_members_collapse() {
        let view = StateView::builder("a")
            .member(Member::new("a"))
            .member(Member::new("a").with_declared_address("10.0.0.1"))
            .build();
        assert_eq!(view.member_count(), 1);
        assert_eq!(
            view.member(&NodeId::from("a")).unwrap().declared_address(),
            Some("10.0.0.1")
        );
    }
}
