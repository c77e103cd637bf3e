//! Gate that holds a round back until every member has published what it
//! depends on.

use std::fmt;

use swarm_state::{NodeId, StateView};

/// What a member must have published.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Requirement {
    /// The property exists and is not empty.
    Present(String),

    /// The property exists and reads as `true`.
    True(String),
}

impl Requirement {
    /// Name of the property.
    #[must_use]
    pub fn property(&self) -> &str {
        match self {
            Self::Present(name) | Self::True(name) => name,
        }
    }

    fn is_met(&self, view: &StateView, member: &NodeId) -> bool {
        let value = view.node_property(member, self.property());
        match self {
            Self::Present(_) => value.is_some_and(|value| !value.as_text().is_empty()),
            Self::True(_) => value.is_some_and(|value| value.as_flag() == Some(true)),
        }
    }
}

/// The first unmet requirement found.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NotReady {
    /// Member that has not published.
    pub member: NodeId,

    /// The unmet requirement.
    pub requirement: Requirement,
}

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Requirement::Present(name) => {
                write!(f, "waiting for node {} to publish {name}", self.member)
            }
            Requirement::True(name) => {
                write!(f, "waiting for node {} to report {name}=true", self.member)
            }
        }
    }
}

/// Outcome of [`ReadinessGate::evaluate`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// Every requirement is met by every member.
    Ready,

    /// At least one requirement is unmet.
    NotReady(NotReady),
}

impl Readiness {
    /// Whether the gate is open.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// Checks that a set of members has published a set of node properties.
///
/// Pure: the outcome depends only on the view.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReadinessGate {
    requirements: Vec<Requirement>,
}

impl ReadinessGate {
    /// A gate over arbitrary requirements.
    #[must_use]
    pub const fn new(requirements: Vec<Requirement>) -> Self {
        Self { requirements }
    }

    /// Gate requiring every named property to be present.
    pub fn dependencies<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| Requirement::Present(name.into()))
                .collect(),
        )
    }

    /// Gate requiring the ready flag to be `true`.
    pub fn quorum(node_ready_property: impl Into<String>) -> Self {
        Self::new(vec![Requirement::True(node_ready_property.into())])
    }

    /// The configured requirements.
    #[must_use]
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// Evaluate over every member in the view.
    #[must_use]
    pub fn evaluate(&self, view: &StateView) -> Readiness {
        self.evaluate_members(view, view.members().map(swarm_state::Member::id))
    }

    /// Evaluate over `members`, in the order given.
    ///
    /// An empty member set is vacuously ready.
    pub fn evaluate_members<'a, I>(&self, view: &StateView, members: I) -> Readiness
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        for member in members {
            for requirement in &self.requirements {
                if !requirement.is_met(view, member) {
                    return Readiness::NotReady(NotReady {
                        member: member.clone(),
                        requirement: requirement.clone(),
                    });
                }
            }
        }

        Readiness::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_state::Member;

    #[test]
    fn test_no_members_is_vacuously_ready() {
        let view = StateView::builder("a").build();
        assert!(ReadinessGate::dependencies(["tunnel_ip"]).evaluate(&view).is_ready());
    }

    #[test]
    fn test_single_member_waits_only_on_itself() {
        let gate = ReadinessGate::dependencies(["tunnel_ip"]);

        let view = StateView::builder("a").member(Member::new("a")).build();
        assert_eq!(
            gate.evaluate(&view),
            Readiness::NotReady(NotReady {
                member: NodeId::from("a"),
                requirement: Requirement::Present("tunnel_ip".to_string()),
            })
        );

        let view = StateView::builder("a")
            .member(Member::new("a"))
            .node_property("a", "tunnel_ip", "10.0.0.1")
            .build();
        assert!(gate.evaluate(&view).is_ready());
    }

    #[test]
    fn test_reports_first_missing_member() {
        let view = StateView::builder("a")
            .members(["a", "b", "c"].map(Member::new))
            .node_property("a", "tunnel_ip", "10.0.0.1")
            .node_property("c", "tunnel_ip", "")
            .build();

        let Readiness::NotReady(not_ready) = ReadinessGate::dependencies(["tunnel_ip"]).evaluate(&view)
        else {
            panic!("expected NotReady");
        };
        assert_eq!(not_ready.member, NodeId::from("b"));
        assert_eq!(not_ready.to_string(), "waiting for node b to publish tunnel_ip");
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let view = StateView::builder("a")
            .member(Member::new("a"))
            .node_property("a", "tunnel_ip", "")
            .build();
        assert!(!ReadinessGate::dependencies(["tunnel_ip"]).evaluate(&view).is_ready());
    }

    #[test]
    fn test_quorum_requires_true() {
        let gate = ReadinessGate::quorum("redis_node_ready");
        let view = StateView::builder("a")
            .members(["a", "b"].map(Member::new))
            .node_property("a", "redis_node_ready", true)
            .node_property("b", "redis_node_ready", false)
            .build();

        let readiness = gate.evaluate(&view);
        assert!(!readiness.is_ready());
        if let Readiness::NotReady(not_ready) = readiness {
            assert_eq!(not_ready.to_string(), "waiting for node b to report redis_node_ready=true");
        }

        let subset = [NodeId::from("a")];
        assert!(gate.evaluate_members(&view, &subset).is_ready());
    }
}
