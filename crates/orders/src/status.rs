//! Order status enumeration and the table-driven rules around it.
//!
//! Which statuses exist, which transitions are legal, and which statuses allow
//! an update or a delete are four independent tables held by [`StatusGraph`].
//! None of them is derived from another.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use courier_core::{DomainError, ValueObject};

/// Delivery order status.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Accepted,
    PickedUp,
    InTransit,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Accepted,
        OrderStatus::PickedUp,
        OrderStatus::InTransit,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Wire name (`PENDING`, `PICKED_UP`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::InTransit => "IN_TRANSIT",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl ValueObject for OrderStatus {}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

static STANDARD: Lazy<StatusGraph> = Lazy::new(|| {
    use OrderStatus::*;

    StatusGraph::builder()
        .statuses(OrderStatus::ALL)
        .edge(Pending, Accepted)
        .edge(Accepted, PickedUp)
        .edge(PickedUp, InTransit)
        .edge(InTransit, Delivered)
        .edge(Pending, Cancelled)
        .edge(Accepted, Cancelled)
        .edge(PickedUp, Cancelled)
        .edge(InTransit, Cancelled)
        .updatable([Pending, Accepted, PickedUp, InTransit])
        .deletable([Pending, Cancelled])
        .build()
});

/// Immutable rule tables for the order workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusGraph {
    known: HashSet<OrderStatus>,
    edges: HashMap<OrderStatus, HashSet<OrderStatus>>,
    updatable: HashSet<OrderStatus>,
    deletable: HashSet<OrderStatus>,
}

impl StatusGraph {
    /// The platform workflow, built once and shared.
    pub fn standard() -> &'static StatusGraph {
        &STANDARD
    }

    pub fn builder() -> StatusGraphBuilder {
        StatusGraphBuilder::default()
    }

    /// True iff `status` names a known status.
    pub fn is_valid(&self, status: &str) -> bool {
        status
            .parse::<OrderStatus>()
            .is_ok_and(|s| self.is_known(s))
    }

    pub fn is_known(&self, status: OrderStatus) -> bool {
        self.known.contains(&status)
    }

    /// True iff `from -> to` is an edge of the workflow.
    pub fn can_transition(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.edges
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    pub fn can_update(&self, status: OrderStatus) -> bool {
        self.updatable.contains(&status)
    }

    pub fn can_delete(&self, status: OrderStatus) -> bool {
        self.deletable.contains(&status)
    }

    /// Legal targets from `from`, in declaration order of [`OrderStatus`].
    pub fn next_statuses(&self, from: OrderStatus) -> Vec<OrderStatus> {
        self.edges
            .get(&from)
            .map(|targets| targets.iter().copied().collect::<BTreeSet<_>>())
            .unwrap_or_default()
            .into_iter()
            .collect()
    }
}

impl Default for StatusGraph {
    fn default() -> Self {
        StatusGraph::standard().clone()
    }
}

/// Assembles a [`StatusGraph`]. Edges and rule sets may only mention statuses
/// registered through [`StatusGraphBuilder::statuses`]; others are dropped at
/// `build()`.
#[derive(Debug, Default)]
pub struct StatusGraphBuilder {
    known: HashSet<OrderStatus>,
    edges: Vec<(OrderStatus, OrderStatus)>,
    updatable: HashSet<OrderStatus>,
    deletable: HashSet<OrderStatus>,
}

impl StatusGraphBuilder {
    pub fn statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.known.extend(statuses);
        self
    }

    pub fn edge(mut self, from: OrderStatus, to: OrderStatus) -> Self {
        self.edges.push((from, to));
        self
    }

    pub fn updatable(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.updatable.extend(statuses);
        self
    }

    pub fn deletable(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.deletable.extend(statuses);
        self
    }

    pub fn build(self) -> StatusGraph {
        let known = self.known;

        let mut edges: HashMap<OrderStatus, HashSet<OrderStatus>> = HashMap::new();
        for (from, to) in self.edges {
            if known.contains(&from) && known.contains(&to) {
                edges.entry(from).or_default().insert(to);
            }
        }

        let updatable = self.updatable.intersection(&known).copied().collect();
        let deletable = self.deletable.intersection(&known).copied().collect();

        StatusGraph {
            known,
            edges,
            updatable,
            deletable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    fn legal_edges() -> HashSet<(OrderStatus, OrderStatus)> {
        HashSet::from([
            (Pending, Accepted),
            (Accepted, PickedUp),
            (PickedUp, InTransit),
            (InTransit, Delivered),
            (Pending, Cancelled),
            (Accepted, Cancelled),
            (PickedUp, Cancelled),
            (InTransit, Cancelled),
        ])
    }

    #[test]
    fn every_wire_name_is_valid() {
        let graph = StatusGraph::standard();
        for name in [
            "PENDING",
            "ACCEPTED",
            "PICKED_UP",
            "IN_TRANSIT",
            "DELIVERED",
            "CANCELLED",
        ] {
            assert!(graph.is_valid(name), "{name} should be valid");
        }
    }

    #[test]
    fn near_misses_are_invalid() {
        let graph = StatusGraph::standard();
        for name in ["", "pending", "Pending", "PICKEDUP", "IN TRANSIT", "RETURNED", " PENDING"] {
            assert!(!graph.is_valid(name), "{name:?} should be invalid");
        }
    }

    #[test]
    fn transition_table_matches_workflow() {
        let graph = StatusGraph::standard();
        let legal = legal_edges();
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    graph.can_transition(from, to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        let graph = StatusGraph::standard();
        for status in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            assert!(graph.next_statuses(status).is_empty(), "{status}");
        }
    }

    #[test]
    fn next_statuses_are_sorted() {
        let graph = StatusGraph::standard();
        assert_eq!(graph.next_statuses(Pending), vec![Accepted, Cancelled]);
        assert_eq!(graph.next_statuses(InTransit), vec![Delivered, Cancelled]);
    }

    #[test]
    fn update_and_delete_sets_are_independent_of_transitions() {
        let graph = StatusGraph::standard();

        assert!(graph.can_update(Pending));
        assert!(graph.can_update(InTransit));
        assert!(!graph.can_update(Delivered));
        assert!(!graph.can_update(Cancelled));

        assert!(graph.can_delete(Pending));
        assert!(graph.can_delete(Cancelled));
        assert!(!graph.can_delete(InTransit));
        assert!(!graph.can_delete(Delivered));
    }

    #[test]
    fn builder_drops_rules_for_unknown_statuses() {
        let graph = StatusGraph::builder()
            .statuses([Pending, Accepted])
            .edge(Pending, Accepted)
            .edge(Accepted, Delivered)
            .updatable([Pending, Delivered])
            .build();

        assert!(graph.can_transition(Pending, Accepted));
        assert!(!graph.can_transition(Accepted, Delivered));
        assert!(!graph.can_update(Delivered));
        assert!(!graph.is_valid("DELIVERED"));
    }

    #[test]
    fn status_serializes_as_wire_name() {
        let json = serde_json::to_string(&PickedUp).unwrap();
        assert_eq!(json, "\"PICKED_UP\"");
        let back: OrderStatus = serde_json::from_str("\"IN_TRANSIT\"").unwrap();
        assert_eq!(back, InTransit);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = OrderStatus> {
            prop::sample::select(OrderStatus::ALL.to_vec())
        }

        proptest! {
            /// Property: only the six wire names are valid statuses.
            #[test]
            fn arbitrary_strings_are_valid_only_when_enumerated(s in "[A-Za-z_ ]{0,12}") {
                let expected = OrderStatus::ALL.iter().any(|st| st.as_str() == s);
                prop_assert_eq!(StatusGraph::standard().is_valid(&s), expected);
            }

            /// Property: parsing the wire name yields the same status.
            #[test]
            fn wire_name_parses_back(status in any_status()) {
                prop_assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
            }

            /// Property: nothing leaves a terminal status.
            #[test]
            fn terminal_statuses_never_transition(from in any_status(), to in any_status()) {
                if from.is_terminal() {
                    prop_assert!(!StatusGraph::standard().can_transition(from, to));
                }
            }
        }
    }
}
