// SPDX-License-Identifier: MIT OR Apache-2.0
//! Group membership derived from spatial overlap.
//!
//! Groups are processed smallest first. Each group claims every overlapping
//! node that no smaller group has claimed yet; another group can only be
//! claimed once it has been processed itself, so nesting always runs from
//! the innermost group outwards.

use crate::geometry::Position;
use crate::graph::Graph;
use crate::node::{Node, NodeId};
use crate::spatial::SpatialIndex;
use std::collections::{HashMap, HashSet};

/// Recompute `parent_id` and parent-relative positions for every node.
///
/// Returns the full node list ordered groups first (enclosing before
/// enclosed), then all other nodes in their current relative order. Ids,
/// types and payloads are untouched, and nothing moves on the canvas.
pub fn resolve_containment(graph: &Graph) -> Result<Vec<Node>, ContainmentError> {
    if let Some(unmeasured) = graph.nodes().find(|node| node.measured.is_none()) {
        tracing::error!("Containment requested before node {} was measured", unmeasured.id);
        return Err(ContainmentError::PreconditionViolated(unmeasured.id.clone()));
    }

    let absolute: HashMap<&NodeId, Position> = graph
        .nodes()
        .map(|node| (&node.id, graph.absolute_position(&node.id).unwrap_or(node.position)))
        .collect();
    let index = SpatialIndex::from_graph(graph);

    let (mut groups, others): (Vec<&Node>, Vec<&Node>) = graph.nodes().partition(|node| node.is_group());
    // Ties broken by id so the processing order does not depend on list order.
    groups.sort_by(|a, b| {
        let area_a = a.declared_size().map_or(0.0, |size| size.area());
        let area_b = b.declared_size().map_or(0.0, |size| size.area());
        area_a.total_cmp(&area_b).then_with(|| a.id.cmp(&b.id))
    });

    let mut parents: HashMap<NodeId, NodeId> = HashMap::new();
    let mut processed: HashSet<&NodeId> = HashSet::new();
    for group in &groups {
        let Some(bounds) = index.bounds(&group.id) else {
            continue;
        };
        for candidate in index.query_rect(&bounds) {
            if candidate == group.id || parents.contains_key(&candidate) {
                continue;
            }
            let is_group = graph.node(&candidate).is_some_and(Node::is_group);
            if is_group && !processed.contains(&candidate) {
                continue;
            }
            parents.insert(candidate, group.id.clone());
        }
        processed.insert(&group.id);
    }

    let reparent = |node: &Node| -> Node {
        let parent_id = parents.get(&node.id).cloned();
        let own = absolute.get(&node.id).copied().unwrap_or(node.position);
        let parent_abs = parent_id
            .as_ref()
            .and_then(|id| absolute.get(id).copied())
            .unwrap_or(Position::ZERO);
        Node {
            position: own.relative_to(parent_abs),
            parent_id,
            ..node.clone()
        }
    };

    let resolved: Vec<Node> = groups
        .iter()
        .rev()
        .map(|group| reparent(*group))
        .chain(others.iter().map(|node| reparent(*node)))
        .collect();
    tracing::debug!(
        "Resolved containment for {} node(s), {} parented",
        resolved.len(),
        parents.len()
    );
    Ok(resolved)
}

/// Error when resolving containment
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContainmentError {
    /// A node has not been measured yet
    #[error("Precondition violated: node {0} has no measured size")]
    PreconditionViolated(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: &str, x: f64, y: f64) -> Node {
        Node::raw_json(id, serde_json::Map::new())
            .with_position(x, y)
            .with_measured(50.0, 50.0)
    }

    fn group(id: &str, x: f64, y: f64, size: f64) -> Node {
        Node::group(id, id, size, size)
            .with_position(x, y)
            .with_measured(size, size)
    }

    fn nested() -> Graph {
        Graph::from_parts(
            None,
            vec![
                leaf("leaf", 120.0, 120.0),
                group("small", 100.0, 100.0, 200.0),
                leaf("outside", 2000.0, 2000.0),
                group("large", 0.0, 0.0, 1000.0),
            ],
            vec![],
        )
        .unwrap()
    }

    fn commit(graph: &mut Graph) {
        let nodes = resolve_containment(graph).unwrap();
        graph.replace_nodes(nodes).unwrap();
    }

    #[test]
    fn test_nested_groups_resolve_innermost_first() {
        let mut graph = nested();
        commit(&mut graph);

        let ids: Vec<&str> = graph.node_ids().map(NodeId::as_str).collect();
        assert_eq!(ids, vec!["large", "small", "leaf", "outside"]);

        let leaf = graph.node(&"leaf".into()).unwrap();
        assert_eq!(leaf.parent_id, Some(NodeId::from("small")));
        assert_eq!(leaf.position, Position::new(20.0, 20.0));

        let small = graph.node(&"small".into()).unwrap();
        assert_eq!(small.parent_id, Some(NodeId::from("large")));
        assert_eq!(small.position, Position::new(100.0, 100.0));

        assert_eq!(graph.node(&"outside".into()).unwrap().parent_id, None);
        assert_eq!(
            graph.absolute_position(&"leaf".into()),
            Some(Position::new(120.0, 120.0))
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut graph = nested();
        commit(&mut graph);
        let first = graph.clone();
        commit(&mut graph);
        assert_eq!(graph, first);
        let first_order: Vec<_> = first.node_ids().cloned().collect();
        let second_order: Vec<_> = graph.node_ids().cloned().collect();
        assert_eq!(first_order, second_order);
    }

    #[test]
    fn test_equal_groups_are_stable() {
        let mut graph = Graph::from_parts(
            None,
            vec![group("b", 0.0, 0.0, 100.0), group("a", 50.0, 50.0, 100.0)],
            vec![],
        )
        .unwrap();
        commit(&mut graph);
        let first = graph.clone();
        commit(&mut graph);
        assert_eq!(graph, first);
        assert_eq!(
            graph.node(&"a".into()).unwrap().parent_id,
            Some(NodeId::from("b"))
        );
    }

    #[test]
    fn test_leaving_a_group_clears_parent() {
        let mut graph = nested();
        commit(&mut graph);
        let mut positions = crate::graph::PositionMap::new();
        positions.insert("leaf".into(), Position::new(3000.0, 3000.0));
        graph.apply_positions(&positions);
        commit(&mut graph);

        let leaf = graph.node(&"leaf".into()).unwrap();
        assert_eq!(leaf.parent_id, None);
        assert_eq!(leaf.position, Position::new(3000.0, 3000.0));
    }

    #[test]
    fn test_requires_measurements() {
        let graph = Graph::from_parts(
            None,
            vec![Node::group("g", "g", 10.0, 10.0), leaf("n", 0.0, 0.0)],
            vec![],
        )
        .unwrap();
        assert_eq!(
            resolve_containment(&graph),
            Err(ContainmentError::PreconditionViolated("g".into()))
        );
    }
}
