// SPDX-License-Identifier: MIT OR Apache-2.0
//! Automatic node placement.
//!
//! Two algorithms share one input shape (sized nodes plus directed edges) and
//! one output shape (absolute top-left positions keyed by id):
//!
//! - [`layout_tree`] places each rooted hierarchy compactly, children in pin
//!   order, one column per depth.
//! - [`layout_layered`] handles arbitrary directed graphs with a layered
//!   (Sugiyama-style) pipeline.
//!
//! Both are pure and deterministic; nodes are processed in id order.

mod layered;
mod tree;

pub use layered::layout_layered;
pub use tree::layout_tree;

use crate::geometry::{Position, Size};
use crate::graph::{Graph, PositionMap};
use crate::node::NodeId;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

/// Width used for nodes without a usable size
pub const DEFAULT_NODE_WIDTH: f64 = 360.0;
/// Height used for nodes without a usable size
pub const DEFAULT_NODE_HEIGHT: f64 = 240.0;
/// Default gap between neighbouring nodes of one rank
pub const DEFAULT_NODE_SEP: f64 = 80.0;
/// Default gap between ranks
pub const DEFAULT_RANK_SEP: f64 = 140.0;
/// Default horizontal margin of the layered layout
pub const DEFAULT_MARGIN_X: f64 = 40.0;
/// Default vertical margin of the layered layout
pub const DEFAULT_MARGIN_Y: f64 = 40.0;

/// Reading direction of a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Ranks advance to the right
    #[default]
    #[serde(rename = "LR")]
    LeftToRight,
    /// Ranks advance downwards
    #[serde(rename = "TB")]
    TopToBottom,
}

/// Gaps between nodes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSpacing {
    /// Gap between nodes sharing a rank (and between disjoint trees)
    pub node_sep: f64,
    /// Gap between ranks
    pub rank_sep: f64,
    /// Horizontal margin (layered layout only)
    pub margin_x: f64,
    /// Vertical margin (layered layout only)
    pub margin_y: f64,
}

impl Default for LayoutSpacing {
    fn default() -> Self {
        Self {
            node_sep: DEFAULT_NODE_SEP,
            rank_sep: DEFAULT_RANK_SEP,
            margin_x: DEFAULT_MARGIN_X,
            margin_y: DEFAULT_MARGIN_Y,
        }
    }
}

impl LayoutSpacing {
    /// Replace non-finite or negative values with their defaults
    pub fn sanitized(&self) -> Self {
        fn pick(value: f64, fallback: f64) -> f64 {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                fallback
            }
        }
        let defaults = Self::default();
        Self {
            node_sep: pick(self.node_sep, defaults.node_sep),
            rank_sep: pick(self.rank_sep, defaults.rank_sep),
            margin_x: pick(self.margin_x, defaults.margin_x),
            margin_y: pick(self.margin_y, defaults.margin_y),
        }
    }
}

/// Layout settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Reading direction
    pub direction: Direction,
    /// Gaps and margins
    pub spacing: LayoutSpacing,
    /// Size assumed for nodes that have none
    pub node_size: Size,
    /// Offset added to every position
    pub origin: Position,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            direction: Direction::default(),
            spacing: LayoutSpacing::default(),
            node_size: Size::new(DEFAULT_NODE_WIDTH, DEFAULT_NODE_HEIGHT),
            origin: Position::ZERO,
        }
    }
}

impl LayoutConfig {
    /// Extent along the rank axis and along the breadth axis
    pub(crate) fn axes(&self, size: Size) -> (f64, f64) {
        match self.direction {
            Direction::LeftToRight => (size.width, size.height),
            Direction::TopToBottom => (size.height, size.width),
        }
    }

    /// Canvas position from rank/breadth coordinates, origin applied
    pub(crate) fn to_canvas(&self, rank: f64, breadth: f64) -> Position {
        let local = match self.direction {
            Direction::LeftToRight => Position::new(rank, breadth),
            Direction::TopToBottom => Position::new(breadth, rank),
        };
        local.offset_by(self.origin)
    }
}

/// A node to place
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutNode {
    /// Node id
    pub id: NodeId,
    /// Rendered size
    pub size: Size,
}

impl LayoutNode {
    /// Create a layout node
    pub fn new(id: impl Into<NodeId>, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            size: Size::new(width, height),
        }
    }
}

/// A directed edge between layout nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LayoutEdge {
    /// Parent side
    pub source: NodeId,
    /// Child side
    pub target: NodeId,
}

impl LayoutEdge {
    /// Create a layout edge
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Which algorithm [`auto_position`] runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Rooted-tree layout
    #[default]
    Tree,
    /// Layered directed-graph layout
    Graph,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree => f.write_str("tree"),
            Self::Graph => f.write_str("graph"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" => Ok(Self::Tree),
            "graph" => Ok(Self::Graph),
            other => Err(format!("Unknown layout algorithm: {other}")),
        }
    }
}

/// Dedupe by id (first wins), replace unusable sizes, sort by id
pub(crate) fn prepare_nodes(nodes: &[LayoutNode], fallback: Size) -> Vec<LayoutNode> {
    let mut seen: IndexMap<&NodeId, Size> = IndexMap::new();
    for node in nodes {
        seen.entry(&node.id).or_insert(node.size);
    }
    let mut prepared: Vec<LayoutNode> = seen
        .into_iter()
        .map(|(id, size)| LayoutNode {
            id: id.clone(),
            size: Size::new(
                usable_extent(size.width, fallback.width, DEFAULT_NODE_WIDTH),
                usable_extent(size.height, fallback.height, DEFAULT_NODE_HEIGHT),
            ),
        })
        .collect();
    prepared.sort_by(|a, b| a.id.cmp(&b.id));
    prepared
}

fn usable_extent(value: f64, fallback: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 {
        value
    } else if fallback.is_finite() && fallback > 0.0 {
        fallback
    } else {
        default
    }
}

/// Every id reachable from `seeds` by following edges forward.
///
/// Seeds are deduplicated and visited in id order; traversal is breadth
/// first. With `allowed`, ids outside the set are neither seeds nor
/// traversed through.
pub fn collect_descendant_ids(
    seeds: &[NodeId],
    edges: &[LayoutEdge],
    allowed: Option<&IndexSet<NodeId>>,
) -> Vec<NodeId> {
    let permitted = |id: &NodeId| allowed.map_or(true, |set| set.contains(id));

    let mut children: IndexMap<&NodeId, IndexSet<&NodeId>> = IndexMap::new();
    for edge in edges {
        if permitted(&edge.source) && permitted(&edge.target) {
            children.entry(&edge.source).or_default().insert(&edge.target);
        }
    }

    let mut sorted_seeds: Vec<&NodeId> = seeds.iter().filter(|&id| permitted(id)).collect();
    sorted_seeds.sort();
    sorted_seeds.dedup();

    let mut visited: IndexSet<&NodeId> = sorted_seeds.iter().copied().collect();
    let mut pending: VecDeque<&NodeId> = sorted_seeds.into_iter().collect();
    while let Some(current) = pending.pop_front() {
        let Some(next) = children.get(current) else {
            continue;
        };
        for &child in next {
            if visited.insert(child) {
                pending.push_back(child);
            }
        }
    }
    visited.into_iter().cloned().collect()
}

/// Top-left corner of a set of positions, ignoring non-finite ones
pub fn layout_origin_from_positions<'a>(positions: impl IntoIterator<Item = &'a Position>) -> Position {
    let mut min = Position::new(f64::INFINITY, f64::INFINITY);
    for position in positions {
        if !position.is_finite() {
            continue;
        }
        min.x = min.x.min(position.x);
        min.y = min.y.min(position.y);
    }
    if min.is_finite() {
        min
    } else {
        Position::ZERO
    }
}

/// Lay out a selection and everything under it.
///
/// An empty selection lays out the whole graph. Groups and comments are not
/// part of the node tree and are never moved. The result is anchored at the
/// previous top-left corner of the laid-out nodes.
pub fn auto_position(
    graph: &Graph,
    selection: &[NodeId],
    algorithm: Algorithm,
    config: &LayoutConfig,
) -> PositionMap {
    let layoutable: IndexSet<NodeId> = graph
        .nodes()
        .filter(|node| node.accepts_input())
        .map(|node| node.id.clone())
        .collect();

    let edges: Vec<LayoutEdge> = layoutable
        .iter()
        .flat_map(|id| {
            graph
                .ordered_children(id)
                .into_iter()
                .map(move |child| LayoutEdge::new(id.clone(), child))
        })
        .collect();

    let seeds: Vec<NodeId> = if selection.is_empty() {
        layoutable.iter().cloned().collect()
    } else {
        selection.to_vec()
    };
    let ids: IndexSet<NodeId> = collect_descendant_ids(&seeds, &edges, Some(&layoutable))
        .into_iter()
        .collect();
    if ids.is_empty() {
        return PositionMap::new();
    }

    let nodes: Vec<LayoutNode> = ids
        .iter()
        .filter_map(|id| graph.node(id))
        .map(|node| LayoutNode {
            id: node.id.clone(),
            size: node.measured.unwrap_or(config.node_size),
        })
        .collect();
    let previous: Vec<Position> = ids
        .iter()
        .filter_map(|id| graph.absolute_position(id))
        .collect();
    let config = LayoutConfig {
        origin: layout_origin_from_positions(&previous),
        ..config.clone()
    };
    let edges: Vec<LayoutEdge> = edges
        .into_iter()
        .filter(|edge| ids.contains(&edge.source) && ids.contains(&edge.target))
        .collect();

    let positions = match algorithm {
        Algorithm::Tree => layout_tree(&nodes, &edges, &config),
        Algorithm::Graph => layout_layered(&nodes, &edges, &config),
    };
    tracing::info!("Auto-positioned {} node(s) with the {} layout", positions.len(), algorithm);
    positions
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DataNodeData, Node};
    use crate::port::OutputPin;

    fn ids(raw: &[&str]) -> Vec<NodeId> {
        raw.iter().map(|id| NodeId::from(*id)).collect()
    }

    #[test]
    fn test_collect_descendants() {
        let edges = vec![
            LayoutEdge::new("a", "b"),
            LayoutEdge::new("b", "c"),
            LayoutEdge::new("c", "a"),
            LayoutEdge::new("x", "y"),
        ];
        let found = collect_descendant_ids(&ids(&["b", "b"]), &edges, None);
        assert_eq!(found, ids(&["b", "c", "a"]));

        let allowed: IndexSet<NodeId> = ids(&["a", "b", "x"]).into_iter().collect();
        let found = collect_descendant_ids(&ids(&["a", "y"]), &edges, Some(&allowed));
        assert_eq!(found, ids(&["a", "b"]));
    }

    #[test]
    fn test_excluded_seed_contributes_nothing() {
        let edges = vec![LayoutEdge::new("a", "b")];
        let allowed: IndexSet<NodeId> = ids(&["b"]).into_iter().collect();
        assert!(collect_descendant_ids(&ids(&["a"]), &edges, Some(&allowed)).is_empty());
    }

    #[test]
    fn test_origin_from_positions() {
        let positions = [
            Position::new(10.0, 50.0),
            Position::new(f64::NAN, -100.0),
            Position::new(-5.0, 20.0),
        ];
        assert_eq!(layout_origin_from_positions(&positions), Position::new(-5.0, 20.0));
        assert_eq!(layout_origin_from_positions(&Vec::new()), Position::ZERO);
    }

    #[test]
    fn test_spacing_sanitized() {
        let spacing = LayoutSpacing {
            node_sep: f64::NAN,
            rank_sep: -3.0,
            margin_x: 0.0,
            margin_y: f64::INFINITY,
        }
        .sanitized();
        assert_eq!(spacing.node_sep, DEFAULT_NODE_SEP);
        assert_eq!(spacing.rank_sep, DEFAULT_RANK_SEP);
        assert_eq!(spacing.margin_x, 0.0);
        assert_eq!(spacing.margin_y, DEFAULT_MARGIN_Y);
    }

    #[test]
    fn test_prepare_nodes() {
        let nodes = prepare_nodes(
            &[
                LayoutNode::new("b", -1.0, 10.0),
                LayoutNode::new("a", 5.0, 5.0),
                LayoutNode::new("b", 99.0, 99.0),
            ],
            Size::new(360.0, 240.0),
        );
        assert_eq!(
            nodes,
            vec![LayoutNode::new("a", 5.0, 5.0), LayoutNode::new("b", 360.0, 10.0)]
        );
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!("Tree".parse::<Algorithm>(), Ok(Algorithm::Tree));
        assert_eq!("graph".parse::<Algorithm>(), Ok(Algorithm::Graph));
        assert!("dagre".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_auto_position_anchors_selection() {
        let parent = Node::data(
            "P",
            DataNodeData {
                template_id: "T".to_string(),
                output_pins: vec![OutputPin::multiple("Items")],
                ..Default::default()
            },
        )
        .with_position(500.0, 700.0)
        .with_measured(100.0, 50.0);
        let mut graph = Graph::new();
        graph.add_node(parent).unwrap();
        for (id, x) in [("A", 900.0), ("B", 600.0)] {
            graph
                .add_node(Node::raw_json(id, Default::default()).with_position(x, 900.0))
                .unwrap();
        }
        graph
            .add_node(Node::group("G", "Group", 10.0, 10.0).with_position(-1000.0, -1000.0))
            .unwrap();
        graph.add_node(Node::raw_json("Other", Default::default())).unwrap();
        graph.connect(&"P".into(), "Items", &"A".into()).unwrap();
        graph.connect(&"P".into(), "Items", &"B".into()).unwrap();

        let positions = auto_position(&graph, &ids(&["P"]), Algorithm::Tree, &LayoutConfig::default());
        assert_eq!(positions.len(), 3);
        assert!(!positions.contains_key(&NodeId::from("G")));
        assert!(!positions.contains_key(&NodeId::from("Other")));

        let anchor = layout_origin_from_positions(positions.values());
        assert_eq!(anchor, Position::new(500.0, 700.0));
        // children in pin order, right of the parent
        assert!(positions[&NodeId::from("A")].y < positions[&NodeId::from("B")].y);
        assert!(positions[&NodeId::from("A")].x > positions[&NodeId::from("P")].x);
    }
}
