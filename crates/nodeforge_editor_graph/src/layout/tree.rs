// SPDX-License-Identifier: MIT OR Apache-2.0
//! Compact layout for rooted hierarchies.
//!
//! Every depth gets its own column along the rank axis, as wide as its widest
//! node. Along the breadth axis subtrees are packed using their contours
//! (the per-depth extent of each subtree), so a narrow subtree can tuck in
//! next to a deep one. Parents are centred on their first and last child.

use super::{prepare_nodes, LayoutConfig, LayoutEdge, LayoutNode};
use crate::graph::PositionMap;
use crate::node::NodeId;
use std::collections::{HashMap, HashSet};

/// Per-depth `(min, max)` breadth extent relative to a subtree's root centre
type Contour = Vec<(f64, f64)>;

/// Place hierarchies rooted at nodes without a parent.
///
/// Children follow edge order. A node reachable from several parents is
/// placed under the first one that reaches it; nodes only reachable through
/// a cycle start hierarchies of their own. Disjoint hierarchies are stacked
/// along the breadth axis `node_sep` apart. A lone node lands on the origin.
pub fn layout_tree(nodes: &[LayoutNode], edges: &[LayoutEdge], config: &LayoutConfig) -> PositionMap {
    let nodes = prepare_nodes(nodes, config.node_size);
    if nodes.is_empty() {
        return PositionMap::new();
    }
    let spacing = config.spacing.sanitized();
    let index: HashMap<&NodeId, usize> = nodes.iter().enumerate().map(|(i, node)| (&node.id, i)).collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut has_parent = vec![false; nodes.len()];
    let mut seen: HashSet<(usize, usize)> = HashSet::new();
    for edge in edges {
        let (Some(&source), Some(&target)) = (index.get(&edge.source), index.get(&edge.target)) else {
            continue;
        };
        if source == target || !seen.insert((source, target)) {
            continue;
        }
        children[source].push(target);
        has_parent[target] = true;
    }

    let mut forest = Forest {
        rank_extent: nodes.iter().map(|node| config.axes(node.size).0).collect(),
        breadth_extent: nodes.iter().map(|node| config.axes(node.size).1).collect(),
        children,
        claimed: vec![false; nodes.len()],
        placed: vec![(0.0, 0.0); nodes.len()],
        cursor: 0.0,
        node_sep: spacing.node_sep,
        rank_sep: spacing.rank_sep,
    };
    for root in 0..nodes.len() {
        if !has_parent[root] {
            forest.place(root);
        }
    }
    for root in 0..nodes.len() {
        if !forest.claimed[root] {
            forest.place(root);
        }
    }

    nodes
        .iter()
        .zip(&forest.placed)
        .map(|(node, &(rank, breadth))| (node.id.clone(), config.to_canvas(rank, breadth)))
        .collect()
}

struct Forest {
    rank_extent: Vec<f64>,
    breadth_extent: Vec<f64>,
    children: Vec<Vec<usize>>,
    claimed: Vec<bool>,
    /// Top-left `(rank, breadth)` per node
    placed: Vec<(f64, f64)>,
    /// Breadth where the next hierarchy starts
    cursor: f64,
    node_sep: f64,
    rank_sep: f64,
}

impl Forest {
    fn place(&mut self, root: usize) {
        // Breadth-first claim: reversed, the order visits children before parents.
        self.claimed[root] = true;
        let mut order = vec![root];
        let mut depth: HashMap<usize, usize> = HashMap::from([(root, 0)]);
        let mut tree_children: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut cursor = 0;
        while cursor < order.len() {
            let parent = order[cursor];
            cursor += 1;
            let parent_depth = depth[&parent];
            for &child in &self.children[parent] {
                if self.claimed[child] {
                    continue;
                }
                self.claimed[child] = true;
                depth.insert(child, parent_depth + 1);
                tree_children.entry(parent).or_default().push(child);
                order.push(child);
            }
        }

        let mut contours: HashMap<usize, Contour> = HashMap::new();
        let mut offsets: HashMap<usize, f64> = HashMap::new();
        for &node in order.iter().rev() {
            let half = self.breadth_extent[node] / 2.0;
            let Some(kids) = tree_children.get(&node) else {
                contours.insert(node, vec![(-half, half)]);
                continue;
            };

            let mut merged: Contour = Vec::new();
            let mut shifts = Vec::with_capacity(kids.len());
            for &kid in kids {
                let contour = contours.remove(&kid).unwrap_or_default();
                let shift = if merged.is_empty() {
                    0.0
                } else {
                    merged
                        .iter()
                        .zip(&contour)
                        .map(|(placed, next)| placed.1 - next.0 + self.node_sep)
                        .fold(f64::NEG_INFINITY, f64::max)
                };
                for (level, &(lo, hi)) in contour.iter().enumerate() {
                    match merged.get_mut(level) {
                        Some(extent) => {
                            extent.0 = extent.0.min(lo + shift);
                            extent.1 = extent.1.max(hi + shift);
                        }
                        None => merged.push((lo + shift, hi + shift)),
                    }
                }
                shifts.push(shift);
            }

            let first = shifts.first().copied().unwrap_or(0.0);
            let last = shifts.last().copied().unwrap_or(0.0);
            let centre = (first + last) / 2.0;
            for (&kid, shift) in kids.iter().zip(shifts) {
                offsets.insert(kid, shift - centre);
            }
            let contour = std::iter::once((-half, half))
                .chain(merged.into_iter().map(|(lo, hi)| (lo - centre, hi - centre)))
                .collect();
            contours.insert(node, contour);
        }

        let mut centres: HashMap<usize, f64> = HashMap::from([(root, 0.0)]);
        let mut columns: Vec<f64> = Vec::new();
        for &node in &order {
            let centre = centres.get(&node).copied().unwrap_or(0.0);
            for &kid in tree_children.get(&node).into_iter().flatten() {
                centres.insert(kid, centre + offsets.get(&kid).copied().unwrap_or(0.0));
            }
            let level = depth[&node];
            if columns.len() <= level {
                columns.resize(level + 1, 0.0);
            }
            columns[level] = columns[level].max(self.rank_extent[node]);
        }

        let mut column_start = Vec::with_capacity(columns.len());
        let mut next = 0.0;
        for width in &columns {
            column_start.push(next);
            next += width + self.rank_sep;
        }

        let top = order
            .iter()
            .map(|node| centres[node] - self.breadth_extent[*node] / 2.0)
            .fold(f64::INFINITY, f64::min);
        let mut bottom = f64::NEG_INFINITY;
        for &node in &order {
            let breadth = centres[&node] - self.breadth_extent[node] / 2.0 - top + self.cursor;
            bottom = bottom.max(breadth + self.breadth_extent[node]);
            self.placed[node] = (column_start[depth[&node]], breadth);
        }
        self.cursor = bottom + self.node_sep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::layout::test_support::assert_no_overlap;
    use crate::layout::Direction;

    fn position(positions: &PositionMap, id: &str) -> Position {
        positions[&NodeId::from(id)]
    }

    #[test]
    fn test_empty_input() {
        assert!(layout_tree(&[], &[], &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn test_single_node_at_origin() {
        let config = LayoutConfig {
            origin: Position::new(30.0, -20.0),
            ..Default::default()
        };
        let positions = layout_tree(&[LayoutNode::new("a", 100.0, 50.0)], &[], &config);
        assert_eq!(position(&positions, "a"), Position::new(30.0, -20.0));
    }

    #[test]
    fn test_children_follow_edge_order() {
        let nodes = vec![
            LayoutNode::new("root", 100.0, 100.0),
            LayoutNode::new("z", 100.0, 100.0),
            LayoutNode::new("a", 100.0, 100.0),
        ];
        let edges = vec![LayoutEdge::new("root", "z"), LayoutEdge::new("root", "a")];
        let positions = layout_tree(&nodes, &edges, &LayoutConfig::default());

        let root = position(&positions, "root");
        let z = position(&positions, "z");
        let a = position(&positions, "a");
        assert_eq!(z.x, 240.0);
        assert_eq!(a.x, 240.0);
        assert!(z.y < a.y);
        assert_eq!(a.y - z.y, 180.0);
        // parent centred between its children
        assert_eq!(root.y, (z.y + a.y) / 2.0);
        assert_no_overlap(&nodes, &positions);
    }

    #[test]
    fn test_top_to_bottom() {
        let config = LayoutConfig {
            direction: Direction::TopToBottom,
            ..Default::default()
        };
        let nodes = vec![LayoutNode::new("p", 100.0, 60.0), LayoutNode::new("c", 100.0, 60.0)];
        let positions = layout_tree(&nodes, &[LayoutEdge::new("p", "c")], &config);
        assert_eq!(position(&positions, "p"), Position::new(0.0, 0.0));
        assert_eq!(position(&positions, "c"), Position::new(0.0, 200.0));
    }

    #[test]
    fn test_deep_subtrees_do_not_collide() {
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for id in ["r", "a", "b", "a1", "a2", "b1", "b2", "a11", "b11", "b12"] {
            nodes.push(LayoutNode::new(id, 120.0, 40.0 + id.len() as f64 * 10.0));
        }
        for (source, target) in [
            ("r", "a"),
            ("r", "b"),
            ("a", "a1"),
            ("a", "a2"),
            ("b", "b1"),
            ("b", "b2"),
            ("a1", "a11"),
            ("b1", "b11"),
            ("b1", "b12"),
        ] {
            edges.push(LayoutEdge::new(source, target));
        }
        let positions = layout_tree(&nodes, &edges, &LayoutConfig::default());
        assert_eq!(positions.len(), nodes.len());
        assert_no_overlap(&nodes, &positions);
        assert_eq!(layout_tree(&nodes, &edges, &LayoutConfig::default()), positions);
    }

    #[test]
    fn test_disjoint_trees_stack() {
        let nodes = vec![
            LayoutNode::new("a", 100.0, 100.0),
            LayoutNode::new("b", 100.0, 50.0),
        ];
        let positions = layout_tree(&nodes, &[], &LayoutConfig::default());
        assert_eq!(position(&positions, "a"), Position::new(0.0, 0.0));
        assert_eq!(position(&positions, "b"), Position::new(0.0, 180.0));
    }

    #[test]
    fn test_cycles_are_still_placed() {
        let nodes = vec![
            LayoutNode::new("a", 100.0, 100.0),
            LayoutNode::new("b", 100.0, 100.0),
            LayoutNode::new("c", 100.0, 100.0),
        ];
        let edges = vec![
            LayoutEdge::new("a", "b"),
            LayoutEdge::new("b", "a"),
            LayoutEdge::new("a", "a"),
            LayoutEdge::new("a", "missing"),
        ];
        let positions = layout_tree(&nodes, &edges, &LayoutConfig::default());
        assert_eq!(positions.len(), 3);
        assert_eq!(position(&positions, "b").x, 240.0);
        assert_no_overlap(&nodes, &positions);
    }
}
