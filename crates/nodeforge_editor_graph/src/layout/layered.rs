// SPDX-License-Identifier: MIT OR Apache-2.0
//! Layered layout for arbitrary directed graphs.
//!
//! Pipeline:
//! 1. cycle removal (greedy source/sink peeling)
//! 2. layer assignment (longest path over a topological order)
//! 3. crossing minimization (barycenter sweeps, best result kept)
//! 4. coordinate assignment (centering, median refinement, overlap repair)
//!
//! Work happens in rank/breadth space; the direction only decides how those
//! map onto x and y at the end.

use super::{prepare_nodes, LayoutConfig, LayoutEdge, LayoutNode, LayoutSpacing};
use crate::graph::PositionMap;
use crate::node::NodeId;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

const MAX_CROSSING_ITERATIONS: usize = 24;
const MEDIAN_PASSES: usize = 4;

struct LayeredGraph {
    num_nodes: usize,
    adj: Vec<Vec<usize>>,
    radj: Vec<Vec<usize>>,
    rank_extent: Vec<f64>,
    breadth_extent: Vec<f64>,
}

impl LayeredGraph {
    fn new(nodes: &[LayoutNode], edges: &[LayoutEdge], config: &LayoutConfig) -> Self {
        let num_nodes = nodes.len();
        let index: HashMap<&NodeId, usize> = nodes.iter().enumerate().map(|(i, node)| (&node.id, i)).collect();
        let mut adj = vec![Vec::new(); num_nodes];
        let mut radj = vec![Vec::new(); num_nodes];
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        for edge in edges {
            let (Some(&u), Some(&v)) = (index.get(&edge.source), index.get(&edge.target)) else {
                continue;
            };
            if u == v || !seen.insert((u, v)) {
                continue;
            }
            adj[u].push(v);
            radj[v].push(u);
        }
        Self {
            num_nodes,
            adj,
            radj,
            rank_extent: nodes.iter().map(|node| config.axes(node.size).0).collect(),
            breadth_extent: nodes.iter().map(|node| config.axes(node.size).1).collect(),
        }
    }
}

/// Place an arbitrary directed graph in layers.
///
/// Edges with unknown endpoints, self-loops and duplicates are ignored.
/// Positions are top-left corners, normalized so the drawing starts at the
/// configured margin (plus origin).
pub fn layout_layered(nodes: &[LayoutNode], edges: &[LayoutEdge], config: &LayoutConfig) -> PositionMap {
    let nodes = prepare_nodes(nodes, config.node_size);
    if nodes.is_empty() {
        return PositionMap::new();
    }
    let spacing = config.spacing.sanitized();

    let mut graph = LayeredGraph::new(&nodes, edges, config);
    let reversed = remove_cycles(&mut graph);
    let layer_of = assign_layers(&graph);
    let layers = minimize_crossings(&layer_of, &graph);
    let (rank, breadth) = assign_coordinates(&layers, &graph, &spacing);

    let corners: Vec<(f64, f64)> = (0..graph.num_nodes)
        .map(|v| {
            (
                rank[v] - graph.rank_extent[v] / 2.0,
                breadth[v] - graph.breadth_extent[v] / 2.0,
            )
        })
        .collect();
    let min_rank = corners.iter().map(|c| c.0).fold(f64::INFINITY, f64::min);
    let min_breadth = corners.iter().map(|c| c.1).fold(f64::INFINITY, f64::min);

    tracing::debug!(
        "Layered layout: {} node(s), {} layer(s), {} reversed edge(s)",
        graph.num_nodes,
        layers.len(),
        reversed
    );

    nodes
        .iter()
        .zip(corners)
        .map(|(node, (r, b))| {
            let mut position = config.to_canvas(r - min_rank, b - min_breadth);
            position.x += spacing.margin_x;
            position.y += spacing.margin_y;
            (node.id.clone(), position)
        })
        .collect()
}

/// Reverse edges until the graph is acyclic; returns the reversed count
fn remove_cycles(graph: &mut LayeredGraph) -> usize {
    let n = graph.num_nodes;
    let mut in_deg: Vec<usize> = graph.radj.iter().map(Vec::len).collect();
    let mut out_deg: Vec<usize> = graph.adj.iter().map(Vec::len).collect();
    let mut removed = vec![false; n];

    let mut left_order: Vec<usize> = Vec::new();
    let mut right_order: Vec<usize> = Vec::new();
    let mut remaining = n;

    while remaining > 0 {
        let mut progress = false;

        for v in 0..n {
            if !removed[v] && out_deg[v] == 0 {
                removed[v] = true;
                remaining -= 1;
                right_order.push(v);
                for &u in &graph.radj[v] {
                    if !removed[u] {
                        out_deg[u] = out_deg[u].saturating_sub(1);
                    }
                }
                progress = true;
            }
        }

        for v in 0..n {
            if !removed[v] && in_deg[v] == 0 {
                removed[v] = true;
                remaining -= 1;
                left_order.push(v);
                for &w in &graph.adj[v] {
                    if !removed[w] {
                        in_deg[w] = in_deg[w].saturating_sub(1);
                    }
                }
                progress = true;
            }
        }

        if progress || remaining == 0 {
            continue;
        }
        // Only cycles left: peel the node with the largest out-in surplus.
        let best = (0..n).filter(|&v| !removed[v]).max_by(|&a, &b| {
            let da = out_deg[a] as isize - in_deg[a] as isize;
            let db = out_deg[b] as isize - in_deg[b] as isize;
            da.cmp(&db).then_with(|| b.cmp(&a))
        });
        let Some(v) = best else {
            break;
        };
        removed[v] = true;
        remaining -= 1;
        left_order.push(v);
        for &w in &graph.adj[v] {
            if !removed[w] {
                in_deg[w] = in_deg[w].saturating_sub(1);
            }
        }
        for &u in &graph.radj[v] {
            if !removed[u] {
                out_deg[u] = out_deg[u].saturating_sub(1);
            }
        }
    }

    right_order.reverse();
    left_order.extend(right_order);
    let mut pos = vec![0usize; n];
    for (i, &v) in left_order.iter().enumerate() {
        pos[v] = i;
    }

    let mut reversed = 0;
    let mut adj = vec![Vec::new(); n];
    let mut radj = vec![Vec::new(); n];
    for u in 0..n {
        for &v in &graph.adj[u] {
            if pos[u] > pos[v] {
                reversed += 1;
                if !adj[v].contains(&u) {
                    adj[v].push(u);
                    radj[u].push(v);
                }
            } else if !adj[u].contains(&v) {
                adj[u].push(v);
                radj[v].push(u);
            }
        }
    }
    graph.adj = adj;
    graph.radj = radj;
    reversed
}

/// Longest-path layering over a deterministic topological order
fn assign_layers(graph: &LayeredGraph) -> Vec<usize> {
    let n = graph.num_nodes;
    let mut in_deg: Vec<usize> = graph.radj.iter().map(Vec::len).collect();
    let mut queue: BinaryHeap<Reverse<usize>> = (0..n).filter(|&v| in_deg[v] == 0).map(Reverse).collect();
    let mut topo = Vec::with_capacity(n);
    while let Some(Reverse(u)) = queue.pop() {
        topo.push(u);
        for &v in &graph.adj[u] {
            in_deg[v] -= 1;
            if in_deg[v] == 0 {
                queue.push(Reverse(v));
            }
        }
    }

    let mut layer = vec![0usize; n];
    for &u in &topo {
        for &v in &graph.adj[u] {
            layer[v] = layer[v].max(layer[u] + 1);
        }
    }
    layer
}

fn count_crossings(layers: &[Vec<usize>], adj: &[Vec<usize>], num_nodes: usize) -> usize {
    let mut crossings = 0;
    let mut pos = vec![usize::MAX; num_nodes];
    for pair in layers.windows(2) {
        for (p, &v) in pair[1].iter().enumerate() {
            pos[v] = p;
        }
        let mut edge_pairs: Vec<(usize, usize)> = Vec::new();
        for (pa, &u) in pair[0].iter().enumerate() {
            for &v in &adj[u] {
                if pos[v] != usize::MAX && pair[1].get(pos[v]) == Some(&v) {
                    edge_pairs.push((pa, pos[v]));
                }
            }
        }
        for (i, &(a1, b1)) in edge_pairs.iter().enumerate() {
            for &(a2, b2) in &edge_pairs[i + 1..] {
                if (a1 < a2 && b1 > b2) || (a1 > a2 && b1 < b2) {
                    crossings += 1;
                }
            }
        }
    }
    crossings
}

fn minimize_crossings(layer_of: &[usize], graph: &LayeredGraph) -> Vec<Vec<usize>> {
    let num_layers = layer_of.iter().copied().max().map_or(0, |max| max + 1);
    let mut layers: Vec<Vec<usize>> = vec![Vec::new(); num_layers];
    for (v, &layer) in layer_of.iter().enumerate() {
        layers[layer].push(v);
    }

    let mut best_crossings = count_crossings(&layers, &graph.adj, graph.num_nodes);
    let mut best_layers = layers.clone();
    for iteration in 0..MAX_CROSSING_ITERATIONS {
        if best_crossings == 0 {
            break;
        }
        if iteration % 2 == 0 {
            for i in 1..num_layers {
                barycenter_sort(&mut layers, i, graph, true);
            }
        } else {
            for i in (0..num_layers.saturating_sub(1)).rev() {
                barycenter_sort(&mut layers, i, graph, false);
            }
        }
        let crossings = count_crossings(&layers, &graph.adj, graph.num_nodes);
        if crossings < best_crossings {
            best_crossings = crossings;
            best_layers = layers.clone();
        }
    }
    best_layers
}

fn barycenter_sort(layers: &mut [Vec<usize>], layer_idx: usize, graph: &LayeredGraph, forward: bool) {
    let reference = if forward {
        layer_idx.checked_sub(1)
    } else {
        Some(layer_idx + 1).filter(|&i| i < layers.len())
    };
    let Some(reference) = reference else {
        return;
    };
    let ref_pos: HashMap<usize, usize> = layers[reference].iter().enumerate().map(|(p, &v)| (v, p)).collect();

    let mut bary: Vec<(usize, f64)> = layers[layer_idx]
        .iter()
        .map(|&v| {
            let neighbors = if forward { &graph.radj[v] } else { &graph.adj[v] };
            let placed: Vec<f64> = neighbors
                .iter()
                .filter_map(|u| ref_pos.get(u))
                .map(|&p| p as f64)
                .collect();
            if placed.is_empty() {
                (v, f64::MAX)
            } else {
                (v, placed.iter().sum::<f64>() / placed.len() as f64)
            }
        })
        .collect();
    bary.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    layers[layer_idx] = bary.into_iter().map(|(v, _)| v).collect();
}

/// Centre coordinates `(rank, breadth)` per node
fn assign_coordinates(
    layers: &[Vec<usize>],
    graph: &LayeredGraph,
    spacing: &LayoutSpacing,
) -> (Vec<f64>, Vec<f64>) {
    let n = graph.num_nodes;
    let mut rank = vec![0.0f64; n];
    let mut breadth = vec![0.0f64; n];

    let mut layer_start = 0.0;
    for layer in layers {
        let depth = layer
            .iter()
            .map(|&v| graph.rank_extent[v])
            .fold(0.0f64, f64::max);
        let total: f64 = layer.iter().map(|&v| graph.breadth_extent[v]).sum::<f64>()
            + layer.len().saturating_sub(1) as f64 * spacing.node_sep;
        let mut cursor = -total / 2.0;
        for &v in layer {
            let extent = graph.breadth_extent[v];
            breadth[v] = cursor + extent / 2.0;
            rank[v] = layer_start + depth / 2.0;
            cursor += extent + spacing.node_sep;
        }
        layer_start += depth + spacing.rank_sep;
    }

    for _ in 0..MEDIAN_PASSES {
        for layer in layers {
            for &v in layer {
                let mut neighbors: Vec<f64> = graph.adj[v]
                    .iter()
                    .chain(&graph.radj[v])
                    .map(|&u| breadth[u])
                    .collect();
                if neighbors.is_empty() {
                    continue;
                }
                neighbors.sort_by(f64::total_cmp);
                let median = neighbors[neighbors.len() / 2];
                breadth[v] = (breadth[v] + median) / 2.0;
            }
        }

        for layer in layers {
            let mut sorted = layer.clone();
            sorted.sort_by(|&a, &b| breadth[a].total_cmp(&breadth[b]).then_with(|| a.cmp(&b)));
            for pair in sorted.windows(2) {
                let (prev, curr) = (pair[0], pair[1]);
                let min_gap = (graph.breadth_extent[prev] + graph.breadth_extent[curr]) / 2.0 + spacing.node_sep;
                if breadth[curr] - breadth[prev] < min_gap {
                    breadth[curr] = breadth[prev] + min_gap;
                }
            }
        }
    }

    (rank, breadth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Position;
    use crate::layout::test_support::assert_no_overlap;
    use crate::layout::Direction;

    fn square(id: &str) -> LayoutNode {
        LayoutNode::new(id, 100.0, 60.0)
    }

    fn position(positions: &PositionMap, id: &str) -> Position {
        positions[&NodeId::from(id)]
    }

    #[test]
    fn test_empty_input() {
        assert!(layout_layered(&[], &[LayoutEdge::new("a", "b")], &LayoutConfig::default()).is_empty());
    }

    #[test]
    fn test_single_node_sits_at_margin() {
        let config = LayoutConfig {
            origin: Position::new(1000.0, 2000.0),
            ..Default::default()
        };
        let positions = layout_layered(&[square("only")], &[], &config);
        assert_eq!(position(&positions, "only"), Position::new(1040.0, 2040.0));
    }

    #[test]
    fn test_chain_left_to_right() {
        let nodes = vec![square("a"), square("b"), square("c")];
        let edges = vec![LayoutEdge::new("a", "b"), LayoutEdge::new("b", "c")];
        let positions = layout_layered(&nodes, &edges, &LayoutConfig::default());
        assert_eq!(position(&positions, "a"), Position::new(40.0, 40.0));
        assert_eq!(position(&positions, "b"), Position::new(280.0, 40.0));
        assert_eq!(position(&positions, "c"), Position::new(520.0, 40.0));
    }

    #[test]
    fn test_chain_top_to_bottom() {
        let config = LayoutConfig {
            direction: Direction::TopToBottom,
            ..Default::default()
        };
        let nodes = vec![square("a"), square("b")];
        let positions = layout_layered(&nodes, &[LayoutEdge::new("a", "b")], &config);
        assert_eq!(position(&positions, "a"), Position::new(40.0, 40.0));
        assert_eq!(position(&positions, "b"), Position::new(40.0, 240.0));
    }

    #[test]
    fn test_cycle_and_noise_edges() {
        let nodes = vec![square("a"), square("b"), square("c")];
        let edges = vec![
            LayoutEdge::new("a", "b"),
            LayoutEdge::new("b", "c"),
            LayoutEdge::new("c", "a"),
            LayoutEdge::new("a", "b"),
            LayoutEdge::new("b", "b"),
            LayoutEdge::new("b", "ghost"),
        ];
        let positions = layout_layered(&nodes, &edges, &LayoutConfig::default());
        assert_eq!(positions.len(), 3);
        assert_no_overlap(&nodes, &positions);
        let ranks: HashSet<u64> = positions.values().map(|p| p.x.to_bits()).collect();
        assert_eq!(ranks.len(), 3);
    }

    #[test]
    fn test_mixed_sizes_do_not_overlap_and_are_deterministic() {
        let nodes: Vec<LayoutNode> = ["root", "a", "b", "c", "d", "e", "f", "g"]
            .iter()
            .enumerate()
            .map(|(i, id)| LayoutNode::new(*id, 80.0 + i as f64 * 30.0, 40.0 + (i % 3) as f64 * 70.0))
            .collect();
        let edges: Vec<LayoutEdge> = [
            ("root", "a"),
            ("root", "b"),
            ("root", "c"),
            ("a", "d"),
            ("b", "d"),
            ("c", "e"),
            ("a", "f"),
            ("f", "g"),
            ("e", "g"),
            ("d", "g"),
        ]
        .iter()
        .map(|(s, t)| LayoutEdge::new(*s, *t))
        .collect();

        let config = LayoutConfig::default();
        let positions = layout_layered(&nodes, &edges, &config);
        assert_no_overlap(&nodes, &positions);

        let mut shuffled_nodes = nodes.clone();
        shuffled_nodes.reverse();
        assert_eq!(layout_layered(&shuffled_nodes, &edges, &config), positions);
    }

    #[test]
    fn test_crossings_counted() {
        let adj = vec![vec![3], vec![2], vec![], vec![]];
        let crossed = vec![vec![0, 1], vec![2, 3]];
        assert_eq!(count_crossings(&crossed, &adj, 4), 1);
        let straight = vec![vec![0, 1], vec![3, 2]];
        assert_eq!(count_crossings(&straight, &adj, 4), 0);
    }
}
