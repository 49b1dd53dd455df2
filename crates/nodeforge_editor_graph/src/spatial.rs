// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spatial index over node bounding boxes.
//!
//! Boxes live in an R-tree. Each entry carries its insertion sequence so a
//! query reports hits in insertion order, keeping containment deterministic
//! regardless of the tree's internal shape.

use crate::geometry::Aabb;
use crate::graph::Graph;
use crate::node::NodeId;
use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};
use std::collections::HashMap;

type Entry = GeomWithData<Rectangle<[f64; 2]>, (u64, NodeId)>;

fn rectangle(aabb: &Aabb) -> Rectangle<[f64; 2]> {
    Rectangle::from_corners([aabb.min_x, aabb.min_y], [aabb.max_x, aabb.max_y])
}

/// R-tree backed bounding-box index keyed by node id
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    tree: RTree<Entry>,
    /// Insertion sequence and box of every indexed node
    boxes: HashMap<NodeId, (u64, Aabb)>,
    next_seq: u64,
}

impl SpatialIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every measured node of a graph by its absolute bounding box.
    ///
    /// Nodes are inserted in storage order; unmeasured nodes are skipped.
    pub fn from_graph(graph: &Graph) -> Self {
        let mut boxes = HashMap::new();
        let mut entries = Vec::new();
        for (seq, node) in (0u64..).zip(graph.nodes()) {
            match graph.absolute_bounds(&node.id).filter(is_finite) {
                Some(aabb) => {
                    entries.push(GeomWithData::new(rectangle(&aabb), (seq, node.id.clone())));
                    boxes.insert(node.id.clone(), (seq, aabb));
                }
                None => tracing::debug!("Skipping unmeasured node {} in spatial index", node.id),
            }
        }
        Self {
            tree: RTree::bulk_load(entries),
            next_seq: graph.node_count() as u64,
            boxes,
        }
    }

    /// Number of indexed boxes
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Insert or replace the box of a node; a replaced box keeps its place in query order
    pub fn insert(&mut self, id: NodeId, aabb: Aabb) {
        if !is_finite(&aabb) {
            tracing::warn!("Ignoring non-finite bounds for node {}", id);
            self.remove(&id);
            return;
        }

        let seq = match self.boxes.get(&id) {
            Some(&(seq, old)) => {
                self.tree.remove(&GeomWithData::new(rectangle(&old), (seq, id.clone())));
                seq
            }
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.tree.insert(GeomWithData::new(rectangle(&aabb), (seq, id.clone())));
        self.boxes.insert(id, (seq, aabb));
    }

    /// Remove the box of a node
    pub fn remove(&mut self, id: &NodeId) {
        if let Some((seq, aabb)) = self.boxes.remove(id) {
            self.tree.remove(&GeomWithData::new(rectangle(&aabb), (seq, id.clone())));
        }
    }

    /// The indexed box of a node
    pub fn bounds(&self, id: &NodeId) -> Option<Aabb> {
        self.boxes.get(id).map(|&(_, aabb)| aabb)
    }

    /// Ids of all boxes overlapping `rect` (edges inclusive), in insertion order
    pub fn query_rect(&self, rect: &Aabb) -> Vec<NodeId> {
        let envelope = AABB::from_corners([rect.min_x, rect.min_y], [rect.max_x, rect.max_y]);
        let mut hits: Vec<&(u64, NodeId)> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &entry.data)
            .collect();
        hits.sort_unstable_by_key(|(seq, _)| *seq);
        hits.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// Ids of all boxes containing the point, in insertion order
    pub fn query_point(&self, x: f64, y: f64) -> Vec<NodeId> {
        self.query_rect(&Aabb::new(x, y, x, y))
    }
}

fn is_finite(aabb: &Aabb) -> bool {
    aabb.min_x.is_finite() && aabb.min_y.is_finite() && aabb.max_x.is_finite() && aabb.max_y.is_finite()
}
