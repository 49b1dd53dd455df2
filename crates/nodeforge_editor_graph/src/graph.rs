// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph store containing nodes and edges.
//!
//! The node list is ordered: it is the render/storage order, and every group
//! appears before the nodes it parents.

use crate::connection::Edge;
use crate::geometry::{Aabb, Position, Size};
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{PinMultiplicity, LINK_OUTPUT_HANDLE_ID};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Absolute top-left positions keyed by node id
pub type PositionMap = IndexMap<NodeId, Position>;

/// The editable node graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// Node the document body is rooted at
    pub root_node_id: Option<NodeId>,
    /// Nodes in render/storage order
    nodes: IndexMap<NodeId, Node>,
    /// Edges in insertion order
    edges: Vec<Edge>,
}

impl Graph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from parts.
    ///
    /// Validates id uniqueness and parent order, and holds every edge to the
    /// rules [`Graph::connect`] enforces: both ends exist, the pin is declared,
    /// the target takes input and has no other inbound edge, and a `single`
    /// pin carries at most one edge. Conflicts are rejected, not replaced.
    pub fn from_parts(
        root_node_id: Option<NodeId>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self {
            root_node_id,
            nodes: IndexMap::with_capacity(nodes.len()),
            edges: Vec::with_capacity(edges.len()),
        };
        for node in nodes {
            graph.add_node(node)?;
        }
        for edge in edges {
            graph.check_edge(&edge.source, &edge.source_pin, &edge.target)?;
            if graph.incoming(&edge.target).is_some() {
                return Err(GraphError::MultipleInbound(edge.target));
            }
            let single =
                graph.pin_multiplicity(&edge.source, &edge.source_pin) == Some(PinMultiplicity::Single);
            if single && graph.outgoing_for_pin(&edge.source, &edge.source_pin).next().is_some() {
                return Err(GraphError::PinOccupied {
                    node: edge.source,
                    pin: edge.source_pin,
                });
            }
            graph.edges.push(edge);
        }
        graph.check_parent_order()?;
        Ok(graph)
    }

    /// Add a node to the end of the node list
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        let id = node.id.clone();
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    /// Remove a node and its edges.
    ///
    /// Children of a removed group are re-homed to the group's own parent with
    /// their on-canvas position unchanged.
    pub fn remove_node(&mut self, node_id: &NodeId) -> Option<Node> {
        let removed_abs = self.absolute_position(node_id)?;
        let removed_parent = self.nodes.get(node_id)?.parent_id.clone();
        let parent_abs = removed_parent
            .as_ref()
            .and_then(|id| self.absolute_position(id))
            .unwrap_or(Position::ZERO);

        for node in self.nodes.values_mut() {
            if node.parent_id.as_ref() == Some(node_id) {
                let absolute = removed_abs.offset_by(node.position);
                node.position = absolute.relative_to(parent_abs);
                node.parent_id = removed_parent.clone();
            }
        }

        self.edges.retain(|e| !e.involves_node(node_id));
        if self.root_node_id.as_ref() == Some(node_id) {
            self.root_node_id = None;
        }
        self.nodes.shift_remove(node_id)
    }

    /// Whether a node exists
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    /// Get all nodes in storage order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs in storage order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Move a node (position is parent-relative)
    pub fn move_node(&mut self, node_id: &NodeId, position: Position) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
        node.position = position;
        Ok(())
    }

    /// Record the on-screen size of a rendered node
    pub fn set_measured(&mut self, node_id: &NodeId, size: Size) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.clone()))?;
        node.measured = Some(size);
        Ok(())
    }

    /// Multiplicity of an output pin, if the node declares it
    pub fn pin_multiplicity(&self, node_id: &NodeId, pin: &str) -> Option<PinMultiplicity> {
        match &self.nodes.get(node_id)?.kind {
            NodeKind::Data(data) => data.pin(pin).map(|p| p.multiplicity),
            NodeKind::Link(_) if pin == LINK_OUTPUT_HANDLE_ID => Some(PinMultiplicity::Single),
            _ => None,
        }
    }

    /// Connect `source`'s output pin to `target`.
    ///
    /// A child has exactly one parent in the document, so an existing inbound
    /// edge on `target` is replaced. A `single` pin keeps only the new edge.
    pub fn connect(
        &mut self,
        source: &NodeId,
        source_pin: &str,
        target: &NodeId,
    ) -> Result<String, GraphError> {
        self.check_edge(source, source_pin, target)?;

        let single = self.pin_multiplicity(source, source_pin) == Some(PinMultiplicity::Single);
        let before = self.edges.len();
        self.edges.retain(|e| {
            let conflicting_input = e.target == *target;
            let conflicting_output = single && e.source == *source && e.source_pin == source_pin;
            !(conflicting_input || conflicting_output)
        });
        if self.edges.len() != before {
            tracing::debug!(
                "Replaced {} conflicting edge(s) connecting {}:{} -> {}",
                before - self.edges.len(),
                source,
                source_pin,
                target
            );
        }

        let edge = Edge::new(source.clone(), source_pin, target.clone());
        let id = edge.id.clone();
        self.edges.push(edge);
        Ok(id)
    }

    fn check_edge(&self, source: &NodeId, source_pin: &str, target: &NodeId) -> Result<(), GraphError> {
        let source_node = self
            .nodes
            .get(source)
            .ok_or_else(|| GraphError::NodeNotFound(source.clone()))?;
        let target_node = self
            .nodes
            .get(target)
            .ok_or_else(|| GraphError::NodeNotFound(target.clone()))?;

        if source == target {
            return Err(GraphError::SelfLoop(source.clone()));
        }
        if !source_node.has_output_pin(source_pin) {
            return Err(GraphError::PinNotFound {
                node: source.clone(),
                pin: source_pin.to_string(),
            });
        }
        if !target_node.accepts_input() {
            return Err(GraphError::TargetRejectsInput(target.clone()));
        }
        Ok(())
    }

    /// Remove an edge by id
    pub fn disconnect(&mut self, edge_id: &str) -> Option<Edge> {
        let index = self.edges.iter().position(|e| e.id == edge_id)?;
        Some(self.edges.remove(index))
    }

    /// Get all edges
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges leaving a node, in insertion order
    pub fn outgoing<'a>(&'a self, node_id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.source == *node_id)
    }

    /// Edges leaving a specific pin, in insertion order
    pub fn outgoing_for_pin<'a>(
        &'a self,
        node_id: &'a NodeId,
        pin: &'a str,
    ) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing(node_id).filter(move |e| e.source_pin == pin)
    }

    /// The inbound edge of a node (the last one wins if several exist)
    pub fn incoming(&self, node_id: &NodeId) -> Option<&Edge> {
        self.edges.iter().rev().find(|e| e.target == *node_id)
    }

    /// Children of a node ordered by pin declaration, then edge insertion
    pub fn ordered_children(&self, node_id: &NodeId) -> Vec<NodeId> {
        let Some(node) = self.nodes.get(node_id) else {
            return Vec::new();
        };
        match &node.kind {
            NodeKind::Data(data) => data
                .output_pins
                .iter()
                .flat_map(|pin| self.outgoing_for_pin(node_id, &pin.schema_key))
                .map(|e| e.target.clone())
                .collect(),
            NodeKind::Link(_) => self
                .outgoing_for_pin(node_id, LINK_OUTPUT_HANDLE_ID)
                .map(|e| e.target.clone())
                .collect(),
            NodeKind::RawJson(_) | NodeKind::Group(_) | NodeKind::Comment(_) => Vec::new(),
        }
    }

    /// Ids in `subset` whose parent (by inbound edge) is not in `subset`
    pub fn root_ids(&self, subset: &[NodeId]) -> Vec<NodeId> {
        let members: IndexSet<&NodeId> = subset.iter().collect();
        subset
            .iter()
            .filter(|id| {
                self.incoming(id)
                    .map_or(true, |edge| !members.contains(&edge.source))
            })
            .cloned()
            .collect()
    }

    /// Absolute position of a node, walking the parent chain
    pub fn absolute_position(&self, node_id: &NodeId) -> Option<Position> {
        let mut node = self.nodes.get(node_id)?;
        let mut position = node.position;
        // Bounded walk: a malformed parent chain cannot loop forever.
        for _ in 0..self.nodes.len() {
            let Some(parent_id) = &node.parent_id else {
                return Some(position);
            };
            let Some(parent) = self.nodes.get(parent_id) else {
                tracing::warn!("Node {} references missing parent {}", node.id, parent_id);
                return Some(position);
            };
            position = position.offset_by(parent.position);
            node = parent;
        }
        tracing::warn!("Parent chain of node {} does not terminate", node_id);
        Some(position)
    }

    /// Absolute bounding box from the measured size, if the node has been measured
    pub fn absolute_bounds(&self, node_id: &NodeId) -> Option<Aabb> {
        let size = self.nodes.get(node_id)?.measured?;
        Some(Aabb::from_origin_size(self.absolute_position(node_id)?, size))
    }

    /// Commit absolute positions, converting each to its parent's frame
    pub fn apply_positions(&mut self, positions: &PositionMap) {
        let relative: Vec<(NodeId, Position)> = positions
            .iter()
            .filter(|(id, _)| self.contains(id))
            .map(|(id, absolute)| {
                let parent_abs = self
                    .nodes
                    .get(id)
                    .and_then(|n| n.parent_id.as_ref())
                    .and_then(|parent| self.absolute_position(parent))
                    .unwrap_or(Position::ZERO);
                (id.clone(), absolute.relative_to(parent_abs))
            })
            .collect();
        for (id, position) in relative {
            if let Some(node) = self.nodes.get_mut(&id) {
                node.position = position;
            }
        }
    }

    /// Replace the node list wholesale (e.g. with a containment result).
    ///
    /// The new list must hold exactly the current ids and satisfy the parent ordering.
    pub fn replace_nodes(&mut self, nodes: Vec<Node>) -> Result<(), GraphError> {
        let mut replacement = IndexMap::with_capacity(nodes.len());
        for node in nodes {
            if !self.nodes.contains_key(&node.id) {
                return Err(GraphError::NodeNotFound(node.id));
            }
            if replacement.contains_key(&node.id) {
                return Err(GraphError::DuplicateNode(node.id));
            }
            replacement.insert(node.id.clone(), node);
        }
        if let Some(missing) = self.nodes.keys().find(|id| !replacement.contains_key(*id)) {
            return Err(GraphError::NodeOmitted(missing.clone()));
        }
        let previous = std::mem::replace(&mut self.nodes, replacement);
        if let Err(err) = self.check_parent_order() {
            self.nodes = previous;
            return Err(err);
        }
        Ok(())
    }

    /// Verify every parent is a group listed before its children
    pub fn check_parent_order(&self) -> Result<(), GraphError> {
        let mut seen_groups: IndexSet<&NodeId> = IndexSet::new();
        for node in self.nodes.values() {
            if let Some(parent_id) = &node.parent_id {
                match self.nodes.get(parent_id) {
                    Some(parent) if parent.is_group() => {
                        if !seen_groups.contains(parent_id) {
                            return Err(GraphError::ParentAfterChild {
                                node: node.id.clone(),
                                parent: parent_id.clone(),
                            });
                        }
                    }
                    _ => {
                        return Err(GraphError::InvalidParent {
                            node: node.id.clone(),
                            parent: parent_id.clone(),
                        })
                    }
                }
            }
            if node.is_group() {
                seen_groups.insert(&node.id);
            }
        }
        Ok(())
    }

    /// Take the node list and edges out of the graph
    pub fn into_parts(self) -> (Option<NodeId>, Vec<Node>, Vec<Edge>) {
        (
            self.root_node_id,
            self.nodes.into_values().collect(),
            self.edges,
        )
    }
}

/// Error when mutating the graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node id already in use
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// Replacement node list dropped a node
    #[error("Node missing from replacement list: {0}")]
    NodeOmitted(NodeId),

    /// Output pin not declared on the source node
    #[error("Pin {pin} not found on node {node}")]
    PinNotFound {
        /// Source node
        node: NodeId,
        /// Requested pin
        pin: String,
    },

    /// Groups and comments cannot be connected to
    #[error("Node {0} does not accept connections")]
    TargetRejectsInput(NodeId),

    /// Self-loop not allowed
    #[error("Self-loop not allowed on node {0}")]
    SelfLoop(NodeId),

    /// A node already has an inbound edge
    #[error("Node {0} has more than one inbound edge")]
    MultipleInbound(NodeId),

    /// A `single` pin already carries an edge
    #[error("Single pin {pin} on node {node} has more than one edge")]
    PinOccupied {
        /// Source node
        node: NodeId,
        /// Pin schema key
        pin: String,
    },

    /// Parent is missing or not a group
    #[error("Node {node} has invalid parent {parent}")]
    InvalidParent {
        /// Child node
        node: NodeId,
        /// Referenced parent
        parent: NodeId,
    },

    /// Parent listed after its child
    #[error("Parent {parent} must precede child {node}")]
    ParentAfterChild {
        /// Child node
        node: NodeId,
        /// Parent group
        parent: NodeId,
    },
}
