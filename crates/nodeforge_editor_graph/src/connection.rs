// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) definitions for the graph.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// A directed connection from a source pin to a target node's input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Edge id (`{source}:{source_pin}-{target}`)
    pub id: String,
    /// Source node ID
    pub source: NodeId,
    /// Schema key of the source output pin
    pub source_pin: String,
    /// Target node ID
    pub target: NodeId,
}

impl Edge {
    /// Create a new edge
    pub fn new(source: impl Into<NodeId>, source_pin: impl Into<String>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let source_pin = source_pin.into();
        let target = target.into();
        Self {
            id: Self::make_id(&source, &source_pin, &target),
            source,
            source_pin,
            target,
        }
    }

    /// Compose the canonical edge id
    pub fn make_id(source: &NodeId, source_pin: &str, target: &NodeId) -> String {
        format!("{source}:{source_pin}-{target}")
    }

    /// Point this edge at a new target, refreshing its id
    pub fn retarget(&mut self, target: NodeId) {
        self.id = Self::make_id(&self.source, &self.source_pin, &target);
        self.target = target;
    }

    /// Check if this edge touches a specific node
    pub fn involves_node(&self, node_id: &NodeId) -> bool {
        self.source == *node_id || self.target == *node_id
    }
}
