// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the editor graph.

use crate::geometry::{Position, Size};
use crate::port::{OutputPin, LINK_OUTPUT_HANDLE_ID};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

/// Default comment font size
pub const COMMENT_DEFAULT_FONT_SIZE: f64 = 13.0;
/// Smallest allowed comment font size
pub const COMMENT_MIN_FONT_SIZE: f64 = 8.0;
/// Largest allowed comment font size
pub const COMMENT_MAX_FONT_SIZE: f64 = 128.0;

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a fresh id of the form `{prefix}-{uuid}`
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", Uuid::new_v4()))
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Template id encoded in the id prefix (`Biome-1234-...` -> `Biome`)
    pub fn template_prefix(&self) -> Option<&str> {
        let (prefix, _) = self.0.split_once('-')?;
        (!prefix.is_empty()).then_some(prefix)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Type tag of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Template-backed structured node
    DataNode,
    /// Opaque JSON blob
    RawJsonNode,
    /// Connection redirect
    LinkNode,
    /// Visual grouping rectangle
    GroupNode,
    /// Free text rectangle
    CommentNode,
}

impl NodeType {
    /// Prefix used when generating ids for this node type
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::DataNode | Self::RawJsonNode => "Generic",
            Self::LinkNode => "Link",
            Self::GroupNode => "Group",
            Self::CommentNode => "Comment",
        }
    }
}

/// Payload of a template-backed node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataNodeData {
    /// Template this node was created from
    pub template_id: String,
    /// Declared output pins, in declaration order
    pub output_pins: Vec<OutputPin>,
    /// Field values by schema key (`None` when unset and without default)
    pub fields: IndexMap<String, Option<Value>>,
    /// Title override (also the key under a `map` pin)
    pub title_override: Option<String>,
    /// Per-node comment
    pub comment: Option<String>,
    /// Document keys the template does not declare, kept verbatim
    pub unparsed_metadata: Map<String, Value>,
    /// Constant fields declared by the template schema
    pub schema_constants: IndexMap<String, String>,
}

impl DataNodeData {
    /// Look up a declared output pin by schema key
    pub fn pin(&self, schema_key: &str) -> Option<&OutputPin> {
        self.output_pins.iter().find(|p| p.schema_key == schema_key)
    }

    /// Look up a declared output pin by its template-local id
    pub fn pin_by_local_id(&self, local_id: &str) -> Option<&OutputPin> {
        self.output_pins.iter().find(|p| p.local_id == local_id)
    }
}

/// Payload of an opaque JSON node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawJsonNodeData {
    /// The blob, without reserved keys
    pub data: Map<String, Value>,
    /// Title override
    pub title_override: Option<String>,
    /// Per-node comment
    pub comment: Option<String>,
}

/// Payload of a link node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkNodeData {
    /// Label shown on the outbound connection
    pub title_override: Option<String>,
}

/// Payload of a group node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupNodeData {
    /// Declared width
    pub width: f64,
    /// Declared height
    pub height: f64,
    /// Display name
    pub name: String,
}

/// Payload of a comment node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentNodeData {
    /// Declared width
    pub width: f64,
    /// Declared height
    pub height: f64,
    /// Display name
    pub name: String,
    /// Free text
    pub text: String,
    /// Font size, always within [8, 128]
    pub font_size: f64,
}

impl CommentNodeData {
    /// Normalize a candidate font size: non-finite becomes the default, the rest is clamped
    pub fn clamp_font_size(candidate: f64) -> f64 {
        if !candidate.is_finite() {
            return COMMENT_DEFAULT_FONT_SIZE;
        }
        candidate.clamp(COMMENT_MIN_FONT_SIZE, COMMENT_MAX_FONT_SIZE)
    }
}

/// Type-specific node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Template-backed node
    Data(DataNodeData),
    /// Opaque JSON node
    RawJson(RawJsonNodeData),
    /// Link node
    Link(LinkNodeData),
    /// Group rectangle
    Group(GroupNodeData),
    /// Comment rectangle
    Comment(CommentNodeData),
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique instance ID
    pub id: NodeId,
    /// Position relative to the parent group, or absolute without one
    pub position: Position,
    /// On-screen size reported by the renderer
    pub measured: Option<Size>,
    /// Enclosing group, if any
    pub parent_id: Option<NodeId>,
    /// Type-specific payload
    pub kind: NodeKind,
}

impl Node {
    /// Create a node at the origin
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            position: Position::ZERO,
            measured: None,
            parent_id: None,
            kind,
        }
    }

    /// Create a data node
    pub fn data(id: impl Into<NodeId>, data: DataNodeData) -> Self {
        Self::new(id, NodeKind::Data(data))
    }

    /// Create a raw JSON node
    pub fn raw_json(id: impl Into<NodeId>, data: Map<String, Value>) -> Self {
        Self::new(
            id,
            NodeKind::RawJson(RawJsonNodeData {
                data,
                ..Default::default()
            }),
        )
    }

    /// Create a link node
    pub fn link(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Link(LinkNodeData::default()))
    }

    /// Create a group node
    pub fn group(id: impl Into<NodeId>, name: impl Into<String>, width: f64, height: f64) -> Self {
        Self::new(
            id,
            NodeKind::Group(GroupNodeData {
                width,
                height,
                name: name.into(),
            }),
        )
    }

    /// Create a comment node
    pub fn comment(
        id: impl Into<NodeId>,
        name: impl Into<String>,
        text: impl Into<String>,
        width: f64,
        height: f64,
    ) -> Self {
        Self::new(
            id,
            NodeKind::Comment(CommentNodeData {
                width,
                height,
                name: name.into(),
                text: text.into(),
                font_size: COMMENT_DEFAULT_FONT_SIZE,
            }),
        )
    }

    /// Set the position
    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.position = Position::new(x, y);
        self
    }

    /// Set the measured size
    pub fn with_measured(mut self, width: f64, height: f64) -> Self {
        self.measured = Some(Size::new(width, height));
        self
    }

    /// Set the parent group
    pub fn with_parent(mut self, parent_id: impl Into<NodeId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Type tag of this node
    pub fn node_type(&self) -> NodeType {
        match &self.kind {
            NodeKind::Data(_) => NodeType::DataNode,
            NodeKind::RawJson(_) => NodeType::RawJsonNode,
            NodeKind::Link(_) => NodeType::LinkNode,
            NodeKind::Group(_) => NodeType::GroupNode,
            NodeKind::Comment(_) => NodeType::CommentNode,
        }
    }

    /// Whether this node is a group
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    /// Whether this node can be the target of a connection
    pub fn accepts_input(&self) -> bool {
        match &self.kind {
            NodeKind::Data(_) | NodeKind::RawJson(_) | NodeKind::Link(_) => true,
            NodeKind::Group(_) | NodeKind::Comment(_) => false,
        }
    }

    /// Whether `pin` is an output this node declares
    pub fn has_output_pin(&self, pin: &str) -> bool {
        match &self.kind {
            NodeKind::Data(data) => data.pin(pin).is_some(),
            NodeKind::Link(_) => pin == LINK_OUTPUT_HANDLE_ID,
            NodeKind::RawJson(_) | NodeKind::Group(_) | NodeKind::Comment(_) => false,
        }
    }

    /// Title override, for the kinds that carry one
    pub fn title_override(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Data(data) => data.title_override.as_deref(),
            NodeKind::RawJson(data) => data.title_override.as_deref(),
            NodeKind::Link(data) => data.title_override.as_deref(),
            NodeKind::Group(_) | NodeKind::Comment(_) => None,
        }
    }

    /// Replace the title override, for the kinds that carry one
    pub fn set_title_override(&mut self, title: Option<String>) {
        match &mut self.kind {
            NodeKind::Data(data) => data.title_override = title,
            NodeKind::RawJson(data) => data.title_override = title,
            NodeKind::Link(data) => data.title_override = title,
            NodeKind::Group(_) | NodeKind::Comment(_) => {}
        }
    }

    /// Declared size of group/comment rectangles
    pub fn declared_size(&self) -> Option<Size> {
        match &self.kind {
            NodeKind::Group(group) => Some(Size::new(group.width, group.height)),
            NodeKind::Comment(comment) => Some(Size::new(comment.width, comment.height)),
            NodeKind::Data(_) | NodeKind::RawJson(_) | NodeKind::Link(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_prefix() {
        assert_eq!(NodeId::from("Biome-1234-5678").template_prefix(), Some("Biome"));
        assert_eq!(NodeId::from("NoDash").template_prefix(), None);
        assert_eq!(NodeId::from("-leading").template_prefix(), None);
    }

    #[test]
    fn test_generated_ids_are_prefixed() {
        let id = NodeId::generate("Group");
        assert_eq!(id.template_prefix(), Some("Group"));
        assert_ne!(id, NodeId::generate("Group"));
    }

    #[test]
    fn test_font_size_clamped() {
        assert_eq!(CommentNodeData::clamp_font_size(2.0), COMMENT_MIN_FONT_SIZE);
        assert_eq!(CommentNodeData::clamp_font_size(500.0), COMMENT_MAX_FONT_SIZE);
        assert_eq!(CommentNodeData::clamp_font_size(f64::NAN), COMMENT_DEFAULT_FONT_SIZE);
        assert_eq!(CommentNodeData::clamp_font_size(20.0), 20.0);
    }

    #[test]
    fn test_input_acceptance() {
        assert!(Node::link("L").accepts_input());
        assert!(Node::link("L").has_output_pin(LINK_OUTPUT_HANDLE_ID));
        assert!(!Node::group("G", "Group", 10.0, 10.0).accepts_input());
        assert_eq!(
            Node::group("G", "Group", 10.0, 20.0).declared_size(),
            Some(Size::new(10.0, 20.0))
        );
    }
}
