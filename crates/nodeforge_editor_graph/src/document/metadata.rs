// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `$NodeEditorMetadata` side block.
//!
//! Required values are modelled as `Option` so the parser can report which
//! entry is missing them instead of a generic deserialization failure.

use crate::geometry::Position;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored canvas position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DefinedPosition {
    /// Horizontal coordinate
    #[serde(rename = "$x")]
    pub x: f64,
    /// Vertical coordinate
    #[serde(rename = "$y")]
    pub y: f64,
}

impl From<Position> for DefinedPosition {
    fn from(position: Position) -> Self {
        Self {
            x: position.x,
            y: position.y,
        }
    }
}

impl From<DefinedPosition> for Position {
    fn from(position: DefinedPosition) -> Self {
        Position::new(position.x, position.y)
    }
}

/// `$Nodes[id]`: placement of a data or raw JSON node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Absolute position
    #[serde(rename = "$Position", default)]
    pub position: Option<DefinedPosition>,
    /// Title override
    #[serde(rename = "$Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// `$Links[id]`: a link node and the connection it redirects
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkMetadata {
    /// Absolute position
    #[serde(rename = "$Position", default)]
    pub position: Option<DefinedPosition>,
    /// Label of the outbound connection
    #[serde(rename = "$Title", default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// `{node}:{pinLocalId}` feeding the link
    #[serde(rename = "sourceEndpoint", default, skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<String>,
    /// `{node}:input` entries the link feeds
    #[serde(rename = "outputConnections", default)]
    pub output_connections: Vec<String>,
    /// Unused by this editor, kept for documents written by others
    #[serde(rename = "inputConnections", default, skip_serializing_if = "Vec::is_empty")]
    pub input_connections: Vec<String>,
}

/// `$Groups[]`: a group rectangle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// Node id, absent in older documents
    #[serde(
        rename = "$NodeID",
        alias = "$NodeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub node_id: Option<String>,
    /// Absolute position
    #[serde(rename = "$Position", default)]
    pub position: Option<DefinedPosition>,
    /// Width
    #[serde(rename = "$width", default)]
    pub width: Option<f64>,
    /// Height
    #[serde(rename = "$height", default)]
    pub height: Option<f64>,
    /// Display name
    #[serde(rename = "$name", default)]
    pub name: String,
}

/// `$Comments[]`: a comment rectangle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommentMetadata {
    /// Node id, absent in older documents
    #[serde(
        rename = "$NodeID",
        alias = "$NodeId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub node_id: Option<String>,
    /// Absolute position
    #[serde(rename = "$Position", default)]
    pub position: Option<DefinedPosition>,
    /// Width
    #[serde(rename = "$width", default)]
    pub width: Option<f64>,
    /// Height
    #[serde(rename = "$height", default)]
    pub height: Option<f64>,
    /// Display name
    #[serde(rename = "$name", default)]
    pub name: String,
    /// Free text
    #[serde(rename = "$text", default)]
    pub text: String,
    /// Font size
    #[serde(rename = "$fontSize", default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

/// Everything the editor stores next to the asset fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditorMetadata {
    /// Placement of data and raw JSON nodes
    #[serde(rename = "$Nodes", default, skip_serializing_if = "IndexMap::is_empty")]
    pub nodes: IndexMap<String, NodeMetadata>,
    /// Subtrees not reachable from the document root
    #[serde(rename = "$FloatingNodes", default, skip_serializing_if = "Vec::is_empty")]
    pub floating_nodes: Vec<Value>,
    /// Link nodes
    #[serde(rename = "$Links", default, skip_serializing_if = "IndexMap::is_empty")]
    pub links: IndexMap<String, LinkMetadata>,
    /// Group rectangles
    #[serde(rename = "$Groups", default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupMetadata>,
    /// Comment rectangles
    #[serde(rename = "$Comments", default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<CommentMetadata>,
    /// Workspace the document was saved from
    #[serde(rename = "$WorkspaceID", default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_wire_format() {
        let metadata: EditorMetadata = serde_json::from_value(json!({
            "$Nodes": { "A-1": { "$Position": { "$x": 10, "$y": -4.5 }, "$Title": "Main" } },
            "$Groups": [{ "$NodeId": "Group-1", "$Position": { "$x": 0, "$y": 0 },
                          "$width": 300, "$height": 200, "$name": "Cave" }],
            "$Links": { "Link-1": { "$Position": { "$x": 1, "$y": 2 },
                                    "sourceEndpoint": "A-1:ChildPin",
                                    "outputConnections": ["B-1:input"] } },
            "$WorkspaceID": "Biome Editor"
        }))
        .unwrap();

        let node = &metadata.nodes["A-1"];
        assert_eq!(node.position, Some(DefinedPosition { x: 10.0, y: -4.5 }));
        assert_eq!(node.title.as_deref(), Some("Main"));
        assert_eq!(metadata.groups[0].node_id.as_deref(), Some("Group-1"));
        assert_eq!(metadata.groups[0].width, Some(300.0));
        assert_eq!(metadata.links["Link-1"].output_connections, vec!["B-1:input"]);
        assert!(metadata.comments.is_empty());

        let written = serde_json::to_value(&metadata).unwrap();
        assert_eq!(written["$Groups"][0]["$NodeID"], json!("Group-1"));
        assert!(written.get("$Comments").is_none());
        assert!(written.get("$FloatingNodes").is_none());
    }
}
