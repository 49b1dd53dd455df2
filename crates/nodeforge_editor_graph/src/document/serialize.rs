// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph -> asset document.

use super::keys;
use super::metadata::{CommentMetadata, EditorMetadata, GroupMetadata, LinkMetadata, NodeMetadata};
use super::AssetDocument;
use crate::connection::Edge;
use crate::graph::Graph;
use crate::node::{Node, NodeId, NodeKind};
use crate::port::{PinMultiplicity, INPUT_HANDLE_ID, LINK_OUTPUT_HANDLE_ID};
use crate::workspace::WorkspaceContext;
use indexmap::IndexSet;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Serialize a graph into an asset document.
///
/// Nodes reachable from the root form the body; every other subtree goes to
/// `$FloatingNodes`. Each node is visited once and a second visit is a cycle.
pub fn serialize_document(
    graph: &Graph,
    context: &WorkspaceContext,
) -> Result<AssetDocument, SerializeError> {
    let root = graph.root_node_id.as_ref().ok_or(SerializeError::MissingRoot)?;
    if !graph.contains(root) {
        return Err(SerializeError::UnknownNode(root.clone()));
    }

    let mut serializer = Serializer {
        graph,
        unprocessed: graph.node_ids().cloned().collect(),
        metadata: EditorMetadata::default(),
    };

    let body = match serializer.visit(root)? {
        Some((_, Value::Object(body))) => body,
        _ => return Err(SerializeError::InvalidRoot(root.clone())),
    };

    while let Some(next) = serializer.unprocessed.first().cloned() {
        let floating_root = serializer.floating_root(next);
        if let Some((_, value)) = serializer.visit(&floating_root)? {
            serializer.metadata.floating_nodes.push(value);
        }
    }

    let mut metadata = serializer.metadata;
    metadata.workspace_id = context.root_menu_name.clone();
    Ok(AssetDocument { body, metadata })
}

struct Serializer<'a> {
    graph: &'a Graph,
    unprocessed: IndexSet<NodeId>,
    metadata: EditorMetadata,
}

impl<'a> Serializer<'a> {
    /// Topmost unprocessed ancestor of `start` along inbound edges
    fn floating_root(&self, start: NodeId) -> NodeId {
        let mut current = start;
        let mut seen: HashSet<NodeId> = HashSet::new();
        seen.insert(current.clone());
        while let Some(edge) = self.graph.incoming(&current) {
            if !self.unprocessed.contains(&edge.source) || !seen.insert(edge.source.clone()) {
                break;
            }
            current = edge.source.clone();
        }
        current
    }

    /// Serialize one node. Returns the id whose object was produced (links
    /// resolve to the node they feed) and the object, or `None` for nodes
    /// that live in the metadata block only.
    fn visit(&mut self, id: &NodeId) -> Result<Option<(NodeId, Value)>, SerializeError> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| SerializeError::UnknownNode(id.clone()))?;
        if !self.unprocessed.shift_remove(id) {
            return Err(SerializeError::CycleDetected {
                node_id: id.clone(),
            });
        }
        let absolute = graph.absolute_position(id).unwrap_or(node.position);

        match &node.kind {
            NodeKind::Data(data) => {
                let mut object = Map::new();
                object.insert(keys::NODE_ID.to_string(), Value::String(id.to_string()));
                if let Some(comment) = &data.comment {
                    object.insert(keys::COMMENT.to_string(), Value::String(comment.clone()));
                }

                for pin in &data.output_pins {
                    let targets: Vec<NodeId> = graph
                        .outgoing_for_pin(id, &pin.schema_key)
                        .map(|edge| edge.target.clone())
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    if let Some(value) = self.visit_pin(id, pin.multiplicity, &pin.schema_key, &targets)? {
                        object.insert(pin.schema_key.clone(), value);
                    }
                }

                for (key, value) in &data.fields {
                    if let Some(value) = value {
                        object.insert(key.clone(), value.clone());
                    }
                }
                for (key, value) in &data.unparsed_metadata {
                    object.insert(key.clone(), value.clone());
                }
                for (key, value) in &data.schema_constants {
                    object.insert(key.clone(), Value::String(value.clone()));
                }

                self.record_placement(node, absolute);
                Ok(Some((id.clone(), Value::Object(object))))
            }
            NodeKind::RawJson(raw) => {
                let mut object = Map::new();
                object.insert(keys::NODE_ID.to_string(), Value::String(id.to_string()));
                if let Some(comment) = &raw.comment {
                    object.insert(keys::COMMENT.to_string(), Value::String(comment.clone()));
                }
                for (key, value) in &raw.data {
                    object.insert(key.clone(), value.clone());
                }
                self.record_placement(node, absolute);
                Ok(Some((id.clone(), Value::Object(object))))
            }
            NodeKind::Link(link) => {
                let source_endpoint = graph.incoming(id).map(|edge| self.endpoint(edge));
                let outputs: Vec<&Edge> = graph.outgoing_for_pin(id, LINK_OUTPUT_HANDLE_ID).collect();
                self.metadata.links.insert(
                    id.to_string(),
                    LinkMetadata {
                        position: Some(absolute.into()),
                        title: link.title_override.clone(),
                        source_endpoint,
                        output_connections: outputs
                            .iter()
                            .map(|edge| format!("{}:{INPUT_HANDLE_ID}", edge.target))
                            .collect(),
                        input_connections: Vec::new(),
                    },
                );
                match outputs.first() {
                    Some(edge) => self.visit(&edge.target),
                    None => Ok(None),
                }
            }
            NodeKind::Group(group) => {
                self.metadata.groups.push(GroupMetadata {
                    node_id: Some(id.to_string()),
                    position: Some(absolute.into()),
                    width: Some(group.width),
                    height: Some(group.height),
                    name: group.name.clone(),
                });
                Ok(None)
            }
            NodeKind::Comment(comment) => {
                self.metadata.comments.push(CommentMetadata {
                    node_id: Some(id.to_string()),
                    position: Some(absolute.into()),
                    width: Some(comment.width),
                    height: Some(comment.height),
                    name: comment.name.clone(),
                    text: comment.text.clone(),
                    font_size: Some(comment.font_size),
                });
                Ok(None)
            }
        }
    }

    /// Serialize the children under one pin according to its multiplicity
    fn visit_pin(
        &mut self,
        owner: &NodeId,
        multiplicity: PinMultiplicity,
        schema_key: &str,
        targets: &[NodeId],
    ) -> Result<Option<Value>, SerializeError> {
        match multiplicity {
            PinMultiplicity::Single => {
                if targets.len() > 1 {
                    tracing::warn!(
                        "Single pin {}:{} has {} connections; extra children become floating",
                        owner,
                        schema_key,
                        targets.len()
                    );
                }
                Ok(self.visit(&targets[0])?.map(|(_, value)| value))
            }
            PinMultiplicity::Multiple => {
                let mut items = Vec::with_capacity(targets.len());
                for target in targets {
                    if let Some((_, value)) = self.visit(target)? {
                        items.push(value);
                    }
                }
                Ok((!items.is_empty()).then_some(Value::Array(items)))
            }
            PinMultiplicity::Map => {
                let mut entries = Map::new();
                for target in targets {
                    if let Some((child, value)) = self.visit(target)? {
                        let key = self
                            .graph
                            .node(&child)
                            .and_then(Node::title_override)
                            .map_or_else(|| child.to_string(), str::to_string);
                        if entries.insert(key.clone(), value).is_some() {
                            tracing::warn!("Map pin {}:{} has duplicate key {:?}", owner, schema_key, key);
                        }
                    }
                }
                Ok((!entries.is_empty()).then_some(Value::Object(entries)))
            }
        }
    }

    fn record_placement(&mut self, node: &Node, absolute: crate::geometry::Position) {
        self.metadata.nodes.insert(
            node.id.to_string(),
            NodeMetadata {
                position: Some(absolute.into()),
                title: node.title_override().map(str::to_string),
            },
        );
    }

    /// `{node}:{pinLocalId}` for the pin feeding an edge
    fn endpoint(&self, edge: &Edge) -> String {
        let local_id = match self.graph.node(&edge.source).map(|node| &node.kind) {
            Some(NodeKind::Data(data)) => data
                .pin(&edge.source_pin)
                .map_or(edge.source_pin.as_str(), |pin| pin.local_id.as_str()),
            _ => edge.source_pin.as_str(),
        };
        format!("{}:{local_id}", edge.source)
    }
}

/// Error when serializing a graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SerializeError {
    /// A node was reached twice while walking pin connections
    #[error("Cycle detected at node {node_id}")]
    CycleDetected {
        /// Node reached a second time
        node_id: NodeId,
    },

    /// The graph has no root node
    #[error("Graph has no root node")]
    MissingRoot,

    /// An id that is not in the graph
    #[error("Node not found: {0}")]
    UnknownNode(NodeId),

    /// The root does not produce a document object
    #[error("Root node {0} cannot be the document body")]
    InvalidRoot(NodeId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::parse_document_value;
    use crate::document::test_support::biome_context;
    use crate::node::DataNodeData;
    use crate::port::OutputPin;
    use serde_json::json;

    fn node(id: &str, pins: Vec<OutputPin>) -> Node {
        Node::data(
            id,
            DataNodeData {
                template_id: "T".to_string(),
                output_pins: pins,
                ..Default::default()
            },
        )
    }

    fn empty_context() -> WorkspaceContext {
        WorkspaceContext::new(None)
    }

    #[test]
    fn test_cycle_is_an_error() {
        let graph = Graph::from_parts(
            Some("A".into()),
            vec![
                node("A", vec![OutputPin::single("Next")]),
                node("B", vec![OutputPin::single("Next")]),
            ],
            vec![Edge::new("A", "Next", "B"), Edge::new("B", "Next", "A")],
        )
        .unwrap();
        assert_eq!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::CycleDetected {
                node_id: "A".into()
            })
        );
    }

    #[test]
    fn test_floating_cycle_is_an_error() {
        let graph = Graph::from_parts(
            Some("R".into()),
            vec![
                node("R", vec![]),
                node("A", vec![OutputPin::single("Next")]),
                node("B", vec![OutputPin::single("Next")]),
            ],
            vec![Edge::new("A", "Next", "B"), Edge::new("B", "Next", "A")],
        )
        .unwrap();
        assert!(matches!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_multiplicity_fidelity() {
        let mut graph = Graph::new();
        graph
            .add_node(node(
                "A",
                vec![
                    OutputPin::single("One"),
                    OutputPin::multiple("Many"),
                    OutputPin::multiple("None"),
                    OutputPin::map("Named"),
                ],
            ))
            .unwrap();
        for id in ["B", "C", "D", "E", "F"] {
            graph.add_node(node(id, vec![])).unwrap();
        }
        graph
            .node_mut(&"E".into())
            .unwrap()
            .set_title_override(Some("east".to_string()));
        graph.root_node_id = Some("A".into());
        graph.connect(&"A".into(), "One", &"B".into()).unwrap();
        graph.connect(&"A".into(), "Many", &"D".into()).unwrap();
        graph.connect(&"A".into(), "Many", &"C".into()).unwrap();
        graph.connect(&"A".into(), "Named", &"E".into()).unwrap();
        graph.connect(&"A".into(), "Named", &"F".into()).unwrap();

        let document = serialize_document(&graph, &empty_context()).unwrap();
        let body = Value::Object(document.body);
        assert_eq!(body["One"], json!({ "$NodeID": "B" }));
        assert_eq!(body["Many"], json!([{ "$NodeID": "D" }, { "$NodeID": "C" }]));
        assert!(body.get("None").is_none());
        assert_eq!(
            body["Named"],
            json!({ "east": { "$NodeID": "E" }, "F": { "$NodeID": "F" } })
        );
    }

    #[test]
    fn test_floating_subtrees_keep_their_shape() {
        let mut graph = Graph::new();
        graph.add_node(node("R", vec![])).unwrap();
        graph.add_node(node("Leaf", vec![])).unwrap();
        graph.add_node(node("Top", vec![OutputPin::single("Child")])).unwrap();
        graph.root_node_id = Some("R".into());
        graph.connect(&"Top".into(), "Child", &"Leaf".into()).unwrap();

        let document = serialize_document(&graph, &empty_context()).unwrap();
        assert_eq!(
            document.metadata.floating_nodes,
            vec![json!({ "$NodeID": "Top", "Child": { "$NodeID": "Leaf" } })]
        );
    }

    #[test]
    fn test_groups_and_comments_are_metadata_only() {
        let mut graph = Graph::new();
        graph
            .add_node(Node::group("G", "Area", 400.0, 300.0).with_position(10.0, 10.0))
            .unwrap();
        graph
            .add_node(node("R", vec![]).with_position(5.0, 5.0).with_parent("G"))
            .unwrap();
        graph
            .add_node(Node::comment("K", "Note", "hello", 100.0, 50.0))
            .unwrap();
        graph.root_node_id = Some("R".into());

        let document = serialize_document(&graph, &empty_context()).unwrap();
        assert_eq!(Value::Object(document.body), json!({ "$NodeID": "R" }));
        assert_eq!(document.metadata.groups.len(), 1);
        assert_eq!(document.metadata.comments[0].text, "hello");
        assert!(document.metadata.floating_nodes.is_empty());
        // positions are written absolute
        let r = &document.metadata.nodes["R"];
        assert_eq!(r.position.map(|p| (p.x, p.y)), Some((15.0, 15.0)));
    }

    #[test]
    fn test_missing_or_invalid_root() {
        let mut graph = Graph::new();
        graph.add_node(Node::group("G", "Area", 1.0, 1.0)).unwrap();
        assert_eq!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::MissingRoot)
        );
        graph.root_node_id = Some("Z".into());
        assert_eq!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::UnknownNode("Z".into()))
        );
        graph.root_node_id = Some("G".into());
        assert_eq!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::InvalidRoot("G".into()))
        );
    }

    #[test]
    fn test_links_round_trip() {
        let context = biome_context();
        let mut graph = Graph::new();
        graph
            .add_node(Node::data("Biome-1", context.template("Biome").unwrap().instantiate_data()))
            .unwrap();
        graph.add_node(Node::link("Link-1").with_position(50.0, 0.0)).unwrap();
        graph
            .add_node(Node::data("Constant-1", context.template("Constant").unwrap().instantiate_data()))
            .unwrap();
        graph.root_node_id = Some("Biome-1".into());
        graph.connect(&"Biome-1".into(), "Density", &"Link-1".into()).unwrap();
        graph
            .connect(&"Link-1".into(), LINK_OUTPUT_HANDLE_ID, &"Constant-1".into())
            .unwrap();

        let document = serialize_document(&graph, &context).unwrap();
        assert_eq!(document.body["Density"]["$NodeID"], json!("Constant-1"));
        let link = &document.metadata.links["Link-1"];
        assert_eq!(link.source_endpoint.as_deref(), Some("Biome-1:DensityPin"));
        assert_eq!(link.output_connections, vec!["Constant-1:input"]);
        assert_eq!(document.metadata.workspace_id.as_deref(), Some("Biome Editor"));

        let reparsed = parse_document_value(&document.to_value().unwrap(), &context).unwrap();
        assert_eq!(reparsed.graph.edges(), graph.edges());
        assert_eq!(serialize_document(&reparsed.graph, &context).unwrap(), document);
    }

    #[test]
    fn test_link_cycle_detected() {
        let graph = Graph::from_parts(
            Some("A".into()),
            vec![node("A", vec![OutputPin::single("Next")]), Node::link("L")],
            vec![
                Edge::new("A", "Next", "L"),
                Edge::new("L", LINK_OUTPUT_HANDLE_ID, "A"),
            ],
        )
        .unwrap();
        assert!(matches!(
            serialize_document(&graph, &empty_context()),
            Err(SerializeError::CycleDetected { .. })
        ));
    }
}
