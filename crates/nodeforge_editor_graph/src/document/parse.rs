// SPDX-License-Identifier: MIT OR Apache-2.0
//! Asset document -> graph.

use super::keys;
use super::metadata::{CommentMetadata, DefinedPosition, EditorMetadata, GroupMetadata, LinkMetadata};
use crate::connection::Edge;
use crate::geometry::Position;
use crate::graph::{Graph, GraphError};
use crate::node::{CommentNodeData, Node, NodeId, NodeKind, NodeType, COMMENT_DEFAULT_FONT_SIZE};
use crate::port::{PinMultiplicity, LINK_OUTPUT_HANDLE_ID};
use crate::workspace::{NodeTemplate, WorkspaceContext};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Result of parsing a document
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDocument {
    /// The graph, rooted at the document body
    pub graph: Graph,
    /// Nodes that had no stored position and sit at the origin
    pub unpositioned: Vec<NodeId>,
}

/// Parse document text against a workspace
pub fn parse_document(text: &str, context: &WorkspaceContext) -> Result<ParsedDocument, ParseError> {
    let value: Value = serde_json::from_str(text)?;
    parse_document_value(&value, context)
}

/// Parse an already decoded document against a workspace
pub fn parse_document_value(
    value: &Value,
    context: &WorkspaceContext,
) -> Result<ParsedDocument, ParseError> {
    let root = value.as_object().ok_or_else(|| ParseError::NotAnObject {
        path: "$".to_string(),
    })?;

    let mut parser = Parser::new(context);
    let root_id = parser.parse_node(value, context.root_template_or_variant_id.as_deref(), "$")?;

    let metadata = match root.get(keys::EDITOR_METADATA) {
        None | Some(Value::Null) => EditorMetadata::default(),
        Some(block) => serde_json::from_value(block.clone())
            .map_err(|err| ParseError::InvalidMetadata(err.to_string()))?,
    };

    for (index, floating) in metadata.floating_nodes.iter().enumerate() {
        parser.parse_node(floating, None, &format!("$FloatingNodes[{index}]"))?;
    }
    parser.apply_node_metadata(&metadata)?;
    parser.attach_links(&metadata.links)?;
    for group in &metadata.groups {
        parser.add_group(group)?;
    }
    for comment in &metadata.comments {
        parser.add_comment(comment)?;
    }
    if let Some(legacy) = root.get(keys::LEGACY_GROUPS) {
        let groups: Vec<GroupMetadata> = serde_json::from_value(legacy.clone())
            .map_err(|err| ParseError::InvalidMetadata(err.to_string()))?;
        for group in &groups {
            parser.add_group(group)?;
        }
    }
    if let Some(workspace_id) = &metadata.workspace_id {
        if context.root_menu_name.as_ref() != Some(workspace_id) {
            tracing::debug!("Document was saved from workspace {}", workspace_id);
        }
    }

    parser.finish(root_id)
}

struct Parser<'a> {
    context: &'a WorkspaceContext,
    // Slots are reserved before children are parsed so parents precede children.
    slots: Vec<Option<Node>>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    positioned: HashSet<NodeId>,
}

impl<'a> Parser<'a> {
    fn new(context: &'a WorkspaceContext) -> Self {
        Self {
            context,
            slots: Vec::new(),
            index: HashMap::new(),
            edges: Vec::new(),
            positioned: HashSet::new(),
        }
    }

    fn reserve(&mut self, id: &NodeId) -> Result<usize, ParseError> {
        if self.index.contains_key(id) {
            return Err(ParseError::DuplicateNodeId(id.clone()));
        }
        self.slots.push(None);
        let slot = self.slots.len() - 1;
        self.index.insert(id.clone(), slot);
        Ok(slot)
    }

    fn add_node(&mut self, node: Node) -> Result<(), ParseError> {
        let slot = self.reserve(&node.id)?;
        self.positioned.insert(node.id.clone());
        self.slots[slot] = Some(node);
        Ok(())
    }

    fn node(&self, id: &NodeId) -> Option<&Node> {
        self.slots.get(*self.index.get(id)?)?.as_ref()
    }

    fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.slots.get_mut(*self.index.get(id)?)?.as_mut()
    }

    /// Parse one document object and everything under its pins; returns its id
    fn parse_node(
        &mut self,
        value: &Value,
        expected: Option<&str>,
        path: &str,
    ) -> Result<NodeId, ParseError> {
        let object = value.as_object().ok_or_else(|| ParseError::NotAnObject {
            path: path.to_string(),
        })?;

        let declared_id = read_node_id(object, path)?;
        let template = self.resolve_template(object, expected, declared_id.as_ref())?;
        let id = declared_id.unwrap_or_else(|| match template {
            Some(template) => NodeId::generate(&template.template_id),
            None => NodeId::generate(NodeType::RawJsonNode.id_prefix()),
        });
        let slot = self.reserve(&id)?;

        let comment = object
            .get(keys::COMMENT)
            .and_then(Value::as_str)
            .map(str::to_string);
        let position = match object.get(keys::POSITION) {
            Some(value) => {
                let position: DefinedPosition = serde_json::from_value(value.clone())
                    .map_err(|_| ParseError::InvalidPosition(id.clone()))?;
                self.positioned.insert(id.clone());
                Position::from(position)
            }
            None => Position::ZERO,
        };

        let mut node = match template {
            Some(template) => self.parse_data_node(&id, template, object, comment, path)?,
            None => {
                let data: Map<String, Value> = object
                    .iter()
                    .filter(|(key, _)| !keys::is_reserved(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect();
                let mut node = Node::raw_json(id.clone(), data);
                if let NodeKind::RawJson(raw) = &mut node.kind {
                    raw.comment = comment;
                }
                node
            }
        };
        node.position = position;
        self.slots[slot] = Some(node);
        Ok(id)
    }

    fn parse_data_node(
        &mut self,
        id: &NodeId,
        template: &'a NodeTemplate,
        object: &Map<String, Value>,
        comment: Option<String>,
        path: &str,
    ) -> Result<Node, ParseError> {
        let mut data = template.instantiate_data();
        data.comment = comment;
        let mut consumed: HashSet<&str> = HashSet::new();

        for pin in &template.output_pins {
            consumed.insert(pin.schema_key.as_str());
            let child_type = template.child_types.get(&pin.schema_key).map(String::as_str);
            let pin_path = format!("{path}.{}", pin.schema_key);
            let value = match object.get(&pin.schema_key) {
                None | Some(Value::Null) => continue,
                Some(value) => value,
            };

            match pin.multiplicity {
                PinMultiplicity::Single => {
                    let child = self.parse_node(value, child_type, &pin_path)?;
                    self.edges.push(Edge::new(id.clone(), pin.schema_key.as_str(), child));
                }
                PinMultiplicity::Multiple => {
                    let items = value.as_array().ok_or_else(|| ParseError::InvalidPinValue {
                        path: pin_path.clone(),
                        expected: "an array",
                    })?;
                    for (index, item) in items.iter().enumerate() {
                        let child = self.parse_node(item, child_type, &format!("{pin_path}[{index}]"))?;
                        self.edges.push(Edge::new(id.clone(), pin.schema_key.as_str(), child));
                    }
                }
                PinMultiplicity::Map => {
                    let entries = value.as_object().ok_or_else(|| ParseError::InvalidPinValue {
                        path: pin_path.clone(),
                        expected: "an object",
                    })?;
                    for (key, item) in entries {
                        let child = self.parse_node(item, child_type, &format!("{pin_path}.{key}"))?;
                        // An untitled child is keyed by its own id.
                        if key.as_str() != child.as_str() {
                            if let Some(node) = self.node_mut(&child) {
                                node.set_title_override(Some(key.clone()));
                            }
                        }
                        self.edges.push(Edge::new(id.clone(), pin.schema_key.as_str(), child));
                    }
                }
            }
        }

        for key in template.fields_by_schema_key.keys() {
            consumed.insert(key.as_str());
            if let Some(value) = object.get(key) {
                data.fields.insert(key.clone(), Some(value.clone()));
            }
        }

        for (key, value) in object {
            if keys::is_reserved(key) || consumed.contains(key.as_str()) {
                continue;
            }
            if let Some(constant) = template.schema_constants.get(key) {
                if value.as_str() != Some(constant.as_str()) {
                    tracing::warn!(
                        "Node {} has {} = {} but template {} declares {:?}",
                        id,
                        key,
                        value,
                        template.template_id,
                        constant
                    );
                }
                continue;
            }
            data.unparsed_metadata.insert(key.clone(), value.clone());
        }

        Ok(Node::data(id.clone(), data))
    }

    /// Pick the template for a document object, `None` meaning raw JSON
    fn resolve_template(
        &self,
        object: &Map<String, Value>,
        expected: Option<&str>,
        declared_id: Option<&NodeId>,
    ) -> Result<Option<&'a NodeTemplate>, ParseError> {
        let context = self.context;
        if let Some(expected) = expected {
            if let Some(kind) = context.variant_kind(expected) {
                if let Some(Value::String(variant)) = object.get(&kind.variant_field_name) {
                    let template_id = kind.variants.get(variant).ok_or_else(|| {
                        ParseError::UnknownVariant {
                            kind: expected.to_string(),
                            variant: variant.clone(),
                        }
                    })?;
                    return context
                        .template(template_id)
                        .map(Some)
                        .ok_or_else(|| ParseError::UnknownTemplate(template_id.clone()));
                }
            } else {
                return context
                    .template(expected)
                    .map(Some)
                    .ok_or_else(|| ParseError::UnknownTemplate(expected.to_string()));
            }
        }

        Ok(declared_id
            .and_then(NodeId::template_prefix)
            .and_then(|prefix| context.template(prefix)))
    }

    fn apply_node_metadata(&mut self, metadata: &EditorMetadata) -> Result<(), ParseError> {
        for (id, entry) in &metadata.nodes {
            let id = NodeId::from(id.as_str());
            let Some(node) = self.node_mut(&id) else {
                tracing::warn!("Metadata saved for node {} but the node was not found", id);
                continue;
            };
            let position = entry
                .position
                .ok_or_else(|| ParseError::MissingPosition(id.clone()))?;
            node.position = position.into();
            if entry.title.is_some() {
                node.set_title_override(entry.title.clone());
            }
            self.positioned.insert(id);
        }
        Ok(())
    }

    /// Create link nodes and reroute the edges they redirect.
    ///
    /// The document body stores a linked child inline under the pin that feeds
    /// the link chain; the chain itself is rebuilt here. Links fed by another
    /// link wait until that link is wired.
    fn attach_links(&mut self, links: &IndexMap<String, LinkMetadata>) -> Result<(), ParseError> {
        for (id, link) in links {
            let id = NodeId::from(id.as_str());
            if link.output_connections.len() > 1 {
                return Err(ParseError::LinkFanOut(id));
            }
            let position = link
                .position
                .ok_or_else(|| ParseError::MissingPosition(id.clone()))?;
            let mut node = Node::link(id);
            node.position = position.into();
            node.set_title_override(link.title.clone());
            self.add_node(node)?;
        }

        let mut wired: HashSet<&str> = HashSet::new();
        let mut pending: Vec<(&String, &LinkMetadata)> = links.iter().collect();
        while !pending.is_empty() {
            let mut deferred = Vec::new();
            for &(id, link) in &pending {
                let upstream = link.source_endpoint.as_deref().map(endpoint_node);
                match upstream {
                    Some(source) if links.contains_key(source) && !wired.contains(source) => {
                        deferred.push((id, link));
                    }
                    _ => {
                        self.wire_link(&NodeId::from(id.as_str()), link, links)?;
                        wired.insert(id.as_str());
                    }
                }
            }
            if deferred.len() == pending.len() {
                let (id, _) = deferred[0];
                return Err(ParseError::LinkCycle(NodeId::from(id.as_str())));
            }
            pending = deferred;
        }
        Ok(())
    }

    fn wire_link(
        &mut self,
        link_id: &NodeId,
        link: &LinkMetadata,
        links: &IndexMap<String, LinkMetadata>,
    ) -> Result<(), ParseError> {
        let target = match link.output_connections.first() {
            Some(connection) => {
                let target = NodeId::from(endpoint_node(connection));
                if self.node(&target).is_some() {
                    Some(target)
                } else {
                    tracing::warn!("Link {} targets missing node {}", link_id, target);
                    None
                }
            }
            None => None,
        };
        if let Some(target) = &target {
            self.edges
                .push(Edge::new(link_id.clone(), LINK_OUTPUT_HANDLE_ID, target.clone()));
        }

        let Some(endpoint) = &link.source_endpoint else {
            return Ok(());
        };
        let source = NodeId::from(endpoint_node(endpoint));
        let Some(source_node) = self.node(&source) else {
            tracing::warn!("Link {} is fed by missing node {}", link_id, source);
            return Ok(());
        };

        match &source_node.kind {
            NodeKind::Link(_) => {
                let already_wired = self.edges.iter().any(|e| e.source == source && e.target == *link_id);
                if !already_wired {
                    if self.edges.iter().any(|e| e.source == source) {
                        return Err(ParseError::LinkFanOut(source));
                    }
                    self.edges
                        .push(Edge::new(source, LINK_OUTPUT_HANDLE_ID, link_id.clone()));
                }
                Ok(())
            }
            NodeKind::Data(data) => {
                let local_id = endpoint.split_once(':').map_or("", |(_, pin)| pin);
                let pin = data
                    .pin_by_local_id(local_id)
                    .or_else(|| data.pin(local_id))
                    .map(|pin| pin.schema_key.clone())
                    .ok_or_else(|| ParseError::UnknownLinkEndpoint {
                        link: link_id.clone(),
                        endpoint: endpoint.clone(),
                    })?;

                let leaf = match &target {
                    Some(target) => self.eventual_leaf(target, links)?,
                    None => None,
                };
                let carried = leaf.as_ref().and_then(|leaf| {
                    self.edges
                        .iter_mut()
                        .find(|e| e.source == source && e.source_pin == pin && e.target == *leaf)
                });
                match carried {
                    Some(edge) => edge.retarget(link_id.clone()),
                    None => {
                        if let Some(leaf) = &leaf {
                            tracing::warn!(
                                "Link {} expected {}:{} to hold {}; connecting the link directly",
                                link_id,
                                source,
                                pin,
                                leaf
                            );
                        }
                        self.edges.push(Edge::new(source, pin, link_id.clone()));
                    }
                }
                Ok(())
            }
            NodeKind::RawJson(_) | NodeKind::Group(_) | NodeKind::Comment(_) => {
                Err(ParseError::UnknownLinkEndpoint {
                    link: link_id.clone(),
                    endpoint: endpoint.clone(),
                })
            }
        }
    }

    /// First non-link node reached by following link outputs from `start`
    fn eventual_leaf(
        &self,
        start: &NodeId,
        links: &IndexMap<String, LinkMetadata>,
    ) -> Result<Option<NodeId>, ParseError> {
        let mut current = start.clone();
        let mut seen: IndexSet<NodeId> = IndexSet::new();
        while let Some(link) = links.get(current.as_str()) {
            if !seen.insert(current.clone()) {
                return Err(ParseError::LinkCycle(current));
            }
            match link.output_connections.first() {
                Some(connection) => current = NodeId::from(endpoint_node(connection)),
                None => return Ok(None),
            }
        }
        Ok(self.node(&current).map(|_| current))
    }

    fn add_group(&mut self, group: &GroupMetadata) -> Result<(), ParseError> {
        let id = group
            .node_id
            .as_deref()
            .map_or_else(|| NodeId::generate(NodeType::GroupNode.id_prefix()), NodeId::from);
        let (position, width, height) = read_rectangle(&id, group.position, group.width, group.height)?;
        let node = Node::group(id, group.name.clone(), width, height);
        self.add_node(Node { position, ..node })
    }

    fn add_comment(&mut self, comment: &CommentMetadata) -> Result<(), ParseError> {
        let id = comment
            .node_id
            .as_deref()
            .map_or_else(|| NodeId::generate(NodeType::CommentNode.id_prefix()), NodeId::from);
        let (position, width, height) =
            read_rectangle(&id, comment.position, comment.width, comment.height)?;
        let mut node = Node::comment(id, comment.name.clone(), comment.text.clone(), width, height);
        node.position = position;
        if let NodeKind::Comment(data) = &mut node.kind {
            data.font_size =
                CommentNodeData::clamp_font_size(comment.font_size.unwrap_or(COMMENT_DEFAULT_FONT_SIZE));
        }
        self.add_node(node)
    }

    fn finish(self, root_id: NodeId) -> Result<ParsedDocument, ParseError> {
        let nodes: Vec<Node> = self.slots.into_iter().flatten().collect();
        let unpositioned = nodes
            .iter()
            .filter(|node| !self.positioned.contains(&node.id))
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        if !unpositioned.is_empty() {
            tracing::debug!("{} node(s) have no stored position", unpositioned.len());
        }
        let graph = Graph::from_parts(Some(root_id), nodes, self.edges)?;
        Ok(ParsedDocument {
            graph,
            unpositioned,
        })
    }
}

fn read_node_id(object: &Map<String, Value>, path: &str) -> Result<Option<NodeId>, ParseError> {
    match object.get(keys::NODE_ID).or_else(|| object.get(keys::LEGACY_NODE_ID)) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(id)) if !id.is_empty() => Ok(Some(NodeId::from(id.as_str()))),
        Some(_) => Err(ParseError::InvalidNodeId {
            path: path.to_string(),
        }),
    }
}

fn read_rectangle(
    id: &NodeId,
    position: Option<DefinedPosition>,
    width: Option<f64>,
    height: Option<f64>,
) -> Result<(Position, f64, f64), ParseError> {
    let position = position.ok_or_else(|| ParseError::MissingPosition(id.clone()))?;
    match (width, height) {
        (Some(width), Some(height)) => Ok((position.into(), width, height)),
        _ => Err(ParseError::MissingSize(id.clone())),
    }
}

/// Node part of a `{node}:{pin}` endpoint
fn endpoint_node(endpoint: &str) -> &str {
    endpoint.split_once(':').map_or(endpoint, |(node, _)| node)
}

/// Error when parsing a document; every variant is a malformed document
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Text is not JSON
    #[error("Malformed document: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// An object was required
    #[error("Malformed document: expected an object at {path}")]
    NotAnObject {
        /// Location in the document
        path: String,
    },

    /// `$NodeID` is not a non-empty string
    #[error("Malformed document: invalid node id at {path}")]
    InvalidNodeId {
        /// Location in the document
        path: String,
    },

    /// A pin holds the wrong shape
    #[error("Malformed document: expected {expected} at {path}")]
    InvalidPinValue {
        /// Location in the document
        path: String,
        /// Required shape
        expected: &'static str,
    },

    /// Variant discriminator has no template
    #[error("Malformed document: {kind} has no variant {variant:?}")]
    UnknownVariant {
        /// Variant kind
        kind: String,
        /// Discriminator value
        variant: String,
    },

    /// Declared template is not registered
    #[error("Malformed document: unknown template {0}")]
    UnknownTemplate(String),

    /// Node id used twice
    #[error("Malformed document: duplicate node id {0}")]
    DuplicateNodeId(NodeId),

    /// Metadata entry without a position
    #[error("Malformed document: no position stored for {0}")]
    MissingPosition(NodeId),

    /// Position that is not `{ $x, $y }`
    #[error("Malformed document: invalid position on {0}")]
    InvalidPosition(NodeId),

    /// Group or comment without width and height
    #[error("Malformed document: no size stored for {0}")]
    MissingSize(NodeId),

    /// Metadata block with the wrong shape
    #[error("Malformed document: invalid editor metadata: {0}")]
    InvalidMetadata(String),

    /// Link endpoint that names no output pin
    #[error("Malformed document: link {link} has invalid endpoint {endpoint:?}")]
    UnknownLinkEndpoint {
        /// Link node
        link: NodeId,
        /// Stored endpoint
        endpoint: String,
    },

    /// Link with more than one outbound connection
    #[error("Malformed document: link {0} has more than one output")]
    LinkFanOut(NodeId),

    /// Links feeding each other
    #[error("Malformed document: link cycle through {0}")]
    LinkCycle(NodeId),

    /// Parsed nodes do not form a valid graph
    #[error("Malformed document: {0}")]
    Graph(#[from] GraphError),
}
