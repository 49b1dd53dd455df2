// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document host and editor session.
//!
//! The host owns the document text and its version. The session owns the
//! graph built from that text. They only talk through [`EditorMessage`] and
//! [`HostMessage`], so an edit based on an old version is caught and the
//! editor is resynchronized instead of overwriting newer text.

use crate::config::EditorConfig;
use crate::protocol::{EditorMessage, HostMessage};
use nodeforge_editor_graph::containment::{resolve_containment, ContainmentError};
use nodeforge_editor_graph::document::{
    parse_document, render_document, serialize_document, Indent, ParseError, SerializeError,
};
use nodeforge_editor_graph::geometry::Size;
use nodeforge_editor_graph::layout::{self, Algorithm, LayoutConfig};
use nodeforge_editor_graph::{Graph, GraphError, NodeId, WorkspaceContext};
use std::path::{Path, PathBuf};

/// Shown to the editor when its edit was based on an old version
pub const STALE_EDIT_MESSAGE: &str = "The file changed in another editor. Please retry.";

/// Owner of the document text
#[derive(Debug)]
pub struct DocumentHost {
    path: PathBuf,
    text: String,
    version: u64,
}

impl DocumentHost {
    /// Host for in-memory text
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
            version: 1,
        }
    }

    /// Read the document from disk
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        let text = read_file(path)?;
        tracing::info!("Opened document {:?} ({} bytes)", path, text.len());
        Ok(Self::new(path, text))
    }

    /// Current text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current version
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Document path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Message carrying the current text and version
    pub fn update_message(&self) -> HostMessage {
        HostMessage::Update {
            text: self.text.clone(),
            version: self.version,
            document_path: self.path.display().to_string(),
        }
    }

    /// Replace the text if the edit is based on the current version.
    ///
    /// Returns whether the text changed. The version advances on every
    /// accepted edit that changes the text.
    pub fn apply(&mut self, text: String, source_version: Option<u64>) -> Result<bool, SessionError> {
        if let Some(found) = source_version {
            if found != self.version {
                tracing::error!(
                    "Version mismatch detected when applying edit (expected {}, found {found})",
                    self.version
                );
                return Err(SessionError::StaleEdit {
                    expected: self.version,
                    found,
                });
            }
        }
        if text == self.text {
            return Ok(false);
        }
        self.text = text;
        self.version += 1;
        Ok(true)
    }

    /// Answer an editor message
    pub fn handle(&mut self, message: EditorMessage) -> Vec<HostMessage> {
        match message {
            EditorMessage::Ready => vec![self.update_message()],
            EditorMessage::Apply { text, source_version } => match self.apply(text, source_version) {
                Ok(_) => vec![self.update_message()],
                Err(err) => vec![
                    HostMessage::Error {
                        message: err.to_string(),
                    },
                    self.update_message(),
                ],
            },
        }
    }

    /// Pick up external changes; returns whether the text changed
    pub fn reload(&mut self) -> Result<bool, SessionError> {
        let text = read_file(&self.path)?;
        if text == self.text {
            return Ok(false);
        }
        self.text = text;
        self.version += 1;
        tracing::info!("Document changed on disk, now version {}", self.version);
        Ok(true)
    }

    /// Write the current text to disk
    pub fn save(&self) -> Result<(), SessionError> {
        std::fs::write(&self.path, &self.text).map_err(|source| SessionError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("Saved {:?} at version {}", self.path, self.version);
        Ok(())
    }
}

/// Editor side: the graph built from the host's text
#[derive(Debug)]
pub struct EditorSession {
    context: WorkspaceContext,
    graph: Graph,
    source_version: Option<u64>,
    /// Text the graph was last loaded from or committed as
    synced_text: Option<String>,
    document_path: Option<String>,
    unpositioned: Vec<NodeId>,
    layout: LayoutConfig,
    indent: Indent,
}

impl EditorSession {
    /// Create a session with an empty graph
    pub fn new(context: WorkspaceContext, config: &EditorConfig) -> Self {
        Self {
            context,
            graph: Graph::new(),
            source_version: None,
            synced_text: None,
            document_path: None,
            unpositioned: Vec::new(),
            layout: config.layout.clone(),
            indent: config.pretty_indent,
        }
    }

    /// Current graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Host version the next commit is based on
    pub fn source_version(&self) -> Option<u64> {
        self.source_version
    }

    /// Document path last reported by the host
    pub fn document_path(&self) -> Option<&str> {
        self.document_path.as_deref()
    }

    /// Nodes that had no stored position in the loaded document
    pub fn unpositioned(&self) -> &[NodeId] {
        &self.unpositioned
    }

    /// Process a host message.
    ///
    /// A failed parse keeps the previous graph and its version, so the next
    /// commit is stale against the host and cannot overwrite the new text.
    pub fn receive(&mut self, message: HostMessage) -> Result<(), SessionError> {
        match message {
            HostMessage::Update {
                text,
                version,
                document_path,
            } => {
                if self.synced_text.as_deref() == Some(text.as_str()) {
                    tracing::debug!("Update {version} matches the current graph");
                    self.source_version = Some(version);
                    self.document_path = Some(document_path);
                    return Ok(());
                }
                let parsed = parse_document(&text, &self.context).map_err(|err| {
                    tracing::error!("Failed to parse document version {version}: {err}");
                    err
                })?;
                if !parsed.unpositioned.is_empty() {
                    tracing::warn!("{} node(s) have no stored position", parsed.unpositioned.len());
                }
                tracing::info!(
                    "Loaded document version {version}: {} node(s), {} edge(s)",
                    parsed.graph.node_count(),
                    parsed.graph.edges().len()
                );
                self.graph = parsed.graph;
                self.unpositioned = parsed.unpositioned;
                self.synced_text = Some(text);
                self.source_version = Some(version);
                self.document_path = Some(document_path);
                Ok(())
            }
            HostMessage::Error { message } => {
                tracing::warn!("Host reported: {message}");
                Ok(())
            }
        }
    }

    /// Serialize the graph into an `apply` message based on the current version.
    ///
    /// The session only adopts a new version from the host's next `update`,
    /// so a rejected commit stays stale until the editor has resynchronized.
    pub fn commit(&mut self) -> Result<EditorMessage, SessionError> {
        let document = serialize_document(&self.graph, &self.context)?;
        let text = render_document(&document, self.indent)?;
        let message = EditorMessage::Apply {
            text: text.clone(),
            source_version: self.source_version,
        };
        self.synced_text = Some(text);
        Ok(message)
    }

    /// Give every unmeasured node a size: declared size for groups and
    /// comments, the layout fallback size otherwise
    pub fn assume_measurements(&mut self) -> Result<usize, SessionError> {
        let pending: Vec<(NodeId, Size)> = self
            .graph
            .nodes()
            .filter(|node| node.measured.is_none())
            .map(|node| (node.id.clone(), node.declared_size().unwrap_or(self.layout.node_size)))
            .collect();
        for (id, size) in &pending {
            self.graph.set_measured(id, *size)?;
        }
        Ok(pending.len())
    }

    /// Recompute group membership from the current geometry
    pub fn recalculate_groups(&mut self) -> Result<(), SessionError> {
        let nodes = resolve_containment(&self.graph)?;
        self.graph.replace_nodes(nodes)?;
        Ok(())
    }

    /// Lay out `selection` (everything when empty) and commit the positions
    pub fn auto_position(&mut self, selection: &[NodeId], algorithm: Algorithm) -> usize {
        let positions = layout::auto_position(&self.graph, selection, algorithm, &self.layout);
        self.graph.apply_positions(&positions);
        self.unpositioned.retain(|id| !positions.contains_key(id));
        positions.len()
    }
}

fn read_file(path: &Path) -> Result<String, SessionError> {
    std::fs::read_to_string(path).map_err(|source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load the workspace context from a JSON file
pub fn load_workspace(path: &Path) -> Result<WorkspaceContext, SessionError> {
    let text = read_file(path)?;
    let context = WorkspaceContext::from_json(&text).map_err(|source| SessionError::Workspace {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        "Loaded workspace {:?}: {} template(s), {} variant kind(s)",
        path,
        context.node_templates_by_id.len(),
        context.variant_kinds_by_id.len()
    );
    Ok(context)
}

/// Error in the host/session exchange
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// An edit was based on an older version of the document
    #[error("{}", STALE_EDIT_MESSAGE)]
    StaleEdit {
        /// Host version
        expected: u64,
        /// Version the edit was based on
        found: u64,
    },
    /// Reading or writing a file failed
    #[error("File {path:?}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },
    /// The workspace file is malformed
    #[error("Malformed workspace {path:?}: {source}")]
    Workspace {
        /// File involved
        path: PathBuf,
        /// Underlying error
        source: serde_json::Error,
    },
    /// Document parsing failed
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Document serialization failed
    #[error(transparent)]
    Serialize(#[from] SerializeError),
    /// Rendering document text failed
    #[error("Failed to render document: {0}")]
    Render(#[from] serde_json::Error),
    /// Containment could not run
    #[error(transparent)]
    Containment(#[from] ContainmentError),
    /// A graph mutation was rejected
    #[error(transparent)]
    Graph(#[from] GraphError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeforge_editor_graph::port::OutputPin;
    use nodeforge_editor_graph::workspace::NodeTemplate;
    use serde_json::json;

    fn context() -> WorkspaceContext {
        let mut context = WorkspaceContext::new(Some("Root"));
        context.register(
            NodeTemplate::new("Root")
                .with_pin(OutputPin::multiple("Children"), Some("Leaf"))
                .with_field("Name", None),
        );
        context.register(NodeTemplate::new("Leaf").with_field("Weight", Some(json!(1))));
        context
    }

    fn document() -> String {
        json!({
            "$NodeID": "Root-1",
            "Name": "demo",
            "Children": [
                { "$NodeID": "Leaf-1", "Weight": 2 },
                { "$NodeID": "Leaf-2", "Weight": 3 }
            ],
            "$NodeEditorMetadata": {
                "$Nodes": { "Root-1": { "$Position": { "$x": 10, "$y": 20 } } },
                "$Groups": [
                    { "$NodeID": "Group-1", "$Position": { "$x": -100, "$y": -100 },
                      "$width": 5000, "$height": 5000, "$name": "All" }
                ]
            }
        })
        .to_string()
    }

    fn connected() -> (DocumentHost, EditorSession) {
        let mut host = DocumentHost::new("demo.json", document());
        let mut session = EditorSession::new(context(), &EditorConfig::default());
        for reply in host.handle(EditorMessage::Ready) {
            session.receive(reply).unwrap();
        }
        (host, session)
    }

    #[test]
    fn test_ready_loads_graph() {
        let (host, session) = connected();
        assert_eq!(session.source_version(), Some(host.version()));
        assert_eq!(session.document_path(), Some("demo.json"));
        assert_eq!(session.graph().node_count(), 4);
        let unpositioned: Vec<&str> = session.unpositioned().iter().map(NodeId::as_str).collect();
        assert_eq!(unpositioned, vec!["Leaf-1", "Leaf-2"]);
    }

    #[test]
    fn test_commit_round_trip() {
        let (mut host, mut session) = connected();
        session.auto_position(&[], Algorithm::Tree);
        assert!(session.unpositioned().is_empty());

        let apply = session.commit().unwrap();
        let replies = host.handle(apply);
        assert_eq!(host.version(), 2);
        assert_eq!(session.source_version(), Some(1));
        for reply in replies {
            session.receive(reply).unwrap();
        }
        assert_eq!(session.source_version(), Some(2));
        assert!(host.text().starts_with("{\n\t\"$NodeID\": \"Root-1\""));

        // nothing changed since, so a second commit is a no-op for the host
        let again = session.commit().unwrap();
        host.handle(again);
        assert_eq!(host.version(), 2);
    }

    #[test]
    fn test_stale_edit_is_rejected() {
        let (mut host, mut session) = connected();
        host.apply("{}".to_string(), None).unwrap();

        let stale = session.commit().unwrap();
        let replies = host.handle(stale);
        assert_eq!(host.text(), "{}");
        assert_eq!(
            replies[0],
            HostMessage::Error {
                message: STALE_EDIT_MESSAGE.to_string()
            }
        );
        assert!(matches!(replies[1], HostMessage::Update { version: 2, .. }));
        assert!(matches!(
            host.apply("x".to_string(), Some(1)),
            Err(SessionError::StaleEdit { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_failed_parse_keeps_graph() {
        let (_, mut session) = connected();
        let before = session.graph().clone();
        let result = session.receive(HostMessage::Update {
            text: "{ not json".to_string(),
            version: 7,
            document_path: "demo.json".to_string(),
        });
        assert!(matches!(result, Err(SessionError::Parse(_))));
        assert_eq!(session.graph(), &before);
        assert_eq!(session.source_version(), Some(1));
    }

    #[test]
    fn test_broken_external_edit_is_not_overwritten() {
        let (mut host, mut session) = connected();
        host.apply("{ broken".to_string(), None).unwrap();
        assert_eq!(host.version(), 2);
        assert!(session.receive(host.update_message()).is_err());
        assert_eq!(session.source_version(), Some(1));

        let replies = host.handle(session.commit().unwrap());
        assert_eq!(host.text(), "{ broken");
        assert_eq!(host.version(), 2);
        assert_eq!(
            replies[0],
            HostMessage::Error {
                message: STALE_EDIT_MESSAGE.to_string()
            }
        );

        // Still unparseable after the resync, so retrying stays stale.
        for reply in replies {
            assert!(session.receive(reply).is_err());
        }
        host.handle(session.commit().unwrap());
        assert_eq!(host.text(), "{ broken");
    }

    #[test]
    fn test_groups_need_measurements() {
        let (_, mut session) = connected();
        assert!(matches!(
            session.recalculate_groups(),
            Err(SessionError::Containment(_))
        ));
        assert_eq!(session.assume_measurements().unwrap(), 4);
        session.recalculate_groups().unwrap();
        let leaf = session.graph().node(&NodeId::from("Leaf-1")).unwrap();
        assert_eq!(leaf.parent_id, Some(NodeId::from("Group-1")));
        let first: Vec<&str> = session.graph().node_ids().map(NodeId::as_str).collect();
        assert_eq!(first[0], "Group-1");
    }
}
