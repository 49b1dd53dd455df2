// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph model for the `NodeForge` editor.
//!
//! This crate maps JSON asset documents onto an editable node graph and back:
//! - Parsing documents into nodes and edges, guided by a workspace schema
//! - Serializing the graph into canonical document text
//! - Deriving group membership from spatial overlap
//! - Automatic tree and layered layouts
//!
//! ## Architecture
//!
//! The [`Graph`] owns nodes (in parent-before-child order) and edges. Node
//! templates, pins and variant kinds come from a [`WorkspaceContext`]. The
//! [`document`] module owns the wire format; [`containment`] and [`layout`]
//! are pure functions over a graph snapshot.

pub mod geometry;
pub mod port;
pub mod node;
pub mod connection;
pub mod workspace;
pub mod graph;
pub mod spatial;
pub mod document;
pub mod containment;
pub mod layout;

pub use geometry::{Aabb, Position, Size};
pub use port::{OutputPin, PinMultiplicity};
pub use node::{Node, NodeId, NodeKind, NodeType};
pub use connection::Edge;
pub use workspace::{NodeTemplate, VariantKind, WorkspaceContext};
pub use graph::{Graph, GraphError, PositionMap};
pub use spatial::SpatialIndex;
pub use document::{
    parse_document, render_document, serialize_document, AssetDocument, Indent, ParseError,
    ParsedDocument, SerializeError,
};
pub use containment::{resolve_containment, ContainmentError};
pub use layout::{auto_position, Algorithm, Direction, LayoutConfig};
