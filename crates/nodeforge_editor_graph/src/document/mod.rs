// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mapping between asset documents and the editor graph.
//!
//! An asset document is a nested JSON object. Ordinary keys are asset fields,
//! nested objects under declared output pins are child nodes, and the
//! `$NodeEditorMetadata` block on the root keeps everything that has no
//! field-level meaning (positions, titles, floating subtrees, links, groups
//! and comments).

pub mod keys;
pub mod metadata;
mod parse;
mod serialize;

pub use metadata::EditorMetadata;
pub use parse::{parse_document, parse_document_value, ParseError, ParsedDocument};
pub use serialize::{serialize_document, SerializeError};

use serde::ser::Error as _;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A serialized document: the asset body plus its editor metadata
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AssetDocument {
    /// Root asset object, without the metadata block
    pub body: Map<String, Value>,
    /// Editor metadata
    pub metadata: EditorMetadata,
}

impl AssetDocument {
    /// The document as a single JSON value, metadata block last
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        let mut root = self.body.clone();
        root.insert(
            keys::EDITOR_METADATA.to_string(),
            serde_json::to_value(&self.metadata)?,
        );
        Ok(Value::Object(root))
    }
}

/// Indentation used when rendering document text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Indent {
    /// One tab per level
    #[default]
    Tab,
    /// A number of spaces per level
    Spaces(u8),
}

impl Indent {
    fn as_bytes(&self) -> Vec<u8> {
        match self {
            Self::Tab => b"\t".to_vec(),
            Self::Spaces(count) => vec![b' '; usize::from(*count)],
        }
    }
}

/// Render a document as pretty-printed text
pub fn render_document(document: &AssetDocument, indent: Indent) -> Result<String, serde_json::Error> {
    let value = document.to_value()?;
    let indent = indent.as_bytes();
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&indent);
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(serde_json::Error::custom)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::port::OutputPin;
    use crate::workspace::{NodeTemplate, VariantKind, WorkspaceContext};
    use serde_json::json;

    /// A small biome workspace: a `Biome` root with a density tree and named layers
    pub(crate) fn biome_context() -> WorkspaceContext {
        let mut context = WorkspaceContext::new(Some("Biome"));
        context.root_menu_name = Some("Biome Editor".to_string());

        context.register(
            NodeTemplate::new("Biome")
                .with_pin(
                    OutputPin::single("Density").with_local_id("DensityPin"),
                    Some("Density"),
                )
                .with_pin(OutputPin::map("Layers").with_local_id("LayersPin"), Some("Layer"))
                .with_field("Name", None),
        );
        context.register(
            NodeTemplate::new("Constant")
                .with_field("Value", Some(json!(0.0)))
                .with_constant("Type", "Constant"),
        );
        context.register(
            NodeTemplate::new("Sum")
                .with_pin(OutputPin::multiple("Inputs").with_local_id("InputsPin"), Some("Density"))
                .with_constant("Type", "Sum"),
        );
        context.register(
            NodeTemplate::new("Clamp")
                .with_pin(OutputPin::single("Input").with_local_id("InputPin"), Some("Density"))
                .with_field("Min", Some(json!(0.0)))
                .with_field("Max", Some(json!(1.0)))
                .with_constant("Type", "Clamp"),
        );
        context.register(NodeTemplate::new("Layer").with_field("Weight", Some(json!(1))));

        let mut density = VariantKind {
            variant_field_name: "Type".to_string(),
            ..Default::default()
        };
        for variant in ["Constant", "Sum", "Clamp"] {
            density
                .variants
                .insert(variant.to_string(), variant.to_string());
        }
        context.register_variant_kind("Density", density);
        context
    }
}
