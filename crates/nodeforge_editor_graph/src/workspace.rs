// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workspace context: node templates and variant kinds.
//!
//! A workspace describes which node templates exist, which fields and output
//! pins each template declares, and which templates may appear under a pin.
//! The host resolves it once per document and it stays immutable for the
//! editing session.

use crate::node::{DataNodeData, Node, NodeId};
use crate::port::OutputPin;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Editor widget used for a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldComponentType {
    /// Checkbox
    Checkbox,
    /// Enum dropdown
    Enum,
    /// Single-line string
    #[default]
    String,
    /// Multi-line string
    Text,
    /// File path
    Filepath,
    /// List of values
    List,
    /// Integer
    Int,
    /// Float
    Float,
    /// Nested object
    Object,
    /// Integer slider
    Intslider,
}

/// A field declared by a template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeField {
    /// Document key of the field
    #[serde(default)]
    pub schema_key: Option<String>,
    /// Widget type
    #[serde(rename = "type", default)]
    pub component: FieldComponentType,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Preferred widget width
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_width: Option<f64>,
}

/// A processed node template
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTemplate {
    /// Unique template identifier
    pub template_id: String,
    /// Default title shown in the node header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_title: Option<String>,
    /// Add-menu category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Pin schema key -> variant kind id or template id of the children
    #[serde(default)]
    pub child_types: IndexMap<String, String>,
    /// Fields by schema key
    #[serde(default)]
    pub fields_by_schema_key: IndexMap<String, NodeField>,
    /// Declared output pins
    #[serde(default)]
    pub output_pins: Vec<OutputPin>,
    /// Constant document values, e.g. `Type -> "Biome"`
    #[serde(default)]
    pub schema_constants: IndexMap<String, String>,
}

impl NodeTemplate {
    /// Create an empty template
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            ..Default::default()
        }
    }

    /// Declare an output pin whose children resolve to `child_type`
    pub fn with_pin(mut self, pin: OutputPin, child_type: Option<&str>) -> Self {
        if let Some(child_type) = child_type {
            self.child_types
                .insert(pin.schema_key.clone(), child_type.to_string());
        }
        self.output_pins.push(pin);
        self
    }

    /// Declare a field with an optional default
    pub fn with_field(mut self, schema_key: impl Into<String>, default: Option<Value>) -> Self {
        let schema_key = schema_key.into();
        self.fields_by_schema_key.insert(
            schema_key.clone(),
            NodeField {
                schema_key: Some(schema_key),
                value: default,
                ..Default::default()
            },
        );
        self
    }

    /// Declare a schema constant
    pub fn with_constant(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.schema_constants.insert(key.into(), value.into());
        self
    }

    /// Fresh payload for a node of this template, fields at their defaults
    pub fn instantiate_data(&self) -> DataNodeData {
        DataNodeData {
            template_id: self.template_id.clone(),
            output_pins: self.output_pins.clone(),
            fields: self
                .fields_by_schema_key
                .iter()
                .map(|(key, field)| (key.clone(), field.value.clone()))
                .collect(),
            title_override: None,
            comment: None,
            unparsed_metadata: serde_json::Map::new(),
            schema_constants: self.schema_constants.clone(),
        }
    }

    /// Create a new node of this template with a generated id
    pub fn create_node(&self) -> Node {
        Node::data(NodeId::generate(&self.template_id), self.instantiate_data())
    }
}

/// A family of templates distinguished by a discriminator field
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariantKind {
    /// Document field holding the discriminator (e.g. `Type`)
    pub variant_field_name: String,
    /// Discriminator value -> template id
    #[serde(default)]
    pub variants: IndexMap<String, String>,
}

/// Everything the parser and serializer need to know about a workspace
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceContext {
    /// Template or variant kind of the document root
    #[serde(default)]
    pub root_template_or_variant_id: Option<String>,
    /// Menu name, saved as `$WorkspaceID`
    #[serde(default)]
    pub root_menu_name: Option<String>,
    /// Registered templates
    #[serde(default)]
    pub node_templates_by_id: IndexMap<String, NodeTemplate>,
    /// Registered variant kinds
    #[serde(default)]
    pub variant_kinds_by_id: IndexMap<String, VariantKind>,
    /// Add-menu categories (category -> template ids)
    #[serde(default)]
    pub template_categories: IndexMap<String, Vec<String>>,
}

impl WorkspaceContext {
    /// Create an empty context whose root resolves to `root`
    pub fn new(root: Option<&str>) -> Self {
        Self {
            root_template_or_variant_id: root.map(str::to_string),
            ..Default::default()
        }
    }

    /// Parse a context from its JSON form
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Register a template
    pub fn register(&mut self, template: NodeTemplate) {
        self.node_templates_by_id
            .insert(template.template_id.clone(), template);
    }

    /// Register a variant kind
    pub fn register_variant_kind(&mut self, id: impl Into<String>, kind: VariantKind) {
        self.variant_kinds_by_id.insert(id.into(), kind);
    }

    /// Get a template by ID
    pub fn template(&self, id: &str) -> Option<&NodeTemplate> {
        self.node_templates_by_id.get(id)
    }

    /// Get a variant kind by ID
    pub fn variant_kind(&self, id: &str) -> Option<&VariantKind> {
        self.variant_kinds_by_id.get(id)
    }

    /// Templates that may be attached where `kind_or_template` is expected.
    ///
    /// Unconstrained pins (`None`) accept every template.
    pub fn valid_templates(&self, kind_or_template: Option<&str>) -> Vec<&NodeTemplate> {
        let Some(id) = kind_or_template else {
            return self.node_templates_by_id.values().collect();
        };
        if let Some(kind) = self.variant_kind(id) {
            return kind
                .variants
                .values()
                .filter_map(|template_id| self.template(template_id))
                .collect();
        }
        self.template(id).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::PinMultiplicity;
    use serde_json::json;

    #[test]
    fn test_context_from_json() {
        let context = WorkspaceContext::from_json(
            &json!({
                "rootTemplateOrVariantId": "Density",
                "rootMenuName": "Density Editor",
                "nodeTemplatesById": {
                    "Constant": {
                        "templateId": "Constant",
                        "fieldsBySchemaKey": {
                            "Value": { "schemaKey": "Value", "type": "float", "value": 1.0 }
                        },
                        "schemaConstants": { "Type": "Constant" }
                    },
                    "Sum": {
                        "templateId": "Sum",
                        "childTypes": { "Inputs": "Density" },
                        "outputPins": [
                            { "schemaKey": "Inputs", "localId": "InputsPin", "type": "multiple" }
                        ],
                        "schemaConstants": { "Type": "Sum" }
                    }
                },
                "variantKindsById": {
                    "Density": {
                        "VariantFieldName": "Type",
                        "Variants": { "Constant": "Constant", "Sum": "Sum" }
                    }
                }
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(context.root_template_or_variant_id.as_deref(), Some("Density"));
        let sum = context.template("Sum").unwrap();
        assert_eq!(sum.output_pins[0].multiplicity, PinMultiplicity::Multiple);
        assert_eq!(sum.child_types["Inputs"], "Density");
        assert_eq!(context.valid_templates(Some("Density")).len(), 2);
        assert_eq!(context.valid_templates(Some("Sum")).len(), 1);
        assert_eq!(context.valid_templates(None).len(), 2);
    }

    #[test]
    fn test_instantiate_uses_defaults() {
        let template = NodeTemplate::new("Constant").with_field("Value", Some(json!(1.0)));
        let node = template.create_node();
        assert_eq!(node.id.template_prefix(), Some("Constant"));
        let crate::node::NodeKind::Data(data) = node.kind else {
            panic!("expected data node");
        };
        assert_eq!(data.fields["Value"], Some(json!(1.0)));
    }
}
