// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pin definitions for node outputs/inputs.

use serde::{Deserialize, Serialize};

/// Handle id of the single input every accepting node exposes
pub const INPUT_HANDLE_ID: &str = "input";

/// Handle id of the single output a link node exposes
pub const LINK_OUTPUT_HANDLE_ID: &str = "output";

/// How many children an output pin holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinMultiplicity {
    /// At most one child, stored as a nested object
    Single,
    /// Ordered children, stored as an array
    Multiple,
    /// Keyed children, stored as an object keyed by the child's title
    Map,
}

impl PinMultiplicity {
    /// Whether the pin admits more than one outgoing edge
    pub fn allows_fan_out(&self) -> bool {
        match self {
            Self::Single => false,
            Self::Multiple | Self::Map => true,
        }
    }
}

/// A declared output pin on a data node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPin {
    /// Document key the children are stored under
    pub schema_key: String,
    /// Template-local pin id (used by link endpoints)
    pub local_id: String,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Multiplicity of the pin
    #[serde(rename = "type")]
    pub multiplicity: PinMultiplicity,
}

impl OutputPin {
    /// Create a new output pin whose local id equals its schema key
    pub fn new(schema_key: impl Into<String>, multiplicity: PinMultiplicity) -> Self {
        let schema_key = schema_key.into();
        Self {
            local_id: schema_key.clone(),
            schema_key,
            label: None,
            multiplicity,
        }
    }

    /// Create a `single` pin
    pub fn single(schema_key: impl Into<String>) -> Self {
        Self::new(schema_key, PinMultiplicity::Single)
    }

    /// Create a `multiple` pin
    pub fn multiple(schema_key: impl Into<String>) -> Self {
        Self::new(schema_key, PinMultiplicity::Multiple)
    }

    /// Create a `map` pin
    pub fn map(schema_key: impl Into<String>) -> Self {
        Self::new(schema_key, PinMultiplicity::Map)
    }

    /// Set the local id
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = local_id.into();
        self
    }

    /// Set the label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_wire_format() {
        let pin: OutputPin = serde_json::from_value(serde_json::json!({
            "schemaKey": "Children",
            "localId": "ChildrenPin",
            "type": "multiple"
        }))
        .unwrap();
        assert_eq!(pin.schema_key, "Children");
        assert_eq!(pin.local_id, "ChildrenPin");
        assert_eq!(pin.multiplicity, PinMultiplicity::Multiple);
        assert!(pin.multiplicity.allows_fan_out());
        assert!(!PinMultiplicity::Single.allows_fan_out());
    }
}
