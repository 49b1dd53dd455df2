// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reserved document keys.
//!
//! Every key starting with `$` is editor bookkeeping and never an asset field.

/// Node identity
pub const NODE_ID: &str = "$NodeID";
/// Older spelling of [`NODE_ID`], still accepted on read
pub const LEGACY_NODE_ID: &str = "$NodeId";
/// Per-node comment
pub const COMMENT: &str = "$Comment";
/// Per-node position, only found in older documents
pub const POSITION: &str = "$Position";
/// Editor metadata block on the document root
pub const EDITOR_METADATA: &str = "$NodeEditorMetadata";
/// Group list on the document root, only found in older documents
pub const LEGACY_GROUPS: &str = "$Groups";

/// Whether a document key is reserved for the editor
pub fn is_reserved(key: &str) -> bool {
    key.starts_with('$')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_keys() {
        for key in [NODE_ID, LEGACY_NODE_ID, COMMENT, POSITION, EDITOR_METADATA, LEGACY_GROUPS] {
            assert!(is_reserved(key));
        }
        assert!(!is_reserved("Type"));
    }
}
