// SPDX-License-Identifier: MIT OR Apache-2.0
//! Messages exchanged between the document host and the editor session.
//!
//! Both directions are JSON objects tagged by `type`.

use serde::{Deserialize, Serialize};

/// Editor → host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorMessage {
    /// The editor is ready to receive the document
    Ready,
    /// Replace the document text
    Apply {
        /// Full serialized document
        text: String,
        /// Host version the edit was based on; omitted edits are never stale
        #[serde(rename = "sourceVersion", default, skip_serializing_if = "Option::is_none")]
        source_version: Option<u64>,
    },
}

/// Host → editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostMessage {
    /// Current document text
    Update {
        /// Full document text
        text: String,
        /// Host version of that text
        version: u64,
        /// Where the document lives
        #[serde(rename = "documentPath")]
        document_path: String,
    },
    /// Something the user should see
    Error {
        /// Human-readable description
        message: String,
    },
}
