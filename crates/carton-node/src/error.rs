use thiserror::Error;

use crate::node::NodeTypeId;

/// Errors from node encoding and decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NodeError {
    /// No decoder is registered for this type GUID.
    #[error("unknown node type: {0}")]
    UnknownNodeType(NodeTypeId),

    /// The type is known but the payload was written by a newer schema.
    ///
    /// Forward compatibility is a hard error, never a silent truncation.
    #[error("unsupported version {version} for node type {type_id} (supported <= {supported})")]
    UnsupportedVersion {
        type_id: NodeTypeId,
        version: u16,
        supported: u16,
    },

    /// A typed decoder was handed a node of a different type.
    #[error("node type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: NodeTypeId,
        actual: NodeTypeId,
    },

    /// The payload bytes do not decode under the type's schema.
    #[error("malformed node payload: {0}")]
    MalformedPayload(String),
}

impl From<carton_types::TypeError> for NodeError {
    fn from(e: carton_types::TypeError) -> Self {
        NodeError::MalformedPayload(e.to_string())
    }
}

/// Result alias for node operations.
pub type NodeResult<T> = Result<T, NodeError>;
