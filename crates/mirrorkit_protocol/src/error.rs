//! Error types for the wire model.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while decoding remote documents.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An entity type string did not match `<entity-type>--<bundle>`.
    #[error("invalid entity type id: {0:?}")]
    InvalidTypeId(String),

    /// A global identifier was not a valid UUID.
    #[error("invalid global identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A document was structurally not what was expected.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The body was not valid JSON at all.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Creates a malformed-document error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedDocument(message.into())
    }
}
