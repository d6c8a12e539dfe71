//! Marshaling and schema errors.

use thiserror::Error;

/// Errors raised while validating, serializing or deserializing a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    /// A value failed its descriptor's check.
    #[error("Expected {expected}, but received: {received}")]
    TypeMismatch { expected: String, received: String },

    /// An envelope carried a tag the descriptor cannot dispatch on.
    #[error("unknown tag {tag:?} while decoding {expected}")]
    UnknownTag { expected: String, tag: String },

    /// The payload did not have the shape the descriptor produces.
    #[error("malformed payload for {expected}: {reason}")]
    MalformedPayload { expected: String, reason: String },

    /// The JSON was not an envelope at all.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The method has no result schema to marshal through.
    #[error("method {0} has no result schema")]
    NoResultSchema(String),
}

impl MarshalError {
    pub fn mismatch(expected: impl Into<String>, received: &crate::Value) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            received: received.to_string(),
        }
    }

    pub fn malformed(expected: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            expected: expected.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is a plain validation failure rather than a desync.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

/// Result type for marshaling.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Errors raised while building a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("duplicate tag {tag:?} in union {union}")]
    DuplicateTag { union: String, tag: String },

    #[error("union needs at least one member")]
    EmptyUnion,
}
