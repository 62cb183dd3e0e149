//! Error types for TMX parsing and serialization.
//!
//! Every deviation from the TMX 1.4b grammar is classified as one of the
//! violation kinds below before it is resolved through a policy. An
//! unresolved violation surfaces as a typed error carrying the path of the
//! offending element, never as a bare low-level parse failure.

use thiserror::Error;

/// Classification of a grammar violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// Element nesting or ordering diverges from the grammar.
    Structural,
    /// Missing required, unknown, or malformed attribute.
    Attribute,
    /// Unmatched bpt/ept index or duplicate correlation id.
    Reference,
    /// Declared encoding does not match the actual byte encoding.
    Encoding,
    /// Stream read or write failure. Never policy-downgradable.
    Io,
}

/// Errors that can occur when deserializing a TMX document.
#[derive(Debug, Error)]
pub enum DeserializationError {
    /// Element nesting/ordering violation.
    #[error("structural violation at {path}: {message}")]
    Structural { path: String, message: String },

    /// Missing required, unknown, or malformed attribute.
    #[error("attribute violation at {path}: {message}")]
    Attribute { path: String, message: String },

    /// Unmatched bpt/ept pair or duplicate correlation id.
    #[error("reference violation at {path}: {message}")]
    Reference { path: String, message: String },

    /// Declared vs. actual encoding mismatch.
    #[error("encoding violation: {message}")]
    Encoding { message: String },

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeserializationError {
    /// Returns the violation kind of this error.
    pub fn kind(&self) -> ViolationKind {
        match self {
            DeserializationError::Structural { .. } => ViolationKind::Structural,
            DeserializationError::Attribute { .. } => ViolationKind::Attribute,
            DeserializationError::Reference { .. } => ViolationKind::Reference,
            DeserializationError::Encoding { .. } => ViolationKind::Encoding,
            DeserializationError::Io(_) => ViolationKind::Io,
        }
    }

    /// Returns the path of the offending element, if the error carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            DeserializationError::Structural { path, .. }
            | DeserializationError::Attribute { path, .. }
            | DeserializationError::Reference { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Errors that can occur when serializing a TMX document.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// In-memory state violates element nesting/content rules.
    #[error("structural violation at {path}: {message}")]
    Structural { path: String, message: String },

    /// Required field missing or value not expressible in the grammar.
    #[error("attribute violation at {path}: {message}")]
    Attribute { path: String, message: String },

    /// Duplicate bpt index or unmatched bpt/ept pair.
    #[error("reference violation at {path}: {message}")]
    Reference { path: String, message: String },

    /// I/O error from the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerializationError {
    /// Returns the violation kind of this error.
    pub fn kind(&self) -> ViolationKind {
        match self {
            SerializationError::Structural { .. } => ViolationKind::Structural,
            SerializationError::Attribute { .. } => ViolationKind::Attribute,
            SerializationError::Reference { .. } => ViolationKind::Reference,
            SerializationError::Io(_) => ViolationKind::Io,
        }
    }

    /// Returns the path of the offending element, if the error carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            SerializationError::Structural { path, .. }
            | SerializationError::Attribute { path, .. }
            | SerializationError::Reference { path, .. } => Some(path),
            SerializationError::Io(_) => None,
        }
    }
}
