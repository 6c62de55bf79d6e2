//! Error types shared by every dendb backend

use thiserror::Error;

/// Errors raised while declaring relationships.
///
/// These are programming errors: they surface during development and are
/// never tolerated silently.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    /// A `declare_*` call happened outside `begin_declarations()`/`end_declarations()`
    #[error("Cannot declare '{0}' outside a declaration phase")]
    OutsideDeclarationPhase(String),

    /// An unbounded text column was declared as an index
    #[error("Column '{column}' of type {sql_type} cannot be indexed")]
    UnindexableText { column: String, sql_type: String },

    /// The name is already declared as a relationship of any kind
    #[error("Relationship '{0}' is already declared")]
    Duplicate(String),

    /// Table and relationship names are interpolated into SQL and must be plain identifiers
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// The name, or a table or column derived from it, is already taken by
    /// the main table's own structure or by another relationship
    #[error("'{name}' collides with existing name '{existing}'")]
    Collision { name: String, existing: String },
}

/// Errors raised by an [`ObjectCodec`](crate::codec::ObjectCodec)
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Deserialization error: {0}")]
    Deserialize(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn serialize<S: Into<String>>(msg: S) -> Self {
        Self::Serialize(msg.into())
    }

    pub fn deserialize<S: Into<String>>(msg: S) -> Self {
        Self::Deserialize(msg.into())
    }
}
