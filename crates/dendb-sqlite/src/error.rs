//! Error types for the SQLite engine

use dendb_core::{CodecError, DeclarationError};
use thiserror::Error;

/// SQLite engine error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration could not be read or parsed
    #[error("Config error: {0}")]
    Config(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// A statement failed; carries the statement text
    #[error("Statement failed: {sql}: {source}")]
    Statement {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// The name is not declared, or not declared with the expected kind
    #[error("Unknown relationship: {0}")]
    UnknownRelationship(String),

    /// The codec refused the serialized object
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl SqliteError {
    pub fn statement(sql: impl Into<String>, source: rusqlite::Error) -> Self {
        Self::Statement {
            sql: sql.into(),
            source,
        }
    }

    pub fn unknown_relationship(name: impl Into<String>) -> Self {
        Self::UnknownRelationship(name.into())
    }
}
