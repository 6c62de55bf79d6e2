//! Core abstractions for dendb
//!
//! dendb persists a domain object as a single serialized blob and projects
//! selected fields into indexed columns and side tables so they can be
//! queried. This crate holds everything that does not touch a live
//! connection:
//!
//! - [`schema`]: the declaration registry ([`SchemaDescriptor`])
//! - [`kind`]: SQL-type dispatch ([`ColumnKind`]) and projected values ([`SqlValue`])
//! - [`naming`]: table, column, index and constraint naming conventions
//! - [`backend`]: capability and SQL-generation strategy per SQL engine
//! - [`codec`]: the contract a domain type implements to be stored
//!
//! The engines that execute against SQLite live in `dendb-sqlite`.

pub mod backend;
pub mod codec;
pub mod error;
pub mod kind;
pub mod naming;
pub mod schema;

pub use backend::{Backend, MysqlBackend, SqliteBackend};
pub use codec::{JsonCodec, ListEntry, ObjectCodec, ObjectLookup};
pub use error::{CodecError, DeclarationError};
pub use kind::{ColumnKind, SqlValue};
pub use schema::{RelationKind, Relationship, SchemaDescriptor};
