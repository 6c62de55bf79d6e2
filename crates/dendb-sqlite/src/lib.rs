//! SQLite engine for dendb
//!
//! Persists domain objects as JSON blobs in a main table and keeps
//! denormalized projections of their fields next to them: index columns,
//! one-to-many side tables and many-to-many link tables. Projections can be
//! added and dropped at runtime; existing rows are backfilled from the blobs.
//!
//! ## Features
//!
//! - **Migrations**: idempotent schema creation, add with backfill, drop with
//!   a table rebuild when the backend cannot drop columns
//! - **Repair**: recovers from an interrupted rebuild and reinstalls missing
//!   projections
//! - **Navigation**: list objects and relationship values filtered by
//!   AND-combined relationship predicates
//! - **One connection**: every store operation holds the single
//!   `Mutex<Connection>` for its whole run, so operations are serialized
//!   rather than concurrent
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dendb_core::{JsonCodec, SchemaDescriptor};
//! use dendb_sqlite::{DenormalizedStore, SqliteConfig};
//!
//! let mut schema = SchemaDescriptor::new("pet")?;
//! schema.begin_declarations();
//! schema.declare_index("name", "VARCHAR(64)")?;
//! schema.declare_one_to_many("garden", "VARCHAR(32)", true)?;
//! schema.declare_many_to_many("places", "VARCHAR(32)", false)?;
//! schema.end_declarations();
//!
//! let store = DenormalizedStore::open(SqliteConfig::new("./pets.db"), JsonCodec::<Pet>::new())?;
//! store.create_schema(&schema)?;
//! let id = store.add_object(&schema, &pet, true)?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
mod exec;
mod projection;
pub mod schema;
pub mod store;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use schema::introspect::introspect;
pub use schema::Migrator;
pub use store::navigation::{Navigator, Predicates, RelationshipValue};
pub use store::objects::Objects;
pub use store::DenormalizedStore;
