//! Denormalized object store
//!
//! [`DenormalizedStore`] ties a connection, a backend profile and an
//! [`ObjectCodec`] together. Every call takes the [`SchemaDescriptor`] it
//! acts on; the store itself holds no schema state.

pub mod navigation;
pub mod objects;

use crate::config::SqliteConfig;
use crate::connection::SqlitePool;
use crate::error::SqliteResult;
use crate::schema::introspect::introspect;
use crate::schema::Migrator;
use dendb_core::{Backend, ObjectCodec, SchemaDescriptor, SqlValue};
use navigation::{Navigator, Predicates, RelationshipValue};
use objects::Objects;
use serde_json::Value;

/// Objects of one codec stored over SQLite
pub struct DenormalizedStore<C> {
    pool: SqlitePool,
    backend: Box<dyn Backend>,
    codec: C,
}

impl<C: ObjectCodec> DenormalizedStore<C> {
    /// Store over `pool`, with the backend profile its configuration selects
    pub fn new(pool: SqlitePool, codec: C) -> Self {
        let backend = Box::new(pool.config().backend());
        Self::with_backend(pool, backend, codec)
    }

    pub fn with_backend(pool: SqlitePool, backend: Box<dyn Backend>, codec: C) -> Self {
        Self {
            pool,
            backend,
            codec,
        }
    }

    pub fn open(config: SqliteConfig, codec: C) -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::new(config)?, codec))
    }

    /// In-memory store for testing
    pub fn memory(codec: C) -> SqliteResult<Self> {
        Ok(Self::new(SqlitePool::memory()?, codec))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    // --- Migrations ---------------------------------------------------------

    pub fn create_schema(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).create_schema(schema))
    }

    pub fn add_index(&self, schema: &mut SchemaDescriptor, name: &str, sql_type: &str) -> SqliteResult<bool> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).add_index(schema, name, sql_type))
    }

    pub fn add_one_to_many(
        &self,
        schema: &mut SchemaDescriptor,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> SqliteResult<bool> {
        self.pool.with_connection(|conn| {
            Migrator::new(conn, self.backend()).add_one_to_many(schema, name, sql_type, indexed)
        })
    }

    pub fn add_many_to_many(
        &self,
        schema: &mut SchemaDescriptor,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> SqliteResult<bool> {
        self.pool.with_connection(|conn| {
            Migrator::new(conn, self.backend()).add_many_to_many(schema, name, sql_type, indexed)
        })
    }

    pub fn drop_index(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).drop_index(schema, name))
    }

    pub fn drop_one_to_many(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).drop_one_to_many(schema, name))
    }

    pub fn drop_many_to_many(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).drop_many_to_many(schema, name))
    }

    /// Recreate the main table and every projection from the blobs
    pub fn rebuild(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).rebuild(schema))
    }

    pub fn repair(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        self.pool
            .with_connection(|conn| Migrator::new(conn, self.backend()).repair(schema))
    }

    /// Descriptor matching the tables of `table` currently on disk
    pub fn introspect(&self, table: &str) -> SqliteResult<SchemaDescriptor> {
        self.pool.with_connection(|conn| introspect(conn, table))
    }

    // --- Objects ------------------------------------------------------------

    pub fn add_object(&self, schema: &SchemaDescriptor, object: &C::Object, update: bool) -> SqliteResult<i64> {
        self.pool
            .with_connection(|conn| Objects::new(conn, &self.codec).add(schema, object, update))
    }

    pub fn get_object_by_id(&self, schema: &SchemaDescriptor, id: i64) -> SqliteResult<Option<C::Object>> {
        self.pool
            .with_connection(|conn| Objects::new(conn, &self.codec).get_by_id(schema, id))
    }

    pub fn get_object_by_index(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
    ) -> SqliteResult<Option<C::Object>> {
        self.pool.with_connection(|conn| {
            Objects::new(conn, &self.codec).get_by_index(schema, column, value)
        })
    }

    pub fn delete_object(&self, schema: &SchemaDescriptor, id: i64, kill_orphans: bool) -> SqliteResult<bool> {
        self.pool.with_connection(|conn| {
            Objects::new(conn, &self.codec).delete(schema, id, kill_orphans)
        })
    }

    pub fn delete_object_by_index(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
        kill_orphans: bool,
    ) -> SqliteResult<bool> {
        self.pool.with_connection(|conn| {
            Objects::new(conn, &self.codec).delete_by_index(schema, column, value, kill_orphans)
        })
    }

    pub fn prune_orphans(&self, schema: &SchemaDescriptor) -> SqliteResult<usize> {
        self.pool
            .with_connection(|conn| Objects::new(conn, &self.codec).prune_orphans(schema))
    }

    // --- Navigation ---------------------------------------------------------

    pub fn list_objects(&self, schema: &SchemaDescriptor, predicates: &Predicates) -> SqliteResult<Vec<C::Entry>> {
        self.pool.with_connection(|conn| {
            Navigator::new(conn).list_objects(schema, &self.codec, predicates)
        })
    }

    pub fn list_relationship_values(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        predicates: &Predicates,
    ) -> SqliteResult<Vec<RelationshipValue>> {
        self.pool.with_connection(|conn| {
            Navigator::new(conn).list_relationship_values(schema, column, predicates)
        })
    }

    pub fn resolve_value_id(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
    ) -> SqliteResult<Option<i64>> {
        self.pool
            .with_connection(|conn| Navigator::new(conn).resolve_value_id(schema, column, value))
    }

    pub fn resolve_value(&self, schema: &SchemaDescriptor, column: &str, id: i64) -> SqliteResult<Option<SqlValue>> {
        self.pool
            .with_connection(|conn| Navigator::new(conn).resolve_value(schema, column, id))
    }

    /// Rows of the main table, or of the side table of `column`
    pub fn count(&self, schema: &SchemaDescriptor, column: Option<&str>) -> SqliteResult<i64> {
        self.pool
            .with_connection(|conn| Navigator::new(conn).count(schema, column))
    }
}
