//! Migration engine
//!
//! Materializes a [`SchemaDescriptor`] as tables, columns and indices, and
//! evolves it at runtime. Additions backfill from the stored blobs. Removals
//! drop the physical structures; when the backend cannot drop a column, the
//! main table is rebuilt from its blobs and every remaining relationship is
//! projected again.

pub mod backfill;
pub mod introspect;

use crate::error::{SqliteError, SqliteResult};
use crate::exec::{execute, execute_all, execute_ddl, within_savepoint};
use backfill::{backfill_index, backfill_many_to_many, backfill_one_to_many};
use dendb_core::naming::{self, BLOB_COLUMN};
use dendb_core::{Backend, RelationKind, Relationship, SchemaDescriptor};
use introspect::{column_exists, index_exists, table_exists};
use rusqlite::Connection;
use tracing::{debug, info};

const DROP_SAVEPOINT: &str = "dendb_drop";
const REBUILD_SAVEPOINT: &str = "dendb_rebuild";
const REPAIR_SAVEPOINT: &str = "dendb_repair";

/// Schema operations over one connection
pub struct Migrator<'a> {
    conn: &'a Connection,
    backend: &'a dyn Backend,
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a Connection, backend: &'a dyn Backend) -> Self {
        Self { conn, backend }
    }

    /// Create the main table and every declared relationship.
    ///
    /// Structures that already exist are left untouched, so this is safe to
    /// call every time a database is opened.
    pub fn create_schema(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        self.create_main_table(schema)?;
        self.install_all(schema)?;

        info!(
            table = %schema.table(),
            relationships = schema.relationships().count(),
            "Schema created"
        );
        Ok(())
    }

    /// Declare and install a scalar column, then backfill it.
    ///
    /// Returns `false` without touching anything when `name` is already declared.
    pub fn add_index(
        &self,
        schema: &mut SchemaDescriptor,
        name: &str,
        sql_type: &str,
    ) -> SqliteResult<bool> {
        self.add(schema, RelationKind::Index, name, sql_type, true)
    }

    pub fn add_one_to_many(
        &self,
        schema: &mut SchemaDescriptor,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> SqliteResult<bool> {
        self.add(schema, RelationKind::OneToMany, name, sql_type, indexed)
    }

    pub fn add_many_to_many(
        &self,
        schema: &mut SchemaDescriptor,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> SqliteResult<bool> {
        self.add(schema, RelationKind::ManyToMany, name, sql_type, indexed)
    }

    fn add(
        &self,
        schema: &mut SchemaDescriptor,
        kind: RelationKind,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> SqliteResult<bool> {
        if schema.type_of(name).is_some() {
            debug!(relationship = %name, "Already declared");
            return Ok(false);
        }

        let rel = schema.register(kind, name, sql_type, indexed)?.clone();
        let installed = match kind {
            RelationKind::Index => self.install_index(schema, &rel),
            RelationKind::OneToMany => self.install_one_to_many(schema, &rel),
            RelationKind::ManyToMany => self.install_many_to_many(schema, &rel),
        };

        if let Err(e) = installed {
            schema.remove(name);
            return Err(e);
        }

        info!(table = %schema.table(), relationship = %name, kind = ?kind, "Relationship added");
        Ok(true)
    }

    /// Remove a scalar column
    pub fn drop_index(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.drop(schema, RelationKind::Index, name)
    }

    /// Remove a one-to-many relationship with its side table
    pub fn drop_one_to_many(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.drop(schema, RelationKind::OneToMany, name)
    }

    /// Remove a many-to-many relationship with its side and link tables
    pub fn drop_many_to_many(&self, schema: &mut SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.drop(schema, RelationKind::ManyToMany, name)
    }

    fn drop(&self, schema: &mut SchemaDescriptor, kind: RelationKind, name: &str) -> SqliteResult<()> {
        if schema.kind_of(name) != Some(kind) {
            return Err(SqliteError::unknown_relationship(name));
        }

        let snapshot = schema.clone();
        schema.remove(name);

        let remaining: &SchemaDescriptor = schema;
        let dropped = self.atomically(DROP_SAVEPOINT, || match kind {
            RelationKind::Index => self.drop_index_structures(remaining, name),
            RelationKind::OneToMany => self.drop_one_to_many_structures(remaining, name),
            RelationKind::ManyToMany => self.drop_many_to_many_structures(remaining, name),
        });

        if let Err(e) = dropped {
            *schema = snapshot;
            return Err(e);
        }

        info!(table = %schema.table(), relationship = %name, kind = ?kind, "Relationship dropped");
        Ok(())
    }

    fn drop_index_structures(&self, schema: &SchemaDescriptor, name: &str) -> SqliteResult<()> {
        self.drop_index_if_exists(schema.table(), name)?;
        self.drop_main_column(schema, name)
    }

    fn drop_one_to_many_structures(&self, schema: &SchemaDescriptor, name: &str) -> SqliteResult<()> {
        if self.backend.supports_alter_add_constraint() {
            self.drop_foreign_key(schema.table(), name);
        }
        self.drop_index_if_exists(schema.table(), name)?;
        self.drop_main_column(schema, &naming::id_column(name))?;
        self.drop_table_if_exists(name)
    }

    fn drop_many_to_many_structures(&self, schema: &SchemaDescriptor, name: &str) -> SqliteResult<()> {
        // Nothing on the main table refers to the link table
        self.drop_table_if_exists(&schema.link_table(name))?;
        self.drop_table_if_exists(name)
    }

    /// Constraints that never existed are expected here, so failures are only logged
    fn drop_foreign_key(&self, table: &str, foreign: &str) {
        let sql = self.backend.drop_foreign_key(table, foreign);
        if let Err(e) = self.conn.execute_batch(&sql) {
            debug!(
                constraint = %naming::foreign_key_name(table, foreign),
                sql = %sql,
                error = %e,
                "Error dropping foreign key"
            );
        }
    }

    fn drop_main_column(&self, schema: &SchemaDescriptor, column: &str) -> SqliteResult<()> {
        if !column_exists(self.conn, schema.table(), column)? {
            return Ok(());
        }

        if self.backend.supports_drop_column() {
            execute_ddl(self.conn, &self.backend.drop_column(schema.table(), column))
        } else {
            self.rebuild(schema)
        }
    }

    /// Recreate the main table with only the id and blob columns, then
    /// reinstall every relationship in `schema` from the blobs.
    pub fn rebuild(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        info!(table = %schema.table(), backend = %self.backend.name(), "Rebuilding main table");

        self.atomically(REBUILD_SAVEPOINT, || {
            self.teardown_relationships(schema)?;
            self.copy_main_table(schema)?;
            self.install_all(schema)
        })
    }

    /// Bring the physical schema back in line with `schema` after an
    /// interrupted migration.
    ///
    /// A leftover temp table either replaces a missing main table or is
    /// discarded. Every relationship is then reinstalled and backfilled.
    pub fn repair(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        info!(table = %schema.table(), "Repairing schema");

        self.atomically(REPAIR_SAVEPOINT, || {
            let temp = naming::temp_table(schema.table());
            if table_exists(self.conn, &temp)? {
                if table_exists(self.conn, schema.table())? {
                    debug!(table = %temp, "Discarding partial copy");
                    execute_ddl(self.conn, &self.backend.drop_table(&temp))?;
                } else {
                    debug!(table = %temp, "Completing interrupted rename");
                    execute_ddl(self.conn, &self.backend.rename_table(&temp, schema.table()))?;
                }
            }

            self.create_main_table(schema)?;
            self.teardown_relationships(schema)?;

            for rel in schema.indices() {
                if !self.install_index(schema, rel)? {
                    backfill_index(self.conn, schema, rel)?;
                }
            }
            for rel in schema.one_to_many() {
                self.install_one_to_many(schema, rel)?;
            }
            for rel in schema.many_to_many() {
                self.install_many_to_many(schema, rel)?;
            }
            Ok(())
        })
    }

    fn atomically<F>(&self, savepoint: &str, f: F) -> SqliteResult<()>
    where
        F: FnOnce() -> SqliteResult<()>,
    {
        if self.backend.supports_transactional_ddl() {
            within_savepoint(self.conn, savepoint, f)
        } else {
            f()
        }
    }

    fn create_main_table(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        if table_exists(self.conn, schema.table())? {
            return Ok(());
        }
        execute_ddl(
            self.conn,
            &self.backend.create_main_table(schema.table(), schema.table()),
        )
    }

    /// Copy id and blob into `<table>_temp`, then swap it in
    fn copy_main_table(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        let table = schema.table();
        let temp = naming::temp_table(table);
        let id = schema.main_id_column();

        self.drop_table_if_exists(&temp)?;
        execute_ddl(self.conn, &self.backend.create_main_table(&temp, table))?;

        let copy = format!(
            "INSERT INTO {} ({}, {}) SELECT {}, {} FROM {}",
            temp, id, BLOB_COLUMN, id, BLOB_COLUMN, table
        );
        let rows = execute(self.conn, &copy, [])?;
        debug!(table = %table, rows, "Copied main table");

        execute_ddl(self.conn, &self.backend.drop_table(table))?;
        execute_ddl(self.conn, &self.backend.rename_table(&temp, table))
    }

    /// Drop side and link tables of every relationship in `schema`. The
    /// declarations themselves are untouched.
    fn teardown_relationships(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        for rel in schema.one_to_many() {
            self.drop_table_if_exists(&rel.name)?;
        }
        for rel in schema.many_to_many() {
            self.drop_table_if_exists(&schema.link_table(&rel.name))?;
            self.drop_table_if_exists(&rel.name)?;
        }
        Ok(())
    }

    fn install_all(&self, schema: &SchemaDescriptor) -> SqliteResult<()> {
        for rel in schema.indices() {
            self.install_index(schema, rel)?;
        }
        for rel in schema.one_to_many() {
            self.install_one_to_many(schema, rel)?;
        }
        for rel in schema.many_to_many() {
            self.install_many_to_many(schema, rel)?;
        }
        Ok(())
    }

    /// Add the column and its index. Backfills only when the column was created.
    fn install_index(&self, schema: &SchemaDescriptor, rel: &Relationship) -> SqliteResult<bool> {
        let table = schema.table();
        let created = !column_exists(self.conn, table, &rel.name)?;
        if created {
            execute_ddl(
                self.conn,
                &self.backend.add_column(table, &rel.name, &rel.sql_type),
            )?;
        }
        if !index_exists(self.conn, &naming::index_name(table, &rel.name))? {
            execute_ddl(self.conn, &self.backend.create_index(table, &rel.name))?;
        }

        if created {
            backfill_index(self.conn, schema, rel)?;
        }
        Ok(created)
    }

    /// Side table, foreign-key column, its index and constraint. Backfills
    /// when the side table was created.
    fn install_one_to_many(&self, schema: &SchemaDescriptor, rel: &Relationship) -> SqliteResult<bool> {
        let table = schema.table();
        let column = naming::id_column(&rel.name);

        let created = !table_exists(self.conn, &rel.name)?;
        if created {
            debug!(table = %rel.name, "Creating value table");
            execute_all(self.conn, &self.backend.create_value_table(rel))?;
        }

        if !column_exists(self.conn, table, &column)? {
            execute_ddl(self.conn, &self.backend.add_column(table, &column, "INTEGER"))?;

            // A foreign key needs an index on its column
            if !index_exists(self.conn, &naming::index_name(table, &rel.name))? {
                execute_ddl(
                    self.conn,
                    &self.backend.create_foreign_key_index(table, &rel.name),
                )?;
            }

            if self.backend.supports_alter_add_constraint() {
                execute_ddl(self.conn, &self.backend.add_foreign_key(table, &rel.name))?;
            } else {
                debug!(
                    column = %column,
                    backend = %self.backend.name(),
                    "Constraints only supported at table creation, skipping foreign key"
                );
            }
        } else if !index_exists(self.conn, &naming::index_name(table, &rel.name))? {
            execute_ddl(
                self.conn,
                &self.backend.create_foreign_key_index(table, &rel.name),
            )?;
        }

        if created {
            backfill_one_to_many(self.conn, schema, rel)?;
        }
        Ok(created)
    }

    /// Side table and link table. Backfills when the link table was created.
    fn install_many_to_many(&self, schema: &SchemaDescriptor, rel: &Relationship) -> SqliteResult<bool> {
        if !table_exists(self.conn, &rel.name)? {
            debug!(table = %rel.name, "Creating value table");
            execute_all(self.conn, &self.backend.create_value_table(rel))?;
        }

        let link = schema.link_table(&rel.name);
        let created = !table_exists(self.conn, &link)?;
        if created {
            debug!(table = %link, "Creating link table");
            execute_all(self.conn, &self.backend.create_link_table(schema.table(), rel))?;
            backfill_many_to_many(self.conn, schema, rel)?;
        }
        Ok(created)
    }

    fn drop_index_if_exists(&self, table: &str, name: &str) -> SqliteResult<()> {
        if index_exists(self.conn, &naming::index_name(table, name))? {
            execute_ddl(self.conn, &self.backend.drop_index(table, name))?;
        }
        Ok(())
    }

    fn drop_table_if_exists(&self, table: &str) -> SqliteResult<()> {
        if table_exists(self.conn, table)? {
            execute_ddl(self.conn, &self.backend.drop_table(table))?;
        }
        Ok(())
    }
}
