//! SQL engine capabilities and DDL generation (Strategy pattern)
//!
//! The migration engine never branches on an engine's name. It asks a
//! [`Backend`] what the engine can do and lets it write the statements whose
//! syntax differs. Supporting another engine means one more implementation
//! of this trait.

use crate::naming::{
    foreign_key_clause, foreign_key_name, id_column, index_name, link_table,
    unique_link_index_name, BLOB_COLUMN,
};
use crate::schema::Relationship;
use std::fmt::Debug;

/// Capability and SQL-generation strategy for one SQL engine
pub trait Backend: Send + Sync + Debug {
    /// Engine identifier (e.g., "sqlite", "mysql")
    fn name(&self) -> &str;

    /// Whether `ALTER TABLE ... DROP COLUMN` is available. Without it a column
    /// is removed by rebuilding the main table from the stored objects.
    fn supports_drop_column(&self) -> bool;

    /// Whether a foreign-key constraint can be added to an existing table
    fn supports_alter_add_constraint(&self) -> bool;

    /// Whether DDL statements take part in a transaction and roll back with it
    fn supports_transactional_ddl(&self) -> bool;

    /// Main table `physical`, keyed by `id<table>`, holding the serialized objects
    fn create_main_table(&self, physical: &str, table: &str) -> String {
        format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY, {} TEXT)",
            physical,
            id_column(table),
            BLOB_COLUMN
        )
    }

    /// Side table of distinct values for a one-to-many or many-to-many relationship
    fn create_value_table(&self, rel: &Relationship) -> Vec<String>;

    /// Link table between `table` and the values of a many-to-many relationship,
    /// with one index per column and the two uniqueness indices
    fn create_link_table(&self, table: &str, rel: &Relationship) -> Vec<String>;

    /// `CREATE INDEX idx_<table>_<column> ON <table> (<column>)`
    fn create_index(&self, table: &str, column: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            index_name(table, column),
            table,
            column
        )
    }

    /// `CREATE INDEX idx_<table>_<foreign> ON <table> (id<foreign>)`, required
    /// before a foreign-key constraint can reference the column
    fn create_foreign_key_index(&self, table: &str, foreign: &str) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            index_name(table, foreign),
            table,
            id_column(foreign)
        )
    }

    fn add_column(&self, table: &str, column: &str, sql_type: &str) -> String {
        format!("ALTER TABLE {} ADD {} {}", table, column, sql_type)
    }

    /// Drop the index `idx_<table>_<name>`
    fn drop_index(&self, table: &str, name: &str) -> String;

    fn drop_column(&self, table: &str, column: &str) -> String;

    /// Constraint making `<table>.id<foreign>` reference `<foreign>`
    fn add_foreign_key(&self, table: &str, foreign: &str) -> String {
        format!("ALTER TABLE {} ADD {}", table, foreign_key_clause(table, foreign))
    }

    fn drop_foreign_key(&self, table: &str, foreign: &str) -> String;

    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", table)
    }

    fn rename_table(&self, from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", from, to)
    }
}

fn value_columns(rel: &Relationship) -> String {
    format!(
        "{} INTEGER PRIMARY KEY, {} {}",
        id_column(&rel.name),
        rel.name,
        rel.sql_type
    )
}

fn link_columns(table: &str, rel: &Relationship) -> String {
    format!(
        "{} INTEGER, {} INTEGER",
        id_column(table),
        id_column(&rel.name)
    )
}

/// Embedded, file-based engine
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteBackend {
    native_drop_column: bool,
}

impl SqliteBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// SQLite 3.35 and later implement `ALTER TABLE ... DROP COLUMN`
    pub fn with_native_drop_column(native_drop_column: bool) -> Self {
        Self { native_drop_column }
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn supports_drop_column(&self) -> bool {
        self.native_drop_column
    }

    fn supports_alter_add_constraint(&self) -> bool {
        false
    }

    fn supports_transactional_ddl(&self) -> bool {
        true
    }

    fn create_value_table(&self, rel: &Relationship) -> Vec<String> {
        let mut statements = vec![format!(
            "CREATE TABLE {} ({})",
            rel.name,
            value_columns(rel)
        )];
        if rel.indexed {
            statements.push(self.create_index(&rel.name, &rel.name));
        }
        statements
    }

    fn create_link_table(&self, table: &str, rel: &Relationship) -> Vec<String> {
        let link = link_table(table, &rel.name);
        let (main_id, value_id) = (id_column(table), id_column(&rel.name));

        // Constraints can only be declared when the table is created
        vec![
            format!(
                "CREATE TABLE {} ({}, {}, {})",
                link,
                link_columns(table, rel),
                foreign_key_clause(&link, table),
                foreign_key_clause(&link, &rel.name)
            ),
            self.create_foreign_key_index(&link, table),
            self.create_foreign_key_index(&link, &rel.name),
            format!(
                "CREATE UNIQUE INDEX {} ON {} ({}, {})",
                unique_link_index_name(table, &rel.name, 1),
                link,
                main_id,
                value_id
            ),
            format!(
                "CREATE UNIQUE INDEX {} ON {} ({}, {})",
                unique_link_index_name(table, &rel.name, 2),
                link,
                value_id,
                main_id
            ),
        ]
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!("DROP INDEX {}", index_name(table, name))
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP COLUMN {}", table, column)
    }

    fn drop_foreign_key(&self, table: &str, foreign: &str) -> String {
        // Never reached while supports_alter_add_constraint() is false; the
        // statement is rejected by SQLite and the failure is swallowed.
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            table,
            foreign_key_name(table, foreign)
        )
    }
}

/// Constraint-rich server engine (MySQL / MariaDB)
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlBackend;

impl MysqlBackend {
    pub fn new() -> Self {
        Self
    }

    fn index_clause(table: &str, name: &str, column: &str) -> String {
        format!("INDEX {} ({})", index_name(table, name), column)
    }
}

impl Backend for MysqlBackend {
    fn name(&self) -> &str {
        "mysql"
    }

    fn supports_drop_column(&self) -> bool {
        true
    }

    fn supports_alter_add_constraint(&self) -> bool {
        true
    }

    fn supports_transactional_ddl(&self) -> bool {
        // DDL commits implicitly
        false
    }

    fn create_main_table(&self, physical: &str, table: &str) -> String {
        format!(
            "CREATE TABLE {} ({} INTEGER PRIMARY KEY AUTO_INCREMENT, {} TEXT)",
            physical,
            id_column(table),
            BLOB_COLUMN
        )
    }

    fn create_value_table(&self, rel: &Relationship) -> Vec<String> {
        let columns = value_columns(rel);
        let sql = if rel.indexed {
            format!(
                "CREATE TABLE {} ({}, {})",
                rel.name,
                columns,
                Self::index_clause(&rel.name, &rel.name, &rel.name)
            )
        } else {
            format!("CREATE TABLE {} ({})", rel.name, columns)
        };
        vec![sql]
    }

    fn create_link_table(&self, table: &str, rel: &Relationship) -> Vec<String> {
        let link = link_table(table, &rel.name);
        let (main_id, value_id) = (id_column(table), id_column(&rel.name));

        vec![format!(
            "CREATE TABLE {} ({}, {}, {}, CONSTRAINT {} UNIQUE INDEX ({}, {}), CONSTRAINT {} UNIQUE INDEX ({}, {}), {}, {})",
            link,
            link_columns(table, rel),
            Self::index_clause(&link, table, &main_id),
            Self::index_clause(&link, &rel.name, &value_id),
            unique_link_index_name(table, &rel.name, 1),
            main_id,
            value_id,
            unique_link_index_name(table, &rel.name, 2),
            value_id,
            main_id,
            foreign_key_clause(&link, table),
            foreign_key_clause(&link, &rel.name)
        )]
    }

    fn drop_index(&self, table: &str, name: &str) -> String {
        format!("DROP INDEX {} ON {}", index_name(table, name), table)
    }

    fn drop_column(&self, table: &str, column: &str) -> String {
        format!("ALTER TABLE {} DROP {}", table, column)
    }

    fn drop_foreign_key(&self, table: &str, foreign: &str) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {}",
            table,
            foreign_key_name(table, foreign)
        )
    }
}
