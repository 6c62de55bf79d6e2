//! Reading the physical schema back

use crate::error::{SqliteError, SqliteResult};
use crate::exec::{query_opt, query_rows};
use dendb_core::naming::{self, BLOB_COLUMN};
use dendb_core::{RelationKind, SchemaDescriptor};
use rusqlite::Connection;

/// A column as reported by `pragma_table_info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
}

pub fn table_exists(conn: &Connection, table: &str) -> SqliteResult<bool> {
    master_entry_exists(conn, "table", table)
}

pub fn index_exists(conn: &Connection, index: &str) -> SqliteResult<bool> {
    master_entry_exists(conn, "index", index)
}

fn master_entry_exists(conn: &Connection, kind: &str, name: &str) -> SqliteResult<bool> {
    let found = query_opt(
        conn,
        "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
        [kind, name],
        |_| Ok(()),
    )?;
    Ok(found.is_some())
}

/// Columns of `table` in declaration order; empty if the table does not exist
pub fn columns(conn: &Connection, table: &str) -> SqliteResult<Vec<ColumnInfo>> {
    query_rows(
        conn,
        "SELECT name, type FROM pragma_table_info(?1) ORDER BY cid",
        [table],
        |row| {
            Ok(ColumnInfo {
                name: row.get(0)?,
                sql_type: row.get(1)?,
            })
        },
    )
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> SqliteResult<bool> {
    Ok(columns(conn, table)?.iter().any(|c| c.name == column))
}

/// Names of all tables, sorted
pub fn tables(conn: &Connection) -> SqliteResult<Vec<String>> {
    query_rows(
        conn,
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        [],
        |row| row.get(0),
    )
}

/// Names of all explicitly created indices, sorted
pub fn indices(conn: &Connection) -> SqliteResult<Vec<String>> {
    query_rows(
        conn,
        "SELECT name FROM sqlite_master WHERE type = 'index' AND sql IS NOT NULL ORDER BY name",
        [],
        |row| row.get(0),
    )
}

/// Declared type of the value column of side table `name`
fn value_type(conn: &Connection, name: &str) -> SqliteResult<Option<String>> {
    Ok(columns(conn, name)?
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.sql_type))
}

/// Rebuild a descriptor for `table` from what is on disk.
///
/// Main-table columns named `id<x>` with a side table `x` are one-to-many
/// relationships; other extra columns are indices. Tables named
/// `<table>link<x>` with a side table `x` are many-to-many relationships.
/// A side table is indexed when `idx_<x>_<x>` exists.
pub fn introspect(conn: &Connection, table: &str) -> SqliteResult<SchemaDescriptor> {
    let mut schema = SchemaDescriptor::new(table)?;
    if !table_exists(conn, table)? {
        return Err(SqliteError::Schema(format!("Table '{}' does not exist", table)));
    }

    let main_id = naming::id_column(table);
    for column in columns(conn, table)? {
        if column.name == main_id || column.name == BLOB_COLUMN {
            continue;
        }

        let side = column
            .name
            .strip_prefix("id")
            .filter(|name| !name.is_empty());
        let one_to_many = match side {
            Some(name) => value_type(conn, name)?.map(|t| (name.to_string(), t)),
            None => None,
        };

        match one_to_many {
            Some((name, sql_type)) => {
                let indexed = index_exists(conn, &naming::index_name(&name, &name))?;
                schema.register(RelationKind::OneToMany, &name, &sql_type, indexed)?;
            }
            None => {
                schema.register(RelationKind::Index, &column.name, &column.sql_type, true)?;
            }
        }
    }

    let prefix = naming::link_table(table, "");
    for name in tables(conn)? {
        let Some(side) = name.strip_prefix(&prefix).filter(|s| !s.is_empty()) else {
            continue;
        };
        if let Some(sql_type) = value_type(conn, side)? {
            let indexed = index_exists(conn, &naming::index_name(side, side))?;
            schema.register(RelationKind::ManyToMany, side, &sql_type, indexed)?;
        }
    }

    Ok(schema)
}
