//! Moving values between stored objects and projected tables
//!
//! Shared by the migration backfills and the CRUD engine: conversion between
//! [`SqlValue`] and SQLite values, blob parsing, and the side-table and
//! link-table primitives.

use crate::error::{SqliteError, SqliteResult};
use crate::exec::{execute, query_opt, query_rows};
use dendb_core::naming::{self, BLOB_COLUMN, DATABASE_ID_FIELD};
use dendb_core::{ColumnKind, Relationship, SchemaDescriptor, SqlValue};
use rusqlite::types::Value as Sql;
use rusqlite::{params, Connection};
use serde_json::Value;
use tracing::debug;

pub(crate) fn to_sql(value: &SqlValue) -> Sql {
    match value {
        SqlValue::Null => Sql::Null,
        SqlValue::Integer(i) => Sql::Integer(*i),
        SqlValue::Float(f) => Sql::Real(*f),
        SqlValue::Bool(b) => Sql::Integer(i64::from(*b)),
        SqlValue::Text(s) => Sql::Text(s.clone()),
    }
}

/// Read a stored value back as `kind`. SQLite may hand back a different
/// storage class than the declared type, so numbers in text columns stay text.
pub(crate) fn from_sql(value: Sql, kind: ColumnKind) -> SqlValue {
    match (value, kind) {
        (Sql::Null, _) => SqlValue::Null,
        (Sql::Integer(i), ColumnKind::Bool) => SqlValue::Bool(i != 0),
        (Sql::Integer(i), ColumnKind::Text) => SqlValue::Text(i.to_string()),
        (Sql::Integer(i), ColumnKind::Float) => SqlValue::Float(i as f64),
        (Sql::Integer(i), ColumnKind::Integer) => SqlValue::Integer(i),
        (Sql::Real(f), ColumnKind::Text) => SqlValue::Text(f.to_string()),
        (Sql::Real(f), _) => SqlValue::Float(f),
        (Sql::Text(s), _) => SqlValue::Text(s),
        (Sql::Blob(b), _) => SqlValue::Text(String::from_utf8_lossy(&b).into_owned()),
    }
}

/// Parse a stored blob; `None` when it is not valid JSON
pub(crate) fn parse_blob(content: &str) -> Option<Value> {
    match serde_json::from_str(content) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "Skipping unparsable content");
            None
        }
    }
}

/// Serialize an object for the blob column
pub(crate) fn write_blob(value: &Value) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|e| SqliteError::Serialization(e.to_string()))
}

/// Inject the row id under the reserved field
pub(crate) fn attach_id(mut value: Value, id: i64) -> Value {
    if let Some(map) = value.as_object_mut() {
        map.insert(DATABASE_ID_FIELD.to_string(), Value::from(id));
    }
    value
}

/// Field `rel.name` of a stored object, converted to the relationship's kind
pub(crate) fn extract_field(object: &Value, rel: &Relationship) -> Option<SqlValue> {
    object
        .get(&rel.name)
        .and_then(|field| rel.column_kind().extract(field))
}

/// Main rows read per query while walking the table
const ROW_BATCH: i64 = 256;

/// Call `f` with the id and parsed blob of every main row, in id order.
///
/// Rows are read in batches keyed on the last id seen, so `f` may write to
/// the main table. Unparsable blobs are skipped.
pub(crate) fn for_each_stored_object<F>(conn: &Connection, schema: &SchemaDescriptor, mut f: F) -> SqliteResult<()>
where
    F: FnMut(i64, Value) -> SqliteResult<()>,
{
    let sql = format!(
        "SELECT {0}, {1} FROM {2} WHERE {0} > ?1 ORDER BY {0} LIMIT ?2",
        schema.main_id_column(),
        BLOB_COLUMN,
        schema.table()
    );

    let mut after = i64::MIN;
    loop {
        let batch: Vec<(i64, Option<String>)> =
            query_rows(conn, &sql, params![after, ROW_BATCH], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let Some(&(last, _)) = batch.last() else {
            return Ok(());
        };

        for (id, content) in batch {
            if let Some(object) = parse_blob(content.as_deref().unwrap_or_default()) {
                f(id, object)?;
            }
        }
        after = last;
    }
}

/// Id of the side-table row holding `value`
pub(crate) fn find_value_id(
    conn: &Connection,
    rel: &Relationship,
    value: &SqlValue,
) -> SqliteResult<Option<i64>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1",
        naming::id_column(&rel.name),
        rel.name,
        rel.name
    );
    query_opt(conn, &sql, [to_sql(value)], |row| row.get(0))
}

/// Id of the side-table row holding `value`, inserting it when absent
pub(crate) fn resolve_or_create(
    conn: &Connection,
    rel: &Relationship,
    value: &SqlValue,
) -> SqliteResult<i64> {
    if let Some(id) = find_value_id(conn, rel, value)? {
        return Ok(id);
    }

    let sql = format!("INSERT INTO {} ({}) VALUES (?1)", rel.name, rel.name);
    execute(conn, &sql, [to_sql(value)])?;
    Ok(conn.last_insert_rowid())
}

/// Link a main row to a value of a many-to-many relationship. Existing links are left alone.
pub(crate) fn add_link(
    conn: &Connection,
    schema: &SchemaDescriptor,
    rel: &Relationship,
    main_id: i64,
    value_id: i64,
) -> SqliteResult<bool> {
    let link = schema.link_table(&rel.name);
    let main_column = schema.main_id_column();
    let value_column = naming::id_column(&rel.name);

    let exists = format!(
        "SELECT 1 FROM {} WHERE {} = ?1 AND {} = ?2",
        link, main_column, value_column
    );
    if query_opt(conn, &exists, params![main_id, value_id], |_| Ok(()))?.is_some() {
        return Ok(false);
    }

    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES (?1, ?2)",
        link, main_column, value_column
    );
    execute(conn, &insert, params![main_id, value_id])?;
    Ok(true)
}

/// Resolve and link every item of an array-valued field.
///
/// A scalar field is linked as a one-item array. Items that do not convert
/// to the relationship's kind are skipped.
pub(crate) fn link_items(
    conn: &Connection,
    schema: &SchemaDescriptor,
    rel: &Relationship,
    main_id: i64,
    field: Option<&Value>,
) -> SqliteResult<usize> {
    let items = match field {
        Some(Value::Array(items)) => items.as_slice(),
        None | Some(Value::Null) => return Ok(0),
        Some(scalar) => {
            debug!(relationship = %rel.name, id = main_id, "Linking scalar field as a single item");
            std::slice::from_ref(scalar)
        }
    };

    let kind = rel.column_kind();
    let mut linked = 0;
    for item in items {
        let Some(value) = kind.extract(item) else {
            continue;
        };
        let value_id = resolve_or_create(conn, rel, &value)?;
        if add_link(conn, schema, rel, main_id, value_id)? {
            linked += 1;
        }
    }
    Ok(linked)
}
