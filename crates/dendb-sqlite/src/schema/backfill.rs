//! Populating projected columns and tables from the stored blobs
//!
//! Each backfill first clears what it is about to write, so running one
//! again after an interruption converges on the same result. Rows whose blob
//! lacks the field, or holds a value that does not convert, are skipped.

use crate::error::SqliteResult;
use crate::exec::execute;
use crate::projection::{extract_field, for_each_stored_object, link_items, resolve_or_create, to_sql};
use dendb_core::naming;
use dendb_core::{Relationship, SchemaDescriptor};
use rusqlite::{params, Connection};
use tracing::debug;

/// Fill the index column `rel.name` of every main row
pub fn backfill_index(
    conn: &Connection,
    schema: &SchemaDescriptor,
    rel: &Relationship,
) -> SqliteResult<usize> {
    let reset = format!("UPDATE {} SET {} = NULL", schema.table(), rel.name);
    execute(conn, &reset, [])?;

    let update = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        schema.table(),
        rel.name,
        schema.main_id_column()
    );

    let mut filled = 0;
    for_each_stored_object(conn, schema, |id, object| {
        if let Some(value) = extract_field(&object, rel) {
            execute(conn, &update, params![to_sql(&value), id])?;
            filled += 1;
        }
        Ok(())
    })?;

    debug!(table = %schema.table(), column = %rel.name, rows = filled, "Backfilled index");
    Ok(filled)
}

/// Point the `id<name>` column of every main row at its side-table value
pub fn backfill_one_to_many(
    conn: &Connection,
    schema: &SchemaDescriptor,
    rel: &Relationship,
) -> SqliteResult<usize> {
    let column = naming::id_column(&rel.name);
    let reset = format!("UPDATE {} SET {} = NULL", schema.table(), column);
    execute(conn, &reset, [])?;

    let update = format!(
        "UPDATE {} SET {} = ?1 WHERE {} = ?2",
        schema.table(),
        column,
        schema.main_id_column()
    );

    let mut filled = 0;
    for_each_stored_object(conn, schema, |id, object| {
        if let Some(value) = extract_field(&object, rel) {
            let value_id = resolve_or_create(conn, rel, &value)?;
            execute(conn, &update, params![value_id, id])?;
            filled += 1;
        }
        Ok(())
    })?;

    debug!(table = %schema.table(), column = %rel.name, rows = filled, "Backfilled one-to-many");
    Ok(filled)
}

/// Link every main row to the values of its field `rel.name`
pub fn backfill_many_to_many(
    conn: &Connection,
    schema: &SchemaDescriptor,
    rel: &Relationship,
) -> SqliteResult<usize> {
    let mut linked = 0;
    for_each_stored_object(conn, schema, |id, object| {
        linked += link_items(conn, schema, rel, id, object.get(&rel.name))?;
        Ok(())
    })?;

    debug!(table = %schema.table(), column = %rel.name, rows = linked, "Backfilled many-to-many");
    Ok(linked)
}
