//! CRUD engine: one object, its main row and every projected row

use crate::error::{SqliteError, SqliteResult};
use crate::exec::{execute, query_count, query_opt, query_rows};
use crate::projection::{
    attach_id, extract_field, link_items, parse_blob, resolve_or_create, to_sql, write_blob,
};
use dendb_core::naming::{self, BLOB_COLUMN, DATABASE_ID_FIELD};
use dendb_core::{ObjectCodec, ObjectLookup, RelationKind, SchemaDescriptor};
use rusqlite::types::Value as Sql;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tracing::{debug, warn};

/// Object operations over one connection
pub struct Objects<'a, C> {
    conn: &'a Connection,
    codec: &'a C,
}

impl<'a, C: ObjectCodec> Objects<'a, C> {
    pub fn new(conn: &'a Connection, codec: &'a C) -> Self {
        Self { conn, codec }
    }

    /// Store `object` and return its id.
    ///
    /// The id comes from the object's `databaseid` field when it holds a
    /// non-negative integer, otherwise from the codec's natural-key lookup. An existing object is
    /// deleted and reinserted under the same id when `update` is set, and
    /// left as is otherwise.
    pub fn add(&self, schema: &SchemaDescriptor, object: &C::Object, update: bool) -> SqliteResult<i64> {
        let mut value = self.codec.encode(object)?;
        if !self.codec.is_valid(&value) {
            return Err(SqliteError::InvalidObject(format!(
                "rejected by codec for table '{}'",
                schema.table()
            )));
        }

        // Negative ids, -1 in particular, mean "not stored yet"
        let embedded = value
            .as_object_mut()
            .and_then(|map| map.remove(DATABASE_ID_FIELD))
            .and_then(|id| id.as_i64())
            .filter(|id| *id >= 0);

        let existing = match embedded {
            Some(id) if self.exists(schema, id)? => Some(id),
            Some(_) => None,
            None => self.codec.exists(&value, &IndexLookup::new(self.conn, schema)),
        };

        match existing {
            Some(id) if !update => {
                debug!(table = %schema.table(), id, "Object exists, not updating");
                Ok(id)
            }
            Some(id) => {
                self.delete(schema, id, false)?;
                self.insert(schema, Some(id), &value)
            }
            None => self.insert(schema, embedded, &value),
        }
    }

    /// Insert the main row and its projections. `value` must not carry `databaseid`.
    fn insert(&self, schema: &SchemaDescriptor, id: Option<i64>, value: &Value) -> SqliteResult<i64> {
        let mut columns = vec![schema.main_id_column(), BLOB_COLUMN.to_string()];
        let mut values = vec![id.map_or(Sql::Null, Sql::Integer), Sql::Text(write_blob(value)?)];

        for rel in schema.indices() {
            if let Some(field) = extract_field(value, rel) {
                columns.push(rel.name.clone());
                values.push(to_sql(&field));
            }
        }

        for rel in schema.one_to_many() {
            if let Some(field) = extract_field(value, rel) {
                let value_id = resolve_or_create(self.conn, rel, &field)?;
                columns.push(naming::id_column(&rel.name));
                values.push(Sql::Integer(value_id));
            }
        }

        let placeholders = (1..=values.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            schema.table(),
            columns.join(", "),
            placeholders
        );
        execute(self.conn, &sql, params_from_iter(values))?;
        let id = self.conn.last_insert_rowid();

        for rel in schema.many_to_many() {
            link_items(self.conn, schema, rel, id, value.get(&rel.name))?;
        }

        debug!(table = %schema.table(), id, "Object stored");
        Ok(id)
    }

    /// Whether a main row with this id exists
    pub fn exists(&self, schema: &SchemaDescriptor, id: i64) -> SqliteResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            schema.table(),
            schema.main_id_column()
        );
        Ok(query_opt(self.conn, &sql, [id], |_| Ok(()))?.is_some())
    }

    pub fn get_by_id(&self, schema: &SchemaDescriptor, id: i64) -> SqliteResult<Option<C::Object>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            BLOB_COLUMN,
            schema.table(),
            schema.main_id_column()
        );
        match query_opt(self.conn, &sql, [id], |row| row.get::<_, Option<String>>(0))? {
            Some(content) => self.decode(id, content.as_deref().unwrap_or_default()).map(Some),
            None => Ok(None),
        }
    }

    /// Load the first object whose index column `column` equals `value`
    pub fn get_by_index(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
    ) -> SqliteResult<Option<C::Object>> {
        match find_by_index(self.conn, schema, column, value)? {
            Some(id) => self.get_by_id(schema, id),
            None => Ok(None),
        }
    }

    fn decode(&self, id: i64, content: &str) -> SqliteResult<C::Object> {
        let value: Value =
            serde_json::from_str(content).map_err(|e| SqliteError::Serialization(e.to_string()))?;
        Ok(self.codec.decode(attach_id(value, id), id)?)
    }

    /// Delete an object. Returns `false` when no such row exists.
    ///
    /// With `kill_orphans`, side-table values referenced by no other object
    /// are deleted as well.
    ///
    /// Without it, side-table values are always kept, but the object's own
    /// many-to-many link rows are still removed together with the main row.
    /// A link row keyed by a deleted main id could never be reached again,
    /// and the update path reinserts them under the same id.
    pub fn delete(&self, schema: &SchemaDescriptor, id: i64, kill_orphans: bool) -> SqliteResult<bool> {
        let main_id = schema.main_id_column();

        for rel in schema.many_to_many() {
            let link = schema.link_table(&rel.name);
            let value_id = naming::id_column(&rel.name);

            let orphans = if kill_orphans {
                let sql = format!(
                    "SELECT DISTINCT {v} FROM {link} WHERE {m} = ?1 AND {v} IS NOT NULL AND {v} NOT IN \
                     (SELECT {v} FROM {link} WHERE {m} <> ?1 AND {v} IS NOT NULL)",
                    v = value_id,
                    link = link,
                    m = main_id
                );
                query_rows(self.conn, &sql, [id], |row| row.get::<_, i64>(0))?
            } else {
                Vec::new()
            };

            let unlink = format!("DELETE FROM {} WHERE {} = ?1", link, main_id);
            execute(self.conn, &unlink, [id])?;

            let remove = format!("DELETE FROM {} WHERE {} = ?1", rel.name, value_id);
            for orphan in orphans {
                execute(self.conn, &remove, [orphan])?;
            }
        }

        // Values referenced by this row alone
        let mut single = Vec::new();
        if kill_orphans {
            for rel in schema.one_to_many() {
                let column = naming::id_column(&rel.name);
                let sql = format!(
                    "SELECT {} FROM {} WHERE {} = ?1",
                    column,
                    schema.table(),
                    main_id
                );
                let target = query_opt(self.conn, &sql, [id], |row| row.get::<_, Option<i64>>(0))?
                    .flatten();
                let Some(target) = target else {
                    continue;
                };

                let sql = format!("SELECT COUNT(*) FROM {} WHERE {} = ?1", schema.table(), column);
                if query_count(self.conn, &sql, [target])? == 1 {
                    single.push((rel, target));
                }
            }
        }

        let sql = format!("DELETE FROM {} WHERE {} = ?1", schema.table(), main_id);
        let deleted = execute(self.conn, &sql, [id])? > 0;

        for (rel, target) in single {
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?1",
                rel.name,
                naming::id_column(&rel.name)
            );
            execute(self.conn, &sql, [target])?;
        }

        debug!(table = %schema.table(), id, kill_orphans, deleted, "Object deleted");
        Ok(deleted)
    }

    /// Delete the first object whose index column `column` equals `value`
    pub fn delete_by_index(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
        kill_orphans: bool,
    ) -> SqliteResult<bool> {
        match find_by_index(self.conn, schema, column, value)? {
            Some(id) => self.delete(schema, id, kill_orphans),
            None => Ok(false),
        }
    }

    /// Remove dangling link rows and side-table values nothing references.
    /// Returns the number of rows removed.
    pub fn prune_orphans(&self, schema: &SchemaDescriptor) -> SqliteResult<usize> {
        let table = schema.table();
        let main_id = schema.main_id_column();
        let mut removed = 0;

        for rel in schema.one_to_many() {
            let column = naming::id_column(&rel.name);
            let sql = format!(
                "DELETE FROM {name} WHERE {c} NOT IN (SELECT {c} FROM {t} WHERE {c} IS NOT NULL)",
                name = rel.name,
                c = column,
                t = table
            );
            removed += execute(self.conn, &sql, [])?;
        }

        for rel in schema.many_to_many() {
            let link = schema.link_table(&rel.name);
            let value_id = naming::id_column(&rel.name);

            let sql = format!(
                "DELETE FROM {link} WHERE {m} IS NULL OR {m} NOT IN (SELECT {m} FROM {t})",
                link = link,
                m = main_id,
                t = table
            );
            removed += execute(self.conn, &sql, [])?;

            let sql = format!(
                "DELETE FROM {name} WHERE {v} NOT IN (SELECT {v} FROM {link} WHERE {v} IS NOT NULL)",
                name = rel.name,
                v = value_id,
                link = link
            );
            removed += execute(self.conn, &sql, [])?;
        }

        debug!(table = %table, rows = removed, "Pruned orphans");
        Ok(removed)
    }
}

/// Id of the first main row whose index column `column` equals `value`
pub(crate) fn find_by_index(
    conn: &Connection,
    schema: &SchemaDescriptor,
    column: &str,
    value: &Value,
) -> SqliteResult<Option<i64>> {
    let rel = schema
        .relationship(column)
        .filter(|rel| rel.kind == RelationKind::Index)
        .ok_or_else(|| SqliteError::unknown_relationship(column))?;

    let Some(key) = rel.column_kind().extract(value) else {
        return Ok(None);
    };

    let sql = format!(
        "SELECT {id} FROM {t} WHERE {c} = ?1 ORDER BY {id} LIMIT 1",
        id = schema.main_id_column(),
        t = schema.table(),
        c = rel.name
    );
    query_opt(conn, &sql, [to_sql(&key)], |row| row.get(0))
}

/// [`ObjectLookup`] over the index columns of a live schema
pub struct IndexLookup<'a> {
    conn: &'a Connection,
    schema: &'a SchemaDescriptor,
}

impl<'a> IndexLookup<'a> {
    pub fn new(conn: &'a Connection, schema: &'a SchemaDescriptor) -> Self {
        Self { conn, schema }
    }
}

impl ObjectLookup for IndexLookup<'_> {
    fn find_by_index(&self, column: &str, value: &Value) -> Option<i64> {
        match find_by_index(self.conn, self.schema, column, value) {
            Ok(id) => id,
            Err(e) => {
                warn!(column = %column, error = %e, "Natural-key lookup failed");
                None
            }
        }
    }
}

/// Parse a stored blob for listing, skipping rows that do not parse
pub(crate) fn listing_value(id: i64, content: &str) -> Option<Value> {
    parse_blob(content).map(|value| attach_id(value, id))
}
