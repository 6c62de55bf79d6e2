//! Query and navigation engine
//!
//! Browses objects through their relationships. Filters are AND-combined
//! predicates `relationship name -> value id`: a many-to-many predicate joins
//! its link table, a one-to-many predicate compares the main table's
//! foreign-key column.

use crate::error::{SqliteError, SqliteResult};
use crate::exec::{query_count, query_opt, query_rows};
use crate::projection::{find_value_id, from_sql};
use crate::store::objects::listing_value;
use dendb_core::naming::{self, BLOB_COLUMN};
use dendb_core::{ObjectCodec, RelationKind, Relationship, SchemaDescriptor, SqlValue};
use rusqlite::types::Value as Sql;
use rusqlite::{params_from_iter, Connection};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// AND-combined relationship filters, `name -> value id`
pub type Predicates = BTreeMap<String, i64>;

/// One distinct value of a relationship
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipValue {
    pub id: i64,
    pub value: SqlValue,
}

/// Joins and conditions selecting the main rows that match every predicate
#[derive(Debug, Default)]
struct Filter {
    joins: Vec<String>,
    conditions: Vec<String>,
    params: Vec<i64>,
}

impl Filter {
    fn build(schema: &SchemaDescriptor, predicates: &Predicates) -> Self {
        let table = schema.table();
        let main_id = schema.main_id_column();
        let mut filter = Self::default();

        for (name, value_id) in predicates {
            let placeholder = format!("?{}", filter.params.len() + 1);
            match schema.kind_of(name) {
                Some(RelationKind::ManyToMany) => {
                    let alias = format!("l{}", filter.joins.len());
                    filter.joins.push(format!(
                        "JOIN {link} AS {a} ON {a}.{m} = {t}.{m}",
                        link = schema.link_table(name),
                        a = alias,
                        m = main_id,
                        t = table
                    ));
                    filter.conditions.push(format!(
                        "{}.{} = {}",
                        alias,
                        naming::id_column(name),
                        placeholder
                    ));
                }
                Some(RelationKind::OneToMany) => {
                    filter.conditions.push(format!(
                        "{}.{} = {}",
                        table,
                        naming::id_column(name),
                        placeholder
                    ));
                }
                _ => {
                    warn!(relationship = %name, "Ignoring predicate on unknown or index column");
                    continue;
                }
            }
            filter.params.push(*value_id);
        }

        filter
    }

    fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `FROM <table> <joins> [WHERE ...]`
    fn from_clause(&self, table: &str) -> String {
        let mut sql = format!("FROM {}", table);
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }
        sql
    }
}

/// Side-table relationship named `column`; index columns and unknown names fail
fn side_relationship<'s>(schema: &'s SchemaDescriptor, column: &str) -> SqliteResult<&'s Relationship> {
    schema
        .relationship(column)
        .filter(|rel| rel.kind != RelationKind::Index)
        .ok_or_else(|| SqliteError::unknown_relationship(column))
}

/// Navigation queries over one connection
pub struct Navigator<'a> {
    conn: &'a Connection,
}

impl<'a> Navigator<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Objects matching every predicate, ordered by id
    pub fn list_objects<C: ObjectCodec>(
        &self,
        schema: &SchemaDescriptor,
        codec: &C,
        predicates: &Predicates,
    ) -> SqliteResult<Vec<C::Entry>> {
        let table = schema.table();
        let main_id = schema.main_id_column();
        let filter = Filter::build(schema, predicates);

        let sql = format!(
            "SELECT DISTINCT {t}.{m}, {t}.{c} {from} ORDER BY {t}.{m}",
            t = table,
            m = main_id,
            c = BLOB_COLUMN,
            from = filter.from_clause(table)
        );
        let rows = query_rows(self.conn, &sql, params_from_iter(&filter.params), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?))
        })?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, content) in rows {
            let Some(value) = listing_value(id, content.as_deref().unwrap_or_default()) else {
                continue;
            };
            entries.push(codec.list_entry(value, id)?);
        }
        Ok(entries)
    }

    /// Distinct values of `column`, narrowed to those used by objects
    /// matching every predicate. Ordered by value id.
    pub fn list_relationship_values(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        predicates: &Predicates,
    ) -> SqliteResult<Vec<RelationshipValue>> {
        let rel = side_relationship(schema, column)?;
        let kind = rel.column_kind();
        let value_id = naming::id_column(&rel.name);
        let filter = Filter::build(schema, predicates);

        let sql = if filter.is_empty() {
            format!(
                "SELECT v.{id}, v.{name} FROM {name} AS v ORDER BY v.{id}",
                id = value_id,
                name = rel.name
            )
        } else {
            let matching = format!(
                "SELECT {t}.{m} {from}",
                t = schema.table(),
                m = schema.main_id_column(),
                from = filter.from_clause(schema.table())
            );
            match rel.kind {
                RelationKind::ManyToMany => format!(
                    "SELECT DISTINCT v.{id}, v.{name} FROM {name} AS v \
                     JOIN {link} AS lv ON lv.{id} = v.{id} \
                     WHERE lv.{m} IN ({matching}) ORDER BY v.{id}",
                    id = value_id,
                    name = rel.name,
                    link = schema.link_table(&rel.name),
                    m = schema.main_id_column(),
                    matching = matching
                ),
                _ => format!(
                    "SELECT v.{id}, v.{name} FROM {name} AS v \
                     WHERE v.{id} IN (SELECT {t}.{id} {from}) ORDER BY v.{id}",
                    id = value_id,
                    name = rel.name,
                    t = schema.table(),
                    from = filter.from_clause(schema.table())
                ),
            }
        };

        query_rows(self.conn, &sql, params_from_iter(&filter.params), |row| {
            Ok(RelationshipValue {
                id: row.get(0)?,
                value: from_sql(row.get::<_, Sql>(1)?, kind),
            })
        })
    }

    /// Id of `value` in the side table of `column`
    pub fn resolve_value_id(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        value: &Value,
    ) -> SqliteResult<Option<i64>> {
        let rel = side_relationship(schema, column)?;
        match rel.column_kind().extract(value) {
            Some(key) => find_value_id(self.conn, rel, &key),
            None => Ok(None),
        }
    }

    /// Value stored under `id` in the side table of `column`
    pub fn resolve_value(
        &self,
        schema: &SchemaDescriptor,
        column: &str,
        id: i64,
    ) -> SqliteResult<Option<SqlValue>> {
        let rel = side_relationship(schema, column)?;
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1",
            rel.name,
            rel.name,
            naming::id_column(&rel.name)
        );
        let kind = rel.column_kind();
        query_opt(self.conn, &sql, [id], |row| row.get::<_, Sql>(0))
            .map(|found| found.map(|value| from_sql(value, kind)))
    }

    /// Rows of the main table (`None` or an index column) or of a
    /// relationship's side table. Unknown names count 0.
    pub fn count(&self, schema: &SchemaDescriptor, column: Option<&str>) -> SqliteResult<i64> {
        let table = match column {
            None => schema.table(),
            Some(name) => match schema.kind_of(name) {
                Some(RelationKind::Index) => schema.table(),
                Some(_) => name,
                None => return Ok(0),
            },
        };
        query_count(self.conn, &format!("SELECT COUNT(*) FROM {}", table), [])
    }
}
