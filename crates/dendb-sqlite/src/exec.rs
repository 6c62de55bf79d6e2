//! Statement helpers
//!
//! Every statement the engines run goes through here, so a failure is
//! logged once with the statement text and surfaces as
//! [`SqliteError::Statement`].

use crate::error::{SqliteError, SqliteResult};
use rusqlite::{Connection, OptionalExtension, Params, Row};
use tracing::{debug, error};

pub(crate) fn failed(sql: &str, source: rusqlite::Error) -> SqliteError {
    error!(sql = %sql, error = %source, "Statement failed");
    SqliteError::statement(sql, source)
}

/// Run a data statement, returning the number of changed rows
pub(crate) fn execute<P: Params>(conn: &Connection, sql: &str, params: P) -> SqliteResult<usize> {
    conn.execute(sql, params).map_err(|e| failed(sql, e))
}

/// Run a schema statement
pub(crate) fn execute_ddl(conn: &Connection, sql: &str) -> SqliteResult<()> {
    debug!(sql = %sql, "Executing DDL");
    conn.execute_batch(sql).map_err(|e| failed(sql, e))
}

pub(crate) fn execute_all(conn: &Connection, statements: &[String]) -> SqliteResult<()> {
    statements.iter().try_for_each(|sql| execute_ddl(conn, sql))
}

pub(crate) fn query_rows<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    f: F,
) -> SqliteResult<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    collect_rows(conn, sql, params, f).map_err(|e| failed(sql, e))
}

fn collect_rows<T, P, F>(conn: &Connection, sql: &str, params: P, f: F) -> rusqlite::Result<Vec<T>>
where
    P: Params,
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, f)?;
    let collected = rows.collect::<rusqlite::Result<Vec<T>>>();
    collected
}

/// First row of a query, if any
pub(crate) fn query_opt<T, P, F>(
    conn: &Connection,
    sql: &str,
    params: P,
    f: F,
) -> SqliteResult<Option<T>>
where
    P: Params,
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(sql, params, f)
        .optional()
        .map_err(|e| failed(sql, e))
}

pub(crate) fn query_count<P: Params>(conn: &Connection, sql: &str, params: P) -> SqliteResult<i64> {
    conn.query_row(sql, params, |row| row.get(0))
        .map_err(|e| failed(sql, e))
}

/// Run `f` inside a savepoint, rolling back everything it did on error
pub(crate) fn within_savepoint<T, F>(conn: &Connection, name: &str, f: F) -> SqliteResult<T>
where
    F: FnOnce() -> SqliteResult<T>,
{
    execute_ddl(conn, &format!("SAVEPOINT {}", name))?;
    match f() {
        Ok(value) => {
            execute_ddl(conn, &format!("RELEASE {}", name))?;
            Ok(value)
        }
        Err(e) => {
            debug!(savepoint = %name, error = %e, "Rolling back");
            execute_ddl(conn, &format!("ROLLBACK TO {0}; RELEASE {0}", name))?;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)")
            .unwrap();
        conn
    }

    #[test]
    fn test_query_helpers() {
        let conn = conn();
        execute(&conn, "INSERT INTO t (v) VALUES (?1)", params!["a"]).unwrap();
        execute(&conn, "INSERT INTO t (v) VALUES (?1)", params!["b"]).unwrap();

        let values = query_rows(&conn, "SELECT v FROM t ORDER BY id", [], |row| {
            row.get::<_, String>(0)
        })
        .unwrap();
        assert_eq!(values, vec!["a", "b"]);

        let missing: Option<String> =
            query_opt(&conn, "SELECT v FROM t WHERE id = ?1", [9], |row| row.get(0)).unwrap();
        assert!(missing.is_none());

        assert_eq!(query_count(&conn, "SELECT COUNT(*) FROM t", []).unwrap(), 2);
    }

    #[test]
    fn test_failure_carries_statement() {
        let conn = conn();
        let err = execute(&conn, "INSERT INTO nope (v) VALUES (1)", []).unwrap_err();
        match err {
            SqliteError::Statement { sql, .. } => assert_eq!(sql, "INSERT INTO nope (v) VALUES (1)"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_savepoint_rolls_back() {
        let conn = conn();

        let result: SqliteResult<()> = within_savepoint(&conn, "sp_test", || {
            execute_ddl(&conn, "CREATE TABLE scratch (x INTEGER)")?;
            execute(&conn, "INSERT INTO t (v) VALUES ('gone')", [])?;
            Err(SqliteError::Schema("boom".into()))
        });
        assert!(result.is_err());

        assert_eq!(query_count(&conn, "SELECT COUNT(*) FROM t", []).unwrap(), 0);
        let scratch = query_count(
            &conn,
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
            [],
        )
        .unwrap();
        assert_eq!(scratch, 0);

        within_savepoint(&conn, "sp_test", || {
            execute(&conn, "INSERT INTO t (v) VALUES ('kept')", []).map(|_| ())
        })
        .unwrap();
        assert_eq!(query_count(&conn, "SELECT COUNT(*) FROM t", []).unwrap(), 1);
    }
}
