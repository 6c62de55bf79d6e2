//! The connection a store runs on
//!
//! One `rusqlite::Connection` behind a mutex. Engines borrow it for the
//! length of one operation, so operations from different threads never
//! interleave their statements.

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::exec::execute_ddl;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::sync::Arc;
use tracing::info;

/// Shared handle on a store's database
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    config: SqliteConfig,
}

impl SqlitePool {
    /// Open the database `config` points at and apply its pragmas
    pub fn new(config: SqliteConfig) -> SqliteResult<Self> {
        let conn = open(&config)?;
        for (pragma, value) in config.pragmas() {
            execute_ddl(&conn, &format!("PRAGMA {} = {}", pragma, value))?;
        }
        info!(path = ?config.path, native_drop_column = config.native_drop_column, "Opened database");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    pub fn memory() -> SqliteResult<Self> {
        Self::new(SqliteConfig::memory())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` while holding the connection
    pub fn with_connection<F, T>(&self, f: F) -> SqliteResult<T>
    where
        F: FnOnce(&Connection) -> SqliteResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }
}

fn open(config: &SqliteConfig) -> SqliteResult<Connection> {
    if config.is_memory() {
        return Ok(Connection::open_in_memory()?);
    }

    if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            SqliteError::Connection(format!("Failed to create {}: {}", parent.display(), e))
        })?;
    }
    Ok(Connection::open(&config.path)?)
}
