//! Connection and backend configuration

use crate::error::{SqliteError, SqliteResult};
use dendb_core::SqliteBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MEMORY_PATH: &str = ":memory:";

/// Settings applied when a connection is opened
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// path = "./pets.db"
/// wal_mode = true
/// native_drop_column = false
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,

    /// Write-ahead logging (ignored for in-memory databases)
    pub wal_mode: bool,

    /// `PRAGMA foreign_keys`
    pub foreign_keys: bool,

    /// `PRAGMA busy_timeout`, in milliseconds
    pub busy_timeout_ms: u32,

    /// `PRAGMA cache_size`; negative values are KiB, positive values pages
    pub cache_size: i64,

    /// `PRAGMA mmap_size` in bytes; 0 leaves it off
    pub mmap_size: u64,

    /// Drop columns with `ALTER TABLE ... DROP COLUMN` instead of rebuilding
    /// the main table
    pub native_drop_column: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5000,
            cache_size: -2000,
            mmap_size: 0,
            native_drop_column: false,
        }
    }
}

impl SqliteConfig {
    /// Configuration for a database file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// In-memory database, mostly for tests
    pub fn memory() -> Self {
        Self {
            wal_mode: false,
            ..Self::default()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(MEMORY_PATH)
    }

    pub fn from_toml_str(content: &str) -> SqliteResult<Self> {
        toml::from_str(content).map_err(|e| SqliteError::Config(e.to_string()))
    }

    /// Read a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SqliteError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Backend profile matching this configuration
    pub fn backend(&self) -> SqliteBackend {
        SqliteBackend::with_native_drop_column(self.native_drop_column)
    }

    /// `(pragma, value)` pairs to apply on a fresh connection, in order
    pub fn pragmas(&self) -> Vec<(&'static str, String)> {
        let mut pragmas = Vec::new();
        if self.wal_mode && !self.is_memory() {
            pragmas.push(("journal_mode", "WAL".to_string()));
            pragmas.push(("synchronous", "NORMAL".to_string()));
        }
        let foreign_keys = if self.foreign_keys { "ON" } else { "OFF" };
        pragmas.push(("foreign_keys", foreign_keys.to_string()));
        pragmas.push(("busy_timeout", self.busy_timeout_ms.to_string()));
        pragmas.push(("cache_size", self.cache_size.to_string()));
        if self.mmap_size > 0 {
            pragmas.push(("mmap_size", self.mmap_size.to_string()));
        }
        pragmas
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dendb_core::Backend;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SqliteConfig::default();
        assert!(config.is_memory());
        assert!(config.foreign_keys);
        assert!(!config.native_drop_column);
        assert!(!config.backend().supports_drop_column());

        assert!(!SqliteConfig::memory().wal_mode);
        assert!(!SqliteConfig::new("/tmp/pets.db").is_memory());
    }

    #[test]
    fn test_partial_toml() {
        let config = SqliteConfig::from_toml_str(
            r#"
            path = "pets.db"
            native_drop_column = true
            busy_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.path, PathBuf::from("pets.db"));
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(config.wal_mode);
        assert!(config.backend().supports_drop_column());
    }

    #[test]
    fn test_pragmas_follow_settings() {
        let memory = SqliteConfig::memory().pragmas();
        assert!(memory.iter().all(|(name, _)| *name != "journal_mode"));
        assert!(memory.contains(&("foreign_keys", "ON".to_string())));

        let file = SqliteConfig {
            foreign_keys: false,
            mmap_size: 4096,
            ..SqliteConfig::new("pets.db")
        }
        .pragmas();
        assert_eq!(file[0], ("journal_mode", "WAL".to_string()));
        assert!(file.contains(&("foreign_keys", "OFF".to_string())));
        assert!(file.contains(&("mmap_size", "4096".to_string())));
    }

    #[test]
    fn test_invalid_toml() {
        let err = SqliteConfig::from_toml_str("wal_mode = \"sometimes\"").unwrap_err();
        assert!(matches!(err, SqliteError::Config(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("dendb.toml");
        std::fs::write(&file, "foreign_keys = false\n").unwrap();

        let config = SqliteConfig::load(&file).unwrap();
        assert!(!config.foreign_keys);

        assert!(SqliteConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
