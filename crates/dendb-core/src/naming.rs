//! Naming conventions for physical tables, columns, indices and constraints
//!
//! Every name here is part of the on-disk format: databases written by one
//! version must be readable by the next, so none of these may change.

use once_cell::sync::Lazy;
use regex::Regex;

/// Column holding the serialized object on the main table
pub const BLOB_COLUMN: &str = "content";

/// Field injected into a decoded object with its row id; never stored in the blob
pub const DATABASE_ID_FIELD: &str = "databaseid";

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

/// Prefix SQLite keeps for its own tables
const ENGINE_PREFIX: &str = "sqlite_";

/// Whether `name` can be interpolated into SQL as a bare identifier and is
/// free for use as a table name
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
        && !name
            .get(..ENGINE_PREFIX.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(ENGINE_PREFIX))
}

/// Primary key of `table`, also the foreign-key column that references it: `id<table>`
pub fn id_column(table: &str) -> String {
    format!("id{}", table)
}

/// `<primary>link<secondary>`
pub fn link_table(primary: &str, secondary: &str) -> String {
    format!("{}link{}", primary, secondary)
}

/// `FK_<foreign>_<primary>`
pub fn foreign_key_name(primary: &str, foreign: &str) -> String {
    format!("FK_{}_{}", foreign, primary)
}

/// Table constraint on `primary` whose `id<foreign>` column references `foreign`
pub fn foreign_key_clause(primary: &str, foreign: &str) -> String {
    format!(
        "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE SET NULL",
        foreign_key_name(primary, foreign),
        id_column(foreign),
        foreign,
        id_column(foreign)
    )
}

/// `idx_<table>_<column>`
pub fn index_name(table: &str, column: &str) -> String {
    format!("idx_{}_{}", table, column)
}

/// `idx_<primary>link<secondary>_link<ord>`; `ord` 1 covers (primary, secondary), 2 the reverse
pub fn unique_link_index_name(primary: &str, secondary: &str, ord: u8) -> String {
    format!("idx_{}_link{}", link_table(primary, secondary), ord)
}

/// Scratch table used while rebuilding the main table
pub fn temp_table(table: &str) -> String {
    format!("{}_temp", table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_bit_exact() {
        assert_eq!(id_column("garden"), "idgarden");
        assert_eq!(link_table("pet", "places"), "petlinkplaces");
        assert_eq!(foreign_key_name("pet", "garden"), "FK_garden_pet");
        assert_eq!(index_name("pet", "name"), "idx_pet_name");
        assert_eq!(unique_link_index_name("pet", "places", 1), "idx_petlinkplaces_link1");
        assert_eq!(unique_link_index_name("pet", "places", 2), "idx_petlinkplaces_link2");
        assert_eq!(temp_table("pet"), "pet_temp");
    }

    #[test]
    fn test_foreign_key_clause() {
        assert_eq!(
            foreign_key_clause("pet", "garden"),
            "CONSTRAINT FK_garden_pet FOREIGN KEY (idgarden) REFERENCES garden (idgarden) ON DELETE SET NULL"
        );
    }

    #[test]
    fn test_identifier_validation() {
        assert!(is_valid_identifier("garden"));
        assert!(is_valid_identifier("_private2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2fast"));
        assert!(!is_valid_identifier("name; DROP TABLE pet"));
        assert!(!is_valid_identifier("my-table"));
        assert!(!is_valid_identifier("sqlite_sequence"));
        assert!(is_valid_identifier("sqlitecache"));
    }
}
