//! Schema declaration registry
//!
//! A [`SchemaDescriptor`] names the main table and lists every relationship
//! projected out of the stored objects. It is an explicit value handed to
//! each engine call rather than state hidden inside a store, so the engines
//! always act on exactly the schema the caller describes.

use crate::error::DeclarationError;
use crate::kind::ColumnKind;
use crate::naming;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Text types with no declared length. Engines refuse to index them.
const UNBOUNDED_TEXT: &[&str] = &["TEXT", "TINYTEXT", "MEDIUMTEXT", "LONGTEXT"];

/// Shape of a declared relationship
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Scalar column on the main table
    Index,
    /// Side table of distinct values referenced by a foreign-key column on the main table
    OneToMany,
    /// Side table of distinct values plus a link table of (main id, value id) pairs
    ManyToMany,
}

/// One declared relationship
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub sql_type: String,
    pub indexed: bool,
    pub kind: RelationKind,
}

impl Relationship {
    pub fn column_kind(&self) -> ColumnKind {
        ColumnKind::from_sql_type(&self.sql_type)
    }
}

/// Whether `sql_type` is a text type with no length bound
pub fn is_unbounded_text(sql_type: &str) -> bool {
    let upper = sql_type.trim().to_ascii_uppercase();
    let base = upper
        .split(|c: char| c == '(' || c.is_whitespace())
        .next()
        .unwrap_or_default();
    UNBOUNDED_TEXT.contains(&base)
}

/// The main table and its declared relationships, each list in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    table: String,
    indices: Vec<Relationship>,
    one_to_many: Vec<Relationship>,
    many_to_many: Vec<Relationship>,
    #[serde(skip)]
    declaring: bool,
}

impl SchemaDescriptor {
    /// Empty descriptor for `table`
    pub fn new(table: impl Into<String>) -> Result<Self, DeclarationError> {
        let table = table.into();
        if !naming::is_valid_identifier(&table) {
            return Err(DeclarationError::InvalidIdentifier(table));
        }

        Ok(Self {
            table,
            indices: Vec::new(),
            one_to_many: Vec::new(),
            many_to_many: Vec::new(),
            declaring: false,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// `id<table>`
    pub fn main_id_column(&self) -> String {
        naming::id_column(&self.table)
    }

    /// Link table of a many-to-many relationship
    pub fn link_table(&self, name: &str) -> String {
        naming::link_table(&self.table, name)
    }

    /// Open the declaration phase. Any previous declarations are discarded.
    pub fn begin_declarations(&mut self) {
        self.indices.clear();
        self.one_to_many.clear();
        self.many_to_many.clear();
        self.declaring = true;
    }

    pub fn end_declarations(&mut self) {
        self.declaring = false;
    }

    pub fn is_declaring(&self) -> bool {
        self.declaring
    }

    /// Declare a scalar column on the main table
    pub fn declare_index(
        &mut self,
        name: &str,
        sql_type: &str,
    ) -> Result<&Relationship, DeclarationError> {
        self.check_phase(name)?;
        self.register(RelationKind::Index, name, sql_type, true)
    }

    /// Declare a one-to-many relationship
    pub fn declare_one_to_many(
        &mut self,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> Result<&Relationship, DeclarationError> {
        self.check_phase(name)?;
        self.register(RelationKind::OneToMany, name, sql_type, indexed)
    }

    /// Declare a many-to-many relationship
    pub fn declare_many_to_many(
        &mut self,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> Result<&Relationship, DeclarationError> {
        self.check_phase(name)?;
        self.register(RelationKind::ManyToMany, name, sql_type, indexed)
    }

    fn check_phase(&self, name: &str) -> Result<(), DeclarationError> {
        if self.declaring {
            Ok(())
        } else {
            Err(DeclarationError::OutsideDeclarationPhase(name.to_string()))
        }
    }

    /// Add a declaration outside the declaration phase.
    ///
    /// Applies the same validation as the `declare_*` methods. Used by the
    /// dynamic migrations, which extend a schema that is already live.
    pub fn register(
        &mut self,
        kind: RelationKind,
        name: &str,
        sql_type: &str,
        indexed: bool,
    ) -> Result<&Relationship, DeclarationError> {
        if !naming::is_valid_identifier(name) {
            return Err(DeclarationError::InvalidIdentifier(name.to_string()));
        }
        if self.type_of(name).is_some() {
            return Err(DeclarationError::Duplicate(name.to_string()));
        }
        self.check_collisions(kind, name)?;

        let unbounded = is_unbounded_text(sql_type);
        let (sql_type, indexed) = match kind {
            RelationKind::Index => {
                if unbounded {
                    return Err(DeclarationError::UnindexableText {
                        column: name.to_string(),
                        sql_type: sql_type.to_string(),
                    });
                }
                (sql_type.to_string(), true)
            }
            RelationKind::OneToMany | RelationKind::ManyToMany => {
                if indexed && unbounded {
                    warn!(
                        relationship = %name,
                        sql_type = %sql_type,
                        "Text columns cannot be indexed, declaring unindexed"
                    );
                }
                (sql_type.to_ascii_uppercase(), indexed && !unbounded)
            }
        };

        let relationship = Relationship {
            name: name.to_string(),
            sql_type,
            indexed,
            kind,
        };

        let list = self.list_mut(kind);
        list.push(relationship);
        Ok(&list[list.len() - 1])
    }

    /// Names `name` would occupy against everything already owned by the
    /// schema. SQLite compares identifiers case-insensitively, so this does too.
    fn check_collisions(&self, kind: RelationKind, name: &str) -> Result<(), DeclarationError> {
        let table = &self.table;
        let mut taken = vec![
            table.clone(),
            naming::id_column(table),
            naming::BLOB_COLUMN.to_string(),
            naming::DATABASE_ID_FIELD.to_string(),
            naming::temp_table(table),
        ];
        for rel in self.relationships() {
            taken.push(rel.name.clone());
            match rel.kind {
                RelationKind::Index => {}
                RelationKind::OneToMany => taken.push(naming::id_column(&rel.name)),
                RelationKind::ManyToMany => taken.push(self.link_table(&rel.name)),
            }
        }

        let claimed = match kind {
            RelationKind::Index => vec![name.to_string()],
            RelationKind::OneToMany => vec![name.to_string(), naming::id_column(name)],
            RelationKind::ManyToMany => vec![name.to_string(), self.link_table(name)],
        };

        for wanted in &claimed {
            if let Some(existing) = taken.iter().find(|t| t.eq_ignore_ascii_case(wanted)) {
                return Err(DeclarationError::Collision {
                    name: name.to_string(),
                    existing: existing.clone(),
                });
            }
        }
        Ok(())
    }

    /// Remove a declaration, returning it if it existed
    pub fn remove(&mut self, name: &str) -> Option<Relationship> {
        for kind in [
            RelationKind::Index,
            RelationKind::OneToMany,
            RelationKind::ManyToMany,
        ] {
            let list = self.list_mut(kind);
            if let Some(pos) = list.iter().position(|r| r.name == name) {
                return Some(list.remove(pos));
            }
        }
        None
    }

    /// Declared SQL type of `name`; `None` if nothing by that name is declared
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.relationship(name).map(|r| r.sql_type.as_str())
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships().find(|r| r.name == name)
    }

    pub fn kind_of(&self, name: &str) -> Option<RelationKind> {
        self.relationship(name).map(|r| r.kind)
    }

    pub fn indices(&self) -> &[Relationship] {
        &self.indices
    }

    pub fn one_to_many(&self) -> &[Relationship] {
        &self.one_to_many
    }

    pub fn many_to_many(&self) -> &[Relationship] {
        &self.many_to_many
    }

    /// Every declaration: indices, then one-to-many, then many-to-many
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.indices
            .iter()
            .chain(self.one_to_many.iter())
            .chain(self.many_to_many.iter())
    }

    fn list_mut(&mut self, kind: RelationKind) -> &mut Vec<Relationship> {
        match kind {
            RelationKind::Index => &mut self.indices,
            RelationKind::OneToMany => &mut self.one_to_many,
            RelationKind::ManyToMany => &mut self.many_to_many,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pets() -> SchemaDescriptor {
        let mut schema = SchemaDescriptor::new("pet").unwrap();
        schema.begin_declarations();
        schema.declare_index("name", "VARCHAR(64)").unwrap();
        schema.declare_one_to_many("garden", "varchar(32)", true).unwrap();
        schema.declare_index("friends", "INTEGER").unwrap();
        schema.declare_many_to_many("places", "VARCHAR(32)", false).unwrap();
        schema.end_declarations();
        schema
    }

    #[test]
    fn test_declarations_in_order() {
        let schema = pets();

        let indices: Vec<_> = schema.indices().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(indices, vec!["name", "friends"]);
        assert_eq!(schema.one_to_many().len(), 1);
        assert_eq!(schema.many_to_many().len(), 1);

        let all: Vec<_> = schema.relationships().map(|r| r.name.as_str()).collect();
        assert_eq!(all, vec!["name", "friends", "garden", "places"]);
    }

    #[test]
    fn test_type_of_is_existence_check() {
        let schema = pets();

        assert_eq!(schema.type_of("name"), Some("VARCHAR(64)"));
        assert_eq!(schema.type_of("garden"), Some("VARCHAR(32)"));
        assert_eq!(schema.type_of("unknown"), None);
        assert_eq!(schema.kind_of("places"), Some(RelationKind::ManyToMany));
        assert_eq!(schema.link_table("places"), "petlinkplaces");
        assert_eq!(schema.main_id_column(), "idpet");
    }

    #[test]
    fn test_declare_outside_phase_fails() {
        let mut schema = SchemaDescriptor::new("pet").unwrap();

        let err = schema.declare_index("name", "VARCHAR(64)").unwrap_err();
        assert_eq!(err, DeclarationError::OutsideDeclarationPhase("name".into()));

        schema.begin_declarations();
        schema.end_declarations();
        assert!(schema.declare_many_to_many("places", "TEXT", false).is_err());
    }

    #[test]
    fn test_begin_declarations_clears() {
        let mut schema = pets();
        schema.begin_declarations();
        assert_eq!(schema.relationships().count(), 0);
        assert!(schema.is_declaring());
    }

    #[test]
    fn test_unbounded_text_index_is_fatal() {
        let mut schema = SchemaDescriptor::new("pet").unwrap();
        schema.begin_declarations();

        let err = schema.declare_index("notes", "text").unwrap_err();
        assert!(matches!(err, DeclarationError::UnindexableText { .. }));
        assert_eq!(schema.type_of("notes"), None);
    }

    #[test]
    fn test_unbounded_text_relationship_is_downgraded() {
        let mut schema = SchemaDescriptor::new("pet").unwrap();
        schema.begin_declarations();

        let rel = schema.declare_one_to_many("bio", "longtext", true).unwrap();
        assert!(!rel.indexed);
        assert_eq!(rel.sql_type, "LONGTEXT");

        let rel = schema.declare_many_to_many("tags", "VARCHAR(16)", true).unwrap();
        assert!(rel.indexed);
    }

    #[test]
    fn test_duplicates_rejected_across_kinds() {
        let mut schema = pets();
        let err = schema
            .register(RelationKind::ManyToMany, "garden", "VARCHAR(8)", false)
            .unwrap_err();
        assert_eq!(err, DeclarationError::Duplicate("garden".into()));
    }

    #[test]
    fn test_invalid_identifiers() {
        assert!(SchemaDescriptor::new("pet table").is_err());

        let mut schema = pets();
        let err = schema
            .register(RelationKind::Index, "a;b", "INTEGER", true)
            .unwrap_err();
        assert_eq!(err, DeclarationError::InvalidIdentifier("a;b".into()));
    }

    fn collision(schema: &mut SchemaDescriptor, kind: RelationKind, name: &str) -> String {
        match schema.register(kind, name, "VARCHAR(16)", false) {
            Err(DeclarationError::Collision { existing, .. }) => existing,
            other => panic!("expected a collision for '{}', got {:?}", name, other),
        }
    }

    #[test]
    fn test_reserved_names_rejected() {
        let mut schema = pets();

        assert_eq!(collision(&mut schema, RelationKind::OneToMany, "pet"), "pet");
        assert_eq!(collision(&mut schema, RelationKind::Index, "content"), "content");
        assert_eq!(collision(&mut schema, RelationKind::Index, "databaseid"), "databaseid");
        assert_eq!(collision(&mut schema, RelationKind::Index, "idpet"), "idpet");
        assert_eq!(collision(&mut schema, RelationKind::ManyToMany, "pet_temp"), "pet_temp");
        assert_eq!(collision(&mut schema, RelationKind::Index, "CONTENT"), "content");
        assert_eq!(schema.relationships().count(), 4);
    }

    #[test]
    fn test_derived_names_collide() {
        let mut schema = pets();

        // Column of the one-to-many relationship "garden"
        assert_eq!(collision(&mut schema, RelationKind::Index, "idgarden"), "idgarden");
        // Link table of "places"
        assert_eq!(
            collision(&mut schema, RelationKind::OneToMany, "petlinkplaces"),
            "petlinkplaces"
        );
        // A new one-to-many whose column is already an index
        schema.register(RelationKind::Index, "idowner", "INTEGER", true).unwrap();
        assert_eq!(collision(&mut schema, RelationKind::OneToMany, "owner"), "idowner");
        // A new many-to-many whose link table is an existing side table
        schema
            .register(RelationKind::OneToMany, "petlinkcolors", "VARCHAR(8)", false)
            .unwrap();
        assert_eq!(
            collision(&mut schema, RelationKind::ManyToMany, "colors"),
            "petlinkcolors"
        );
        assert_eq!(collision(&mut schema, RelationKind::ManyToMany, "Garden"), "garden");
    }

    #[test]
    fn test_engine_table_names_rejected() {
        assert!(SchemaDescriptor::new("sqlite_master").is_err());

        let mut schema = pets();
        let err = schema
            .register(RelationKind::OneToMany, "SQLite_stat1", "VARCHAR(8)", false)
            .unwrap_err();
        assert_eq!(err, DeclarationError::InvalidIdentifier("SQLite_stat1".into()));
    }

    #[test]
    fn test_register_and_remove() {
        let mut schema = pets();

        schema
            .register(RelationKind::OneToMany, "owner", "VARCHAR(16)", false)
            .unwrap();
        assert_eq!(schema.kind_of("owner"), Some(RelationKind::OneToMany));

        let removed = schema.remove("owner").unwrap();
        assert_eq!(removed.name, "owner");
        assert_eq!(schema.type_of("owner"), None);
        assert!(schema.remove("owner").is_none());
    }

    #[test]
    fn test_is_unbounded_text() {
        assert!(is_unbounded_text("TEXT"));
        assert!(is_unbounded_text(" mediumtext "));
        assert!(is_unbounded_text("TinyText"));
        assert!(!is_unbounded_text("VARCHAR(255)"));
        assert!(!is_unbounded_text("CHAR(2)"));
        assert!(!is_unbounded_text("INTEGER"));
    }
}
