//! End-to-end behaviour of a file-backed store: declarations, CRUD,
//! filtered navigation and schema evolution on populated tables.

use dendb_core::{JsonCodec, SchemaDescriptor, SqlValue};
use dendb_sqlite::{DenormalizedStore, Predicates, SqliteConfig, SqliteError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Pet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    databaseid: Option<i64>,
    name: String,
    garden: String,
    friends: i64,
    #[serde(default)]
    places: Vec<String>,
}

type Store = DenormalizedStore<JsonCodec<Pet>>;

fn pet(name: &str, garden: &str, friends: i64, places: &[&str]) -> Pet {
    Pet {
        databaseid: None,
        name: name.to_string(),
        garden: garden.to_string(),
        friends,
        places: places.iter().map(|p| p.to_string()).collect(),
    }
}

fn declarations() -> SchemaDescriptor {
    let mut schema = SchemaDescriptor::new("pet").unwrap();
    schema.begin_declarations();
    schema.declare_index("name", "VARCHAR(64)").unwrap();
    schema.declare_one_to_many("garden", "VARCHAR(32)", true).unwrap();
    schema.declare_index("friends", "INTEGER").unwrap();
    schema.declare_many_to_many("places", "VARCHAR(32)", false).unwrap();
    schema.end_declarations();
    schema
}

/// Store with six pets in gardens A, B, B, B, C, D
fn populated(dir: &TempDir) -> (Store, SchemaDescriptor) {
    let codec = JsonCodec::new().with_natural_key("name").require("name");
    let store = DenormalizedStore::open(SqliteConfig::new(dir.path().join("pets.db")), codec).unwrap();
    let schema = declarations();
    store.create_schema(&schema).unwrap();

    let pets = [
        pet("Rex", "A", 1, &["park"]),
        pet("Tom", "B", 2, &["park", "beach"]),
        pet("Kit", "B", 3, &["beach"]),
        pet("Bob", "B", 4, &["yard"]),
        pet("Max", "C", 5, &[]),
        pet("Zoe", "D", 6, &["pond"]),
    ];
    for p in &pets {
        store.add_object(&schema, p, true).unwrap();
    }
    (store, schema)
}

fn place(store: &Store, schema: &SchemaDescriptor, name: &str) -> i64 {
    store
        .resolve_value_id(schema, "places", &json!(name))
        .unwrap()
        .unwrap()
}

fn names(store: &Store, schema: &SchemaDescriptor, predicates: &Predicates) -> Vec<String> {
    store
        .list_objects(schema, predicates)
        .unwrap()
        .into_iter()
        .map(|entry| entry.object.name)
        .collect()
}

#[test]
fn counts_follow_inserts_and_deletes() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    assert_eq!(store.count(&schema, None).unwrap(), 6);
    assert_eq!(store.count(&schema, Some("garden")).unwrap(), 4);

    assert!(store
        .delete_object_by_index(&schema, "name", &json!("Rex"), true)
        .unwrap());

    assert_eq!(store.count(&schema, None).unwrap(), 5);
    assert_eq!(store.count(&schema, Some("garden")).unwrap(), 3);
    assert_eq!(store.resolve_value_id(&schema, "garden", &json!("A")).unwrap(), None);
}

#[test]
fn deleting_one_of_many_keeps_shared_garden() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    store
        .delete_object_by_index(&schema, "name", &json!("Kit"), true)
        .unwrap();

    assert_eq!(store.count(&schema, Some("garden")).unwrap(), 4);
    // beach is still linked to Tom
    assert!(store.resolve_value_id(&schema, "places", &json!("beach")).unwrap().is_some());
}

#[test]
fn place_predicates_are_and_combined() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    let park = place(&store, &schema, "park");
    let beach = place(&store, &schema, "beach");
    let pond = place(&store, &schema, "pond");

    let in_park = Predicates::from([("places".to_string(), park)]);
    assert_eq!(names(&store, &schema, &in_park), vec!["Rex", "Tom"]);

    let garden_b = store
        .resolve_value_id(&schema, "garden", &json!("B"))
        .unwrap()
        .unwrap();
    let park_in_b = Predicates::from([("places".to_string(), park), ("garden".to_string(), garden_b)]);
    assert_eq!(names(&store, &schema, &park_in_b), vec!["Tom"]);

    let park_in_missing_garden =
        Predicates::from([("places".to_string(), park), ("garden".to_string(), -1)]);
    assert!(names(&store, &schema, &park_in_missing_garden).is_empty());

    let beach_only = Predicates::from([("places".to_string(), beach)]);
    assert_eq!(names(&store, &schema, &beach_only), vec!["Tom", "Kit"]);

    let pond_only = Predicates::from([("places".to_string(), pond)]);
    assert_eq!(names(&store, &schema, &pond_only), vec!["Zoe"]);
}

#[test]
fn unfiltered_listing_returns_everything_in_id_order() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    let entries = store.list_objects(&schema, &Predicates::new()).unwrap();
    assert_eq!(entries.len(), 6);
    assert!(entries.windows(2).all(|w| w[0].id < w[1].id));
    assert!(entries.iter().all(|e| e.object.databaseid == Some(e.id)));

    let by_index_only = Predicates::from([("friends".to_string(), 3)]);
    assert_eq!(store.list_objects(&schema, &by_index_only).unwrap().len(), 6);
}

#[test]
fn relationship_values_narrow_with_predicates() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    let garden_b = store
        .resolve_value_id(&schema, "garden", &json!("B"))
        .unwrap()
        .unwrap();
    let values: Vec<SqlValue> = store
        .list_relationship_values(&schema, "places", &Predicates::from([("garden".to_string(), garden_b)]))
        .unwrap()
        .into_iter()
        .map(|v| v.value)
        .collect();

    assert_eq!(
        values,
        vec![
            SqlValue::Text("park".into()),
            SqlValue::Text("beach".into()),
            SqlValue::Text("yard".into()),
        ]
    );
}

#[test]
fn drop_then_add_restores_the_projection() {
    let dir = TempDir::new().unwrap();
    let (store, mut schema) = populated(&dir);
    let original = store.introspect("pet").unwrap();

    store.drop_one_to_many(&mut schema, "garden").unwrap();
    assert!(schema.relationship("garden").is_none());
    assert!(store.introspect("pet").unwrap().relationship("garden").is_none());
    assert_eq!(store.count(&schema, None).unwrap(), 6);

    assert!(store.add_one_to_many(&mut schema, "garden", "VARCHAR(32)", true).unwrap());
    assert_eq!(store.count(&schema, Some("garden")).unwrap(), 4);

    let garden_b = store
        .resolve_value_id(&schema, "garden", &json!("B"))
        .unwrap()
        .unwrap();
    let in_b = Predicates::from([("garden".to_string(), garden_b)]);
    assert_eq!(names(&store, &schema, &in_b), vec!["Tom", "Kit", "Bob"]);

    let restored = store.introspect("pet").unwrap();
    assert_eq!(
        restored.relationship("garden"),
        original.relationship("garden")
    );
}

#[test]
fn dropping_an_index_keeps_objects_loadable() {
    let dir = TempDir::new().unwrap();
    let (store, mut schema) = populated(&dir);

    store.drop_index(&mut schema, "friends").unwrap();

    let tom = store
        .get_object_by_index(&schema, "name", &json!("Tom"))
        .unwrap()
        .unwrap();
    assert_eq!(tom.friends, 2);
    assert!(matches!(
        store.get_object_by_index(&schema, "friends", &json!(2)),
        Err(SqliteError::UnknownRelationship(_))
    ));

    assert!(store.add_index(&mut schema, "friends", "INTEGER").unwrap());
    let found = store
        .get_object_by_index(&schema, "friends", &json!(2))
        .unwrap()
        .unwrap();
    assert_eq!(found.name, "Tom");
}

#[test]
fn reopening_keeps_data_and_schema() {
    let dir = TempDir::new().unwrap();
    {
        let (store, schema) = populated(&dir);
        store.add_object(&schema, &pet("Rex", "A", 10, &["park"]), true).unwrap();
    }

    let codec = JsonCodec::<Pet>::new().with_natural_key("name");
    let store = DenormalizedStore::open(SqliteConfig::new(dir.path().join("pets.db")), codec).unwrap();
    let schema = declarations();
    store.create_schema(&schema).unwrap();

    assert_eq!(store.count(&schema, None).unwrap(), 6);
    let rex = store
        .get_object_by_index(&schema, "name", &json!("Rex"))
        .unwrap()
        .unwrap();
    assert_eq!(rex.friends, 10);
    assert_eq!(store.introspect("pet").unwrap(), schema);
}

#[test]
fn repair_is_a_noop_on_a_healthy_store() {
    let dir = TempDir::new().unwrap();
    let (store, schema) = populated(&dir);

    store.repair(&schema).unwrap();
    store.repair(&schema).unwrap();

    assert_eq!(store.count(&schema, None).unwrap(), 6);
    assert_eq!(store.count(&schema, Some("garden")).unwrap(), 4);
    assert_eq!(store.count(&schema, Some("places")).unwrap(), 4);
}
