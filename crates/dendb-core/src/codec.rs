//! The contract between a domain type and the store
//!
//! The store never knows the concrete type it persists. An [`ObjectCodec`]
//! turns objects into structured values and back, decides whether a value
//! may be stored, finds an existing copy by natural key, and builds the
//! entries returned by navigation queries.

use crate::error::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;

/// Read access to a live store, handed to [`ObjectCodec::exists`]
pub trait ObjectLookup {
    /// Id of the object whose index column `column` equals `value`
    fn find_by_index(&self, column: &str, value: &Value) -> Option<i64>;
}

/// Serialization and identity rules for one domain type
pub trait ObjectCodec {
    type Object;
    /// Item produced for navigation listings
    type Entry;

    fn encode(&self, object: &Self::Object) -> Result<Value, CodecError>;

    /// Rebuild an object. `value` carries the row id under `databaseid`.
    fn decode(&self, value: Value, id: i64) -> Result<Self::Object, CodecError>;

    /// Whether a serialized object may be stored
    fn is_valid(&self, _value: &Value) -> bool {
        true
    }

    /// Natural-key lookup, used only when the value carries no embedded id
    fn exists(&self, _value: &Value, _lookup: &dyn ObjectLookup) -> Option<i64> {
        None
    }

    /// Build a listing item. `value` carries the row id under `databaseid`.
    fn list_entry(&self, value: Value, id: i64) -> Result<Self::Entry, CodecError>;
}

/// A stored object with its row id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListEntry<T> {
    pub id: i64,
    pub object: T,
}

/// [`ObjectCodec`] for any serde type
#[derive(Debug, Clone)]
pub struct JsonCodec<T> {
    natural_key: Option<String>,
    required: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self {
            natural_key: None,
            required: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identify existing objects by this index column
    pub fn with_natural_key(mut self, column: impl Into<String>) -> Self {
        self.natural_key = Some(column.into());
        self
    }

    /// Reject objects where `field` is missing or null
    pub fn require(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    pub fn natural_key(&self) -> Option<&str> {
        self.natural_key.as_deref()
    }
}

impl<T> ObjectCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Object = T;
    type Entry = ListEntry<T>;

    fn encode(&self, object: &T) -> Result<Value, CodecError> {
        Ok(serde_json::to_value(object)?)
    }

    fn decode(&self, value: Value, _id: i64) -> Result<T, CodecError> {
        Ok(serde_json::from_value(value)?)
    }

    fn is_valid(&self, value: &Value) -> bool {
        let Some(map) = value.as_object() else {
            return false;
        };
        self.required
            .iter()
            .all(|field| map.get(field).is_some_and(|v| !v.is_null()))
    }

    fn exists(&self, value: &Value, lookup: &dyn ObjectLookup) -> Option<i64> {
        let column = self.natural_key.as_deref()?;
        let key = value.get(column).filter(|v| !v.is_null())?;
        lookup.find_by_index(column, key)
    }

    fn list_entry(&self, value: Value, id: i64) -> Result<ListEntry<T>, CodecError> {
        let object = serde_json::from_value(value)?;
        Ok(ListEntry { id, object })
    }
}
