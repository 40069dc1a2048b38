//! Schema data exchanged between plugins and the workflow server
//!
//! Workflow state moves as opaque binary blobs. Whatever structure a plugin
//! keeps in memory only has to honour [`SchemaData`]. [`SchemaMap`] is the
//! container the plugin runner uses: named JSON values keyed
//! `"<plugin>.<field>"`.

use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::SchemaError;

/// Binary marshal/unmarshal contract for exchanged state
pub trait SchemaData: Send {
    /// Encode to bytes
    fn marshal_binary(&self) -> Result<Vec<u8>, SchemaError>;

    /// Decode from bytes into `self`
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SchemaError>;
}

/// Named JSON values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaMap {
    values: BTreeMap<String, Value>,
}

impl SchemaMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the value stored under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, SchemaError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| SchemaError::MissingKey(key.to_string()))?;
        serde_json::from_value(value.clone()).map_err(SchemaError::Decode)
    }

    /// Raw value stored under `key`
    pub fn get_raw(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Store `value` under `key`, replacing any previous value
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: &T) -> Result<(), SchemaError> {
        let value = serde_json::to_value(value).map_err(SchemaError::Encode)?;
        self.values.insert(key.into(), value);
        Ok(())
    }

    /// Store a raw value
    pub fn insert_raw(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SchemaData for SchemaMap {
    fn marshal_binary(&self) -> Result<Vec<u8>, SchemaError> {
        serde_json::to_vec(&self.values).map_err(SchemaError::Encode)
    }

    /// Merges the decoded entries over the current ones. Keys absent from
    /// the payload keep their current (default) values.
    fn unmarshal_binary(&mut self, data: &[u8]) -> Result<(), SchemaError> {
        let decoded: BTreeMap<String, Value> =
            serde_json::from_slice(data).map_err(SchemaError::Decode)?;
        self.values.extend(decoded);
        Ok(())
    }
}

type Constructor = Box<dyn Fn() -> Value + Send + Sync>;

/// Constructors for named schema values.
///
/// Built once at startup and handed to whoever needs to instantiate a
/// schema by name.
#[derive(Default)]
pub struct SchemaRegistry {
    constructors: HashMap<String, Constructor>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor for `name`, replacing any previous one
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Register `T::default()` as the constructor for `name`
    pub fn register_type<T>(&mut self, name: impl Into<String>)
    where
        T: Default + Serialize + 'static,
    {
        self.register(name, || serde_json::to_value(T::default()).unwrap_or(Value::Null));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Fresh value for `name`
    pub fn instantiate(&self, name: &str) -> Result<Value, SchemaError> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| SchemaError::Unregistered(name.to_string()))
    }

    /// A map holding a fresh value for every name
    pub fn new_map<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<SchemaMap, SchemaError> {
        let mut map = SchemaMap::new();
        for name in names {
            map.insert_raw(name, self.instantiate(name)?);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Files {
        files: Vec<String>,
    }

    #[test]
    fn test_schema_map_marshal_unmarshal() {
        let mut map = SchemaMap::new();
        map.set(
            "kind-remover.files",
            &Files {
                files: vec!["kind".to_string()],
            },
        )
        .unwrap();

        let bytes = map.marshal_binary().unwrap();
        let mut decoded = SchemaMap::new();
        decoded.unmarshal_binary(&bytes).unwrap();

        let files: Files = decoded.get("kind-remover.files").unwrap();
        assert_eq!(files.files, vec!["kind"]);
    }

    #[test]
    fn test_unmarshal_keeps_defaults_for_absent_keys() {
        let mut registry = SchemaRegistry::new();
        registry.register_type::<Files>("p.files");
        registry.register("p.params", || serde_json::json!({"workspace": "/tmp"}));

        let mut map = registry.new_map(["p.files", "p.params"]).unwrap();
        map.unmarshal_binary(br#"{"p.files":{"files":["a","b"]}}"#)
            .unwrap();

        let files: Files = map.get("p.files").unwrap();
        assert_eq!(files.files.len(), 2);
        assert_eq!(map.get_raw("p.params").unwrap()["workspace"], "/tmp");
    }

    #[test]
    fn test_unmarshal_garbage_is_decode_error() {
        let mut map = SchemaMap::new();
        assert!(matches!(
            map.unmarshal_binary(b"\x00\x01not json"),
            Err(SchemaError::Decode(_))
        ));
    }

    #[test]
    fn test_registry_unknown_name() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.new_map(["nope.files"]),
            Err(SchemaError::Unregistered(name)) if name == "nope.files"
        ));
    }
}
