//! Unstructured resource objects.

use crate::value::{from_json, from_yaml, Map, Value};

/// Object is an unstructured resource document. It wraps a Value and adds
/// the metadata accessors the field manager needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object {
    value: Value,
}

impl Object {
    pub fn new(value: Value) -> Self {
        Object { value }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        Ok(Object::new(from_yaml(yaml)?))
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Object::new(from_json(json)?))
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    /// Returns the root map, or None for a document whose root is not a
    /// map. Such objects expose no metadata at all.
    pub fn accessor(&self) -> Option<&Map> {
        self.value.as_map()
    }

    fn accessor_mut(&mut self) -> Option<&mut Map> {
        self.value.as_map_mut()
    }

    fn top_level_string(&self, key: &str) -> &str {
        self.accessor()
            .and_then(|root| root.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn api_version(&self) -> &str {
        self.top_level_string("apiVersion")
    }

    pub fn kind(&self) -> &str {
        self.top_level_string("kind")
    }

    pub fn metadata(&self) -> Option<&Map> {
        self.accessor()?.get("metadata")?.as_map()
    }

    fn metadata_string(&self, key: &str) -> &str {
        self.metadata()
            .and_then(|meta| meta.get(key))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.metadata_string("name")
    }

    pub fn namespace(&self) -> &str {
        self.metadata_string("namespace")
    }

    /// The raw managedFields list, if present.
    pub fn managed_fields(&self) -> Option<&Value> {
        self.metadata()?.get("managedFields")
    }

    /// Replaces the managedFields list, creating the metadata block if
    /// needed. Returns false when the object has no metadata accessor.
    pub fn set_managed_fields(&mut self, entries: Value) -> bool {
        let Some(root) = self.accessor_mut() else {
            return false;
        };
        if !root.get("metadata").map(Value::is_map).unwrap_or(false) {
            root.set("metadata".to_string(), Value::Map(Map::new()));
        }
        if let Some(meta) = root.get_mut("metadata").and_then(Value::as_map_mut) {
            meta.set("managedFields".to_string(), entries);
        }
        true
    }

    /// Drops the managedFields list. The metadata block stays, even empty.
    pub fn remove_managed_fields(&mut self) {
        if let Some(meta) = self
            .accessor_mut()
            .and_then(|root| root.get_mut("metadata"))
            .and_then(Value::as_map_mut)
        {
            meta.delete("managedFields");
        }
    }
}
