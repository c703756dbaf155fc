//! FieldsV1 wire codec for path sets.
//!
//! Each trie level serializes as a JSON object whose keys are prefixed path
//! elements: "f:" field name, "k:" associative-list key, "v:" list-set value,
//! "i:" list index. A "." key inside a child object marks the child's own
//! path as a member of the set.

use super::path::PathElement;
use super::set::Set;
use crate::value::{Field, FieldList, Value};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SerializeError {
    pub message: String,
}

impl SerializeError {
    pub fn new(message: impl Into<String>) -> Self {
        SerializeError {
            message: message.into(),
        }
    }
}

/// Serializes a PathElement to its prefixed string form.
pub fn serialize_path_element(pe: &PathElement) -> Result<String, SerializeError> {
    match pe {
        PathElement::FieldName(name) => Ok(format!("f:{}", name)),
        PathElement::Value(v) => {
            let json = serde_json::to_string(&v.to_json_value())
                .map_err(|e| SerializeError::new(format!("JSON error: {}", e)))?;
            Ok(format!("v:{}", json))
        }
        PathElement::Key(fields) => {
            let mut obj = serde_json::Map::new();
            for field in fields.iter() {
                obj.insert(field.name.clone(), field.value.to_json_value());
            }
            let json = serde_json::to_string(&serde_json::Value::Object(obj))
                .map_err(|e| SerializeError::new(format!("JSON error: {}", e)))?;
            Ok(format!("k:{}", json))
        }
        PathElement::Index(i) => Ok(format!("i:{}", i)),
    }
}

/// Deserializes a PathElement from its prefixed string form.
pub fn deserialize_path_element(s: &str) -> Result<PathElement, SerializeError> {
    if s.len() < 2 {
        return Err(SerializeError::new(
            "path element key must be at least 2 characters long",
        ));
    }

    let (prefix, content) = s.split_at(2);
    match prefix {
        "f:" => Ok(PathElement::FieldName(content.to_string())),
        "v:" => {
            let json: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| SerializeError::new(format!("JSON parse error: {}", e)))?;
            Ok(PathElement::Value(Value::from_json_value(&json)))
        }
        "k:" => {
            let json: serde_json::Value = serde_json::from_str(content)
                .map_err(|e| SerializeError::new(format!("JSON parse error: {}", e)))?;
            match json {
                serde_json::Value::Object(obj) => {
                    let fields = obj
                        .into_iter()
                        .map(|(name, v)| Field {
                            name,
                            value: Value::from_json_value(&v),
                        })
                        .collect();
                    Ok(PathElement::Key(FieldList::with_fields(fields)))
                }
                _ => Err(SerializeError::new("expected JSON object for key")),
            }
        }
        "i:" => content
            .parse::<i32>()
            .map(PathElement::Index)
            .map_err(|e| SerializeError::new(format!("invalid index: {}", e))),
        _ => Err(SerializeError::new(format!(
            "unknown path element type: {}",
            prefix
        ))),
    }
}

impl Set {
    /// Serializes the set to FieldsV1 JSON.
    pub fn to_fields_json(&self) -> Result<serde_json::Value, SerializeError> {
        self.to_json_object().map(serde_json::Value::Object)
    }

    fn to_json_object(&self) -> Result<serde_json::Map<String, serde_json::Value>, SerializeError> {
        let mut result = serde_json::Map::new();

        // child prefixes first so a member that is also a prefix merges below
        for (pe, child) in &self.children {
            let key = serialize_path_element(pe)?;
            let mut child_obj = child.to_json_object()?;
            if self.members.contains(pe) {
                let mut with_dot = serde_json::Map::new();
                with_dot.insert(".".to_string(), serde_json::Value::Object(Default::default()));
                with_dot.append(&mut child_obj);
                child_obj = with_dot;
            }
            result.insert(key, serde_json::Value::Object(child_obj));
        }

        for member in self.members.iter() {
            if self.children.contains_key(member) {
                continue;
            }
            let key = serialize_path_element(member)?;
            result.insert(key, serde_json::Value::Object(Default::default()));
        }

        Ok(result)
    }

    /// Deserializes a set from FieldsV1 JSON.
    pub fn from_fields_json(data: &serde_json::Value) -> Result<Set, SerializeError> {
        match data {
            serde_json::Value::Object(obj) => Set::from_json_object(obj),
            _ => Err(SerializeError::new("expected JSON object for field set")),
        }
    }

    fn from_json_object(
        obj: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Set, SerializeError> {
        let mut set = Set::new();

        for (key, value) in obj {
            if key == "." {
                // Handled by the parent level.
                continue;
            }

            let pe = match deserialize_path_element(key) {
                Ok(pe) => pe,
                // Skip unknown prefixes for forward compatibility.
                Err(e) if e.message.starts_with("unknown path element type") => continue,
                Err(e) => return Err(e),
            };

            match value {
                serde_json::Value::Object(child_obj) => {
                    if child_obj.is_empty() {
                        set.members.insert(pe);
                    } else {
                        if child_obj.contains_key(".") {
                            set.members.insert(pe.clone());
                        }
                        let child = Set::from_json_object(child_obj)?;
                        if !child.is_empty() {
                            set.children.insert(pe, child);
                        }
                    }
                }
                _ => {
                    return Err(SerializeError::new(format!(
                        "expected object value for key: {}",
                        key
                    )));
                }
            }
        }

        Ok(set)
    }
}
