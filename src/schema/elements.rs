//! Core schema elements and type definitions.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Schema is a list of named types.
///
/// Types are indexed lazily on first lookup, so a Schema should be treated
/// as immutable once constructed.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<TypeDef>,

    #[serde(skip)]
    type_map: OnceCell<HashMap<String, TypeDef>>,
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        Schema {
            types: self.types.clone(),
            type_map: OnceCell::new(),
        }
    }
}

/// TypeDef is a named type in a schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeDef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(flatten)]
    pub atom: Atom,
}

/// TypeRef either refers to a named type or declares an inlined one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TypeRef {
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "namedType")]
    pub named_type: Option<String>,

    #[serde(flatten)]
    pub inlined: Box<Atom>,

    /// Overrides the referred type's element relationship when resolved.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "elementRelationship"
    )]
    pub element_relationship: Option<ElementRelationship>,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef {
            named_type: Some(name.into()),
            ..Default::default()
        }
    }

    /// Two refs are interchangeable for comparison/merge purposes when they
    /// name the same type with the same relationship override.
    pub fn same_type(&self, other: &TypeRef) -> bool {
        self.named_type == other.named_type
            && self.element_relationship == other.element_relationship
    }
}

/// Atom is the smallest piece of the type system; exactly one field is
/// expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Atom {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scalar: Option<Scalar>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<List>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<Map>,
}

impl Atom {
    fn is_unset(&self) -> bool {
        self.scalar.is_none() && self.list.is_none() && self.map.is_none()
    }
}

/// Scalar is a leaf value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scalar {
    Numeric,
    String,
    Boolean,
    Untyped,
}

/// ElementRelationship states how the elements of a container type relate
/// to each other for merge purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ElementRelationship {
    /// List elements are identified by key fields and merged individually.
    Associative,
    /// The container behaves as a single leaf value.
    Atomic,
    /// Elements have no particular relationship (default for maps).
    #[default]
    Separable,
}

/// Map is a struct or string-keyed mapping type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Map {
    /// Each declared struct field appears exactly once here.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<StructField>,

    /// Type of fields not declared in `fields`.
    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(
        default,
        skip_serializing_if = "is_default_relationship",
        rename = "elementRelationship"
    )]
    pub element_relationship: ElementRelationship,

    #[serde(skip)]
    field_map: OnceCell<HashMap<String, StructField>>,
}

fn is_default_relationship(er: &ElementRelationship) -> bool {
    *er == ElementRelationship::Separable
}

/// StructField pairs a field name with its type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructField {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    #[serde(default, rename = "type")]
    pub field_type: TypeRef,
}

/// List holds zero or more elements of one subtype.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct List {
    #[serde(default, rename = "elementType")]
    pub element_type: TypeRef,

    #[serde(default, rename = "elementRelationship")]
    pub element_relationship: ElementRelationship,

    /// Key fields identifying elements of an associative list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn with_types(types: Vec<TypeDef>) -> Self {
        Schema {
            types,
            type_map: OnceCell::new(),
        }
    }

    /// Returns the named TypeDef, if it exists.
    pub fn find_named_type(&self, name: &str) -> Option<&TypeDef> {
        let map = self.type_map.get_or_init(|| {
            self.types
                .iter()
                .map(|t| (t.name.clone(), t.clone()))
                .collect()
        });
        map.get(name)
    }

    /// Resolves a TypeRef to its Atom, applying any element-relationship
    /// override. Returns None if a named reference does not exist.
    pub fn resolve(&self, tr: &TypeRef) -> Option<Atom> {
        let atom = if let Some(ref named) = tr.named_type {
            self.find_named_type(named)?.atom.clone()
        } else if tr.inlined.is_unset() {
            // An entirely empty ref resolves to nothing.
            return None;
        } else {
            (*tr.inlined).clone()
        };

        let Some(relationship) = tr.element_relationship else {
            return Some(atom);
        };

        if let Some(mut map) = atom.map {
            map.element_relationship = relationship;
            return Some(Atom {
                map: Some(map),
                ..Default::default()
            });
        }
        if let Some(mut list) = atom.list {
            list.element_relationship = relationship;
            return Some(Atom {
                list: Some(list),
                ..Default::default()
            });
        }
        // Relationship overrides are meaningless on scalars.
        None
    }
}

impl Map {
    /// Returns the declared StructField, if any.
    pub fn find_field(&self, name: &str) -> Option<&StructField> {
        let map = self.field_map.get_or_init(|| {
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.clone()))
                .collect()
        });
        map.get(name)
    }

    /// Returns true if undeclared fields have a usable element type.
    pub fn allows_unknown_fields(&self) -> bool {
        self.element_type.named_type.is_some() || !self.element_type.inlined.is_unset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_schema_yaml() {
        let schema: Schema = serde_yaml::from_str(
            r#"types:
- name: pair
  map:
    fields:
    - name: key
      type:
        scalar: string
    - name: value
      type:
        scalar: string
"#,
        )
        .unwrap();

        let def = schema.find_named_type("pair").unwrap();
        let map = def.atom.map.as_ref().unwrap();
        assert!(map.find_field("key").is_some());
        assert!(map.find_field("missing").is_none());
    }

    #[test]
    fn test_resolve_named_and_inlined() {
        let schema = Schema::with_types(vec![TypeDef {
            name: "str".to_string(),
            atom: Atom {
                scalar: Some(Scalar::String),
                ..Default::default()
            },
        }]);

        assert!(schema.resolve(&TypeRef::named("str")).is_some());
        assert!(schema.resolve(&TypeRef::named("missing")).is_none());

        let inlined = TypeRef {
            inlined: Box::new(Atom {
                scalar: Some(Scalar::Numeric),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(schema.resolve(&inlined).unwrap().scalar.is_some());
    }

    #[test]
    fn test_resolve_relationship_override() {
        let schema = Schema::with_types(vec![TypeDef {
            name: "m".to_string(),
            atom: Atom {
                map: Some(Map::default()),
                ..Default::default()
            },
        }]);

        let tr = TypeRef {
            named_type: Some("m".to_string()),
            element_relationship: Some(ElementRelationship::Atomic),
            ..Default::default()
        };
        let atom = schema.resolve(&tr).unwrap();
        assert_eq!(
            atom.map.unwrap().element_relationship,
            ElementRelationship::Atomic
        );
    }
}
