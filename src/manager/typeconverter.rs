//! Converters between unstructured objects and typed values.

use crate::error::Error;
use crate::object::Object;
use crate::typed::{deduced_parseable_type, ParseableType, Parser, TypedValue};

/// TypeConverter moves objects in and out of the typed world. The typed
/// side is where field sets, diffs, and merges are computed.
pub trait TypeConverter: Send + Sync {
    fn object_to_typed(&self, object: &Object) -> Result<TypedValue, Error>;
    fn typed_to_object(&self, typed: &TypedValue) -> Result<Object, Error>;
}

/// SchemaTypeConverter resolves an object's type by its kind in a parsed
/// schema.
pub struct SchemaTypeConverter {
    parser: Parser,
    preserve_unknown_fields: bool,
}

impl SchemaTypeConverter {
    pub fn new(schema_yaml: &str, preserve_unknown_fields: bool) -> Result<Self, Error> {
        let parser = Parser::new(schema_yaml)
            .map_err(|e| Error::Internal(format!("failed to parse schema: {}", e)))?;
        Ok(SchemaTypeConverter {
            parser,
            preserve_unknown_fields,
        })
    }

    fn type_for(&self, object: &Object) -> Result<ParseableType, Error> {
        let kind = object.kind();
        if kind.is_empty() {
            return Err(Error::Conversion("object has no kind".to_string()));
        }
        let pt = self.parser.type_by_name(kind);
        if !pt.is_valid() {
            return Err(Error::Conversion(format!(
                "no corresponding type for kind {:?}",
                kind
            )));
        }
        Ok(pt)
    }
}

impl TypeConverter for SchemaTypeConverter {
    fn object_to_typed(&self, object: &Object) -> Result<TypedValue, Error> {
        let pt = self.type_for(object)?;
        let result = if self.preserve_unknown_fields {
            pt.from_value_allow_unknown(object.value().clone())
        } else {
            pt.from_value(object.value().clone())
        };
        result.map_err(|e| Error::Conversion(format!("failed to create typed object: {}", e)))
    }

    fn typed_to_object(&self, typed: &TypedValue) -> Result<Object, Error> {
        Ok(Object::new(typed.value().clone()))
    }
}

/// DeducedTypeConverter types objects structurally, with no schema at all.
/// Maps merge granularly, lists and scalars are opaque leaves.
#[derive(Default)]
pub struct DeducedTypeConverter;

impl TypeConverter for DeducedTypeConverter {
    fn object_to_typed(&self, object: &Object) -> Result<TypedValue, Error> {
        deduced_parseable_type()
            .from_value(object.value().clone())
            .map_err(|e| Error::Conversion(format!("failed to create typed object: {}", e)))
    }

    fn typed_to_object(&self, typed: &TypedValue) -> Result<Object, Error> {
        Ok(Object::new(typed.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;

    const POD_SCHEMA: &str = r#"types:
- name: Pod
  map:
    fields:
    - name: apiVersion
      type:
        scalar: string
    - name: kind
      type:
        scalar: string
    - name: metadata
      type:
        namedType: __untyped_deduced_
    - name: spec
      type:
        map:
          fields:
          - name: replicas
            type:
              scalar: numeric
- name: __untyped_deduced_
  scalar: untyped
  list:
    elementType:
      namedType: __untyped_deduced_
    elementRelationship: atomic
  map:
    elementType:
      namedType: __untyped_deduced_
    elementRelationship: separable
"#;

    #[test]
    fn test_schema_converter_resolves_by_kind() {
        let tc = SchemaTypeConverter::new(POD_SCHEMA, false).unwrap();
        let obj = Object::from_yaml(
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec:\n  replicas: 3\n",
        )
        .unwrap();

        let typed = tc.object_to_typed(&obj).unwrap();
        let set = typed.to_field_set().unwrap();
        assert!(set.has(&Path::make(["spec", "replicas"])));
    }

    #[test]
    fn test_schema_converter_unknown_kind() {
        let tc = SchemaTypeConverter::new(POD_SCHEMA, false).unwrap();
        let obj = Object::from_yaml("apiVersion: v1\nkind: Mystery\n").unwrap();
        assert!(matches!(
            tc.object_to_typed(&obj),
            Err(Error::Conversion(_))
        ));
    }

    #[test]
    fn test_schema_converter_unknown_field() {
        let tc = SchemaTypeConverter::new(POD_SCHEMA, false).unwrap();
        let obj =
            Object::from_yaml("apiVersion: v1\nkind: Pod\nspec:\n  surprise: 1\n").unwrap();
        assert!(tc.object_to_typed(&obj).is_err());

        let lenient = SchemaTypeConverter::new(POD_SCHEMA, true).unwrap();
        assert!(lenient.object_to_typed(&obj).is_ok());
    }

    #[test]
    fn test_deduced_converter_accepts_anything() {
        let tc = DeducedTypeConverter;
        let obj = Object::from_yaml("whatever:\n  nested: [1, 2]\n").unwrap();
        let typed = tc.object_to_typed(&obj).unwrap();
        assert!(typed.to_field_set().unwrap().has(&Path::make(["whatever", "nested"])));
    }
}
