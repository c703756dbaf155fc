//! Schema parsing and typed-value construction.

use super::typed_value::TypedValue;
use super::validation::ValidationErrors;
use crate::schema::{Schema, TypeRef};
use crate::value::{from_yaml, Value};
use once_cell::sync::Lazy;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to parse schema: {0}")]
    Schema(#[from] serde_yaml::Error),
    #[error("failed to parse value: {0}")]
    Value(String),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

/// Parser holds a schema and hands out ParseableTypes for its named types.
#[derive(Debug, Clone)]
pub struct Parser {
    schema: Arc<Schema>,
}

impl Parser {
    pub fn new(schema_yaml: &str) -> Result<Self, ParseError> {
        let schema: Schema = serde_yaml::from_str(schema_yaml)?;
        Ok(Parser {
            schema: Arc::new(schema),
        })
    }

    pub fn from_schema(schema: Arc<Schema>) -> Self {
        Parser { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns a ParseableType for the named type. The result may be
    /// invalid if no such type exists; check with `is_valid`.
    pub fn type_by_name(&self, name: &str) -> ParseableType {
        ParseableType {
            schema: Arc::clone(&self.schema),
            type_ref: TypeRef::named(name),
        }
    }
}

/// ParseableType allows a TypeRef to be used for parsing values.
#[derive(Debug, Clone)]
pub struct ParseableType {
    schema: Arc<Schema>,
    type_ref: TypeRef,
}

impl ParseableType {
    pub fn is_valid(&self) -> bool {
        self.schema.resolve(&self.type_ref).is_some()
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    /// Builds a validated TypedValue from a Value.
    pub fn from_value(&self, value: Value) -> Result<TypedValue, ValidationErrors> {
        let tv = TypedValue::new(value, Arc::clone(&self.schema), self.type_ref.clone());
        tv.validate(false)?;
        Ok(tv)
    }

    /// Like `from_value`, but fields undeclared by struct types are kept
    /// instead of rejected.
    pub fn from_value_allow_unknown(&self, value: Value) -> Result<TypedValue, ValidationErrors> {
        let tv = TypedValue::new(value, Arc::clone(&self.schema), self.type_ref.clone());
        tv.validate(true)?;
        Ok(tv)
    }

    pub fn from_yaml(&self, yaml: &str) -> Result<TypedValue, ParseError> {
        let value = from_yaml(yaml).map_err(|e| ParseError::Value(e.to_string()))?;
        Ok(self.from_value(value)?)
    }
}

const DEDUCED_NAME: &str = "__untyped_deduced_";

// The deduced schema types every object structurally: maps merge field by
// field, lists and scalars are opaque leaves. Scalar, list, and map are all
// set at once; the branch is selected by the shape of the actual value.
static DEDUCED_SCHEMA_YAML: &str = r#"types:
- name: __untyped_atomic_
  scalar: untyped
  list:
    elementType:
      namedType: __untyped_atomic_
    elementRelationship: atomic
  map:
    elementType:
      namedType: __untyped_atomic_
    elementRelationship: atomic
- name: __untyped_deduced_
  scalar: untyped
  list:
    elementType:
      namedType: __untyped_atomic_
    elementRelationship: atomic
  map:
    elementType:
      namedType: __untyped_deduced_
    elementRelationship: separable
"#;

static DEDUCED_PARSER: Lazy<Parser> = Lazy::new(|| {
    // The embedded schema is a compile-time constant.
    match Parser::new(DEDUCED_SCHEMA_YAML) {
        Ok(parser) => parser,
        Err(e) => panic!("invalid deduced schema: {}", e),
    }
});

/// Returns the ParseableType used for objects with no declared schema.
pub fn deduced_parseable_type() -> ParseableType {
    DEDUCED_PARSER.type_by_name(DEDUCED_NAME)
}
