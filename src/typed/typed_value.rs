//! TypedValue implementation.

use super::comparison::Comparison;
use super::validation::{ValidationError, ValidationErrors};
use crate::fieldpath::{Path, PathElement, Set};
use crate::schema::{Atom, ElementRelationship, List, Map as SchemaMap, Scalar, Schema, TypeRef};
use crate::value::{Field, FieldList, Value};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Fallback atom for values whose type reference does not resolve, such
/// as undeclared struct fields kept in preserve-unknown mode. Deduced
/// semantics apply: scalars are leaves, maps separable, lists atomic.
static DEDUCED_ATOM: Lazy<Atom> = Lazy::new(|| Atom {
    scalar: Some(Scalar::Untyped),
    list: Some(List {
        element_relationship: ElementRelationship::Atomic,
        ..Default::default()
    }),
    map: Some(SchemaMap::default()),
});

/// TypedValue is a Value paired with its schema and type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    value: Value,
    type_ref: TypeRef,
    schema: Arc<Schema>,
}

/// The branch of an Atom that applies to a concrete value. Deduced types
/// declare several branches at once; the value's own shape picks one.
enum Branch<'a> {
    Scalar,
    List(&'a List),
    Map(&'a SchemaMap),
}

fn select_branch<'a>(atom: &'a Atom, value: &Value) -> Option<Branch<'a>> {
    match value {
        Value::Map(_) if atom.map.is_some() => atom.map.as_ref().map(Branch::Map),
        Value::List(_) if atom.list.is_some() => atom.list.as_ref().map(Branch::List),
        _ => {
            if atom.scalar.is_some() {
                Some(Branch::Scalar)
            } else if let Some(map) = &atom.map {
                Some(Branch::Map(map))
            } else if let Some(list) = &atom.list {
                Some(Branch::List(list))
            } else {
                None
            }
        }
    }
}

impl TypedValue {
    pub fn new(value: Value, schema: Arc<Schema>, type_ref: TypeRef) -> Self {
        TypedValue {
            value,
            type_ref,
            schema,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn into_value(self) -> Value {
        self.value
    }

    pub fn type_ref(&self) -> &TypeRef {
        &self.type_ref
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Validates the value's structure against the schema. When
    /// `allow_unknown_fields` is set, fields not declared by a struct type
    /// with no element type are tolerated instead of rejected.
    pub fn validate(&self, allow_unknown_fields: bool) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        self.validate_value(
            &self.value,
            &self.type_ref,
            Path::new(),
            allow_unknown_fields,
            &mut errors,
        );
        errors.into_result()
    }

    fn validate_value(
        &self,
        value: &Value,
        type_ref: &TypeRef,
        path: Path,
        allow_unknown: bool,
        errors: &mut ValidationErrors,
    ) {
        let Some(atom) = self.schema.resolve(type_ref) else {
            if let Some(ref name) = type_ref.named_type {
                errors.add(ValidationError::schema_error(format!(
                    "no type found matching: {}",
                    name
                )));
            }
            return;
        };

        if value.is_null() {
            return;
        }

        match select_branch(&atom, value) {
            Some(Branch::Scalar) => {
                let scalar = atom.scalar.unwrap_or(Scalar::Untyped);
                let valid = match scalar {
                    Scalar::Numeric => matches!(value, Value::Int(_) | Value::Float(_)),
                    Scalar::String => matches!(value, Value::String(_)),
                    Scalar::Boolean => matches!(value, Value::Bool(_)),
                    Scalar::Untyped => !value.is_list() && !value.is_map(),
                };
                if !valid {
                    errors.add(ValidationError::type_mismatch(
                        path.to_string(),
                        scalar_name(scalar),
                        value_type_name(value),
                    ));
                }
            }
            Some(Branch::List(list)) => {
                let Value::List(items) = value else {
                    errors.add(ValidationError::type_mismatch(
                        path.to_string(),
                        "list",
                        value_type_name(value),
                    ));
                    return;
                };
                for (i, item) in items.iter().enumerate() {
                    let pe = self.list_item_element(item, list, i);
                    self.validate_value(
                        item,
                        &list.element_type,
                        path.with(pe),
                        allow_unknown,
                        errors,
                    );
                }
            }
            Some(Branch::Map(map)) => {
                let Value::Map(fields) = value else {
                    errors.add(ValidationError::type_mismatch(
                        path.to_string(),
                        "map",
                        value_type_name(value),
                    ));
                    return;
                };
                for (key, val) in fields.iter() {
                    let field_path = path.with(PathElement::field_name(key.clone()));
                    let field_type = if let Some(field) = map.find_field(key) {
                        field.field_type.clone()
                    } else if map.allows_unknown_fields() {
                        map.element_type.clone()
                    } else {
                        if !allow_unknown {
                            errors.add(ValidationError::unknown_field(path.to_string(), key));
                        }
                        continue;
                    };
                    self.validate_value(val, &field_type, field_path, allow_unknown, errors);
                }
            }
            None => {}
        }
    }

    fn resolve_or_deduce(&self, type_ref: &TypeRef) -> Atom {
        self.schema
            .resolve(type_ref)
            .unwrap_or_else(|| DEDUCED_ATOM.clone())
    }

    fn list_item_element(&self, item: &Value, list: &List, index: usize) -> PathElement {
        if list.element_relationship == ElementRelationship::Associative {
            if list.keys.is_empty() {
                return PathElement::Value(item.clone());
            }
            if let Ok(key) = list_item_key(item, list) {
                return PathElement::Key(key);
            }
        }
        PathElement::index(index as i32)
    }

    /// Converts the typed value into the set of paths it owns: scalar
    /// leaves, atomic containers, and associative list members.
    pub fn to_field_set(&self) -> Result<Set, ValidationErrors> {
        let mut set = Set::new();
        self.collect_field_set(&self.value, &self.type_ref, Path::new(), &mut set);
        Ok(set)
    }

    fn collect_field_set(&self, value: &Value, type_ref: &TypeRef, path: Path, set: &mut Set) {
        let atom = self.resolve_or_deduce(type_ref);

        match select_branch(&atom, value) {
            Some(Branch::Scalar) | None => {
                if !path.is_empty() {
                    set.insert(&path);
                }
            }
            Some(Branch::List(list)) => {
                if list.element_relationship == ElementRelationship::Atomic {
                    if !path.is_empty() {
                        set.insert(&path);
                    }
                    return;
                }
                if let Value::List(items) = value {
                    for (i, item) in items.iter().enumerate() {
                        let pe = self.list_item_element(item, list, i);
                        let item_path = path.with(pe);
                        if list.element_relationship == ElementRelationship::Associative {
                            // list members are owned along with their contents
                            set.insert(&item_path);
                        }
                        self.collect_field_set(item, &list.element_type, item_path, set);
                    }
                }
            }
            Some(Branch::Map(map)) => {
                if map.element_relationship == ElementRelationship::Atomic {
                    if !path.is_empty() {
                        set.insert(&path);
                    }
                    return;
                }
                if let Value::Map(fields) = value {
                    for (key, val) in fields.iter() {
                        let field_path = path.with(PathElement::field_name(key.clone()));
                        let field_type = map
                            .find_field(key)
                            .map(|f| f.field_type.clone())
                            .unwrap_or_else(|| map.element_type.clone());
                        self.collect_field_set(val, &field_type, field_path, set);
                    }
                }
            }
        }
    }

    /// Compares this TypedValue with another of the same type.
    pub fn compare(&self, rhs: &TypedValue) -> Result<Comparison, ValidationErrors> {
        if !self.type_ref.same_type(&rhs.type_ref) {
            return Err(ValidationErrors::from_error(ValidationError::schema_error(
                "expected objects of the same type",
            )));
        }

        let mut comparison = Comparison::new();
        self.compare_values(
            &self.value,
            &rhs.value,
            &self.type_ref,
            Path::new(),
            &mut comparison,
        );
        Ok(comparison)
    }

    fn compare_values(
        &self,
        lhs: &Value,
        rhs: &Value,
        type_ref: &TypeRef,
        path: Path,
        comparison: &mut Comparison,
    ) {
        if lhs == rhs {
            return;
        }

        let atom = self.resolve_or_deduce(type_ref);

        match select_branch(&atom, rhs) {
            Some(Branch::Scalar) | None => {
                if !path.is_empty() {
                    comparison.modified.insert(&path);
                }
            }
            Some(Branch::List(list)) => {
                self.compare_lists(lhs, rhs, list, path, comparison)
            }
            Some(Branch::Map(map)) => self.compare_maps(lhs, rhs, map, path, comparison),
        }
    }

    fn compare_lists(
        &self,
        lhs: &Value,
        rhs: &Value,
        list: &List,
        path: Path,
        comparison: &mut Comparison,
    ) {
        if list.element_relationship == ElementRelationship::Atomic {
            comparison.modified.insert(&path);
            return;
        }

        let empty: Vec<Value> = Vec::new();
        let lhs_items = lhs.as_list().unwrap_or(&empty);
        let rhs_items = rhs.as_list().unwrap_or(&empty);

        let mut lhs_by_key = std::collections::BTreeMap::new();
        for (i, item) in lhs_items.iter().enumerate() {
            lhs_by_key.insert(self.list_item_element(item, list, i), item);
        }
        let mut rhs_by_key = std::collections::BTreeMap::new();
        for (i, item) in rhs_items.iter().enumerate() {
            rhs_by_key.insert(self.list_item_element(item, list, i), item);
        }

        for (pe, lhs_item) in &lhs_by_key {
            if !rhs_by_key.contains_key(pe) {
                let item_path = path.with(pe.clone());
                comparison.removed.insert(&item_path);
                self.collect_field_set(lhs_item, &list.element_type, item_path, &mut comparison.removed);
            }
        }
        for (pe, rhs_item) in &rhs_by_key {
            let item_path = path.with(pe.clone());
            match lhs_by_key.get(pe) {
                None => {
                    comparison.added.insert(&item_path);
                    self.collect_field_set(rhs_item, &list.element_type, item_path, &mut comparison.added);
                }
                Some(lhs_item) => self.compare_values(
                    lhs_item,
                    rhs_item,
                    &list.element_type,
                    item_path,
                    comparison,
                ),
            }
        }
    }

    fn compare_maps(
        &self,
        lhs: &Value,
        rhs: &Value,
        map: &SchemaMap,
        path: Path,
        comparison: &mut Comparison,
    ) {
        if map.element_relationship == ElementRelationship::Atomic {
            comparison.modified.insert(&path);
            return;
        }

        let empty = crate::value::Map::new();
        let lhs_fields = lhs.as_map().unwrap_or(&empty);
        let rhs_fields = rhs.as_map().unwrap_or(&empty);

        for (key, lhs_val) in lhs_fields.iter() {
            if !rhs_fields.has(key) {
                let field_type = map
                    .find_field(key)
                    .map(|f| f.field_type.clone())
                    .unwrap_or_else(|| map.element_type.clone());
                let field_path = path.with(PathElement::field_name(key.clone()));
                self.collect_field_set(lhs_val, &field_type, field_path, &mut comparison.removed);
            }
        }
        for (key, rhs_val) in rhs_fields.iter() {
            let field_path = path.with(PathElement::field_name(key.clone()));
            let field_type = map
                .find_field(key)
                .map(|f| f.field_type.clone())
                .unwrap_or_else(|| map.element_type.clone());
            match lhs_fields.get(key) {
                None => {
                    self.collect_field_set(rhs_val, &field_type, field_path, &mut comparison.added)
                }
                Some(lhs_val) => {
                    self.compare_values(lhs_val, rhs_val, &field_type, field_path, comparison)
                }
            }
        }
    }

    /// Merges another TypedValue into this one, right-hand side winning.
    /// Separable maps merge field by field, associative lists merge by
    /// element key, atomic containers and scalars are replaced whole.
    pub fn merge(&self, rhs: &TypedValue) -> Result<TypedValue, ValidationErrors> {
        if !self.type_ref.same_type(&rhs.type_ref) {
            return Err(ValidationErrors::from_error(ValidationError::schema_error(
                "expected objects of the same type",
            )));
        }

        let new_value = self.merge_values(&self.value, &rhs.value, &self.type_ref);
        Ok(TypedValue {
            value: new_value,
            type_ref: self.type_ref.clone(),
            schema: Arc::clone(&self.schema),
        })
    }

    fn merge_values(&self, lhs: &Value, rhs: &Value, type_ref: &TypeRef) -> Value {
        if rhs.is_null() {
            return lhs.clone();
        }
        if lhs.is_null() {
            return rhs.clone();
        }

        let atom = self.resolve_or_deduce(type_ref);

        match select_branch(&atom, rhs) {
            Some(Branch::Scalar) | None => rhs.clone(),
            Some(Branch::List(list)) => {
                if list.element_relationship != ElementRelationship::Associative {
                    return rhs.clone();
                }
                match (lhs, rhs) {
                    (Value::List(lhs_items), Value::List(rhs_items)) => {
                        self.merge_lists(lhs_items, rhs_items, list)
                    }
                    _ => rhs.clone(),
                }
            }
            Some(Branch::Map(map)) => {
                if map.element_relationship == ElementRelationship::Atomic {
                    return rhs.clone();
                }
                match (lhs, rhs) {
                    (Value::Map(lhs_fields), Value::Map(rhs_fields)) => {
                        self.merge_maps(lhs_fields, rhs_fields, map)
                    }
                    _ => rhs.clone(),
                }
            }
        }
    }

    fn merge_lists(&self, lhs: &[Value], rhs: &[Value], list: &List) -> Value {
        let mut order: Vec<PathElement> = Vec::new();
        let mut merged: std::collections::HashMap<PathElement, Value> =
            std::collections::HashMap::new();

        for (i, item) in lhs.iter().enumerate() {
            let pe = self.list_item_element(item, list, i);
            if !merged.contains_key(&pe) {
                order.push(pe.clone());
            }
            merged.insert(pe, item.clone());
        }
        for (i, item) in rhs.iter().enumerate() {
            let pe = self.list_item_element(item, list, i);
            match merged.remove(&pe) {
                Some(existing) => {
                    let value = self.merge_values(&existing, item, &list.element_type);
                    merged.insert(pe, value);
                }
                None => {
                    order.push(pe.clone());
                    merged.insert(pe, item.clone());
                }
            }
        }

        Value::List(
            order
                .into_iter()
                .filter_map(|pe| merged.remove(&pe))
                .collect(),
        )
    }

    fn merge_maps(
        &self,
        lhs: &crate::value::Map,
        rhs: &crate::value::Map,
        map: &SchemaMap,
    ) -> Value {
        let mut result = lhs.clone();
        for (key, rhs_val) in rhs.iter() {
            let field_type = map
                .find_field(key)
                .map(|f| f.field_type.clone())
                .unwrap_or_else(|| map.element_type.clone());
            let new_val = match lhs.get(key) {
                Some(lhs_val) => self.merge_values(lhs_val, rhs_val, &field_type),
                None => rhs_val.clone(),
            };
            result.set(key.clone(), new_val);
        }
        Value::Map(result)
    }

    /// Returns a copy of the value with the listed paths pruned.
    pub fn remove_items(&self, items: &Set) -> TypedValue {
        let new_value =
            self.remove_items_from(&self.value, &self.type_ref, items, Path::new());
        TypedValue {
            value: new_value,
            type_ref: self.type_ref.clone(),
            schema: Arc::clone(&self.schema),
        }
    }

    fn remove_items_from(
        &self,
        value: &Value,
        type_ref: &TypeRef,
        items: &Set,
        path: Path,
    ) -> Value {
        let atom = self.resolve_or_deduce(type_ref);

        match select_branch(&atom, value) {
            Some(Branch::Scalar) | None => value.clone(),
            Some(Branch::List(list)) => {
                if list.element_relationship == ElementRelationship::Atomic {
                    return value.clone();
                }
                let Value::List(items_vec) = value else {
                    return value.clone();
                };
                let mut new_items = Vec::new();
                for (i, item) in items_vec.iter().enumerate() {
                    let item_path = path.with(self.list_item_element(item, list, i));
                    if items.has(&item_path) {
                        continue;
                    }
                    new_items.push(self.remove_items_from(
                        item,
                        &list.element_type,
                        items,
                        item_path,
                    ));
                }
                Value::List(new_items)
            }
            Some(Branch::Map(map)) => {
                if map.element_relationship == ElementRelationship::Atomic {
                    return value.clone();
                }
                let Value::Map(fields) = value else {
                    return value.clone();
                };
                let mut new_map = crate::value::Map::new();
                for (key, val) in fields.iter() {
                    let field_path = path.with(PathElement::field_name(key.clone()));
                    if items.has(&field_path) {
                        continue;
                    }
                    let field_type = map
                        .find_field(key)
                        .map(|f| f.field_type.clone())
                        .unwrap_or_else(|| map.element_type.clone());
                    new_map.set(
                        key.clone(),
                        self.remove_items_from(val, &field_type, items, field_path),
                    );
                }
                Value::Map(new_map)
            }
        }
    }
}

/// Extracts the composite key of an associative-list element.
fn list_item_key(item: &Value, list: &List) -> Result<FieldList, ValidationError> {
    let map = match item {
        Value::Map(m) => m,
        _ => {
            return Err(ValidationError::schema_error(
                "expected map for associative list item",
            ))
        }
    };

    let mut fields = Vec::new();
    for key_name in &list.keys {
        match map.get(key_name) {
            Some(v) => fields.push(Field {
                name: key_name.clone(),
                value: v.clone(),
            }),
            None => {
                return Err(ValidationError::schema_error(format!(
                    "missing key field: {}",
                    key_name
                )))
            }
        }
    }
    Ok(FieldList::with_fields(fields))
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::String(_) => "string",
        Value::List(_) => "list",
        Value::Map(_) => "map",
    }
}

fn scalar_name(s: Scalar) -> &'static str {
    match s {
        Scalar::Numeric => "numeric",
        Scalar::String => "string",
        Scalar::Boolean => "boolean",
        Scalar::Untyped => "scalar",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed::deduced_parseable_type;
    use crate::value::from_yaml;

    fn deduced(yaml: &str) -> TypedValue {
        deduced_parseable_type()
            .from_value(from_yaml(yaml).unwrap())
            .unwrap()
    }

    #[test]
    fn test_to_field_set_deduced() {
        let tv = deduced("a: 1\nb:\n  c: x\n  d: [1, 2]\n");
        let set = tv.to_field_set().unwrap();

        assert!(set.has(&Path::make(["a"])));
        assert!(set.has(&Path::make(["b", "c"])));
        // lists are atomic under the deduced schema
        assert!(set.has(&Path::make(["b", "d"])));
        assert!(!set.has(&Path::make(["b"])));
    }

    #[test]
    fn test_compare_deduced() {
        let lhs = deduced("a: 1\nb:\n  c: x\n");
        let rhs = deduced("a: 2\nb:\n  d: y\n");

        let comp = lhs.compare(&rhs).unwrap();
        assert!(comp.modified.has(&Path::make(["a"])));
        assert!(comp.removed.has(&Path::make(["b", "c"])));
        assert!(comp.added.has(&Path::make(["b", "d"])));
    }

    #[test]
    fn test_compare_equal() {
        let lhs = deduced("a: 1\n");
        let rhs = deduced("a: 1\n");
        assert!(lhs.compare(&rhs).unwrap().is_same());
    }

    #[test]
    fn test_merge_deduced() {
        let lhs = deduced("a: 1\nb:\n  c: x\n");
        let rhs = deduced("b:\n  d: y\n");

        let merged = lhs.merge(&rhs).unwrap();
        let m = merged.value().as_map().unwrap();
        assert_eq!(m.get("a"), Some(&Value::Int(1)));
        let b = m.get("b").unwrap().as_map().unwrap();
        assert_eq!(b.get("c"), Some(&Value::String("x".into())));
        assert_eq!(b.get("d"), Some(&Value::String("y".into())));
    }

    #[test]
    fn test_remove_items() {
        let tv = deduced("a: 1\nb:\n  c: x\n  d: y\n");
        let mut to_remove = Set::new();
        to_remove.insert(&Path::make(["b", "c"]));

        let pruned = tv.remove_items(&to_remove);
        let m = pruned.value().as_map().unwrap();
        assert!(m.get("a").is_some());
        let b = m.get("b").unwrap().as_map().unwrap();
        assert!(!b.has("c"));
        assert!(b.has("d"));
    }

    #[test]
    fn test_associative_list_merge() {
        let schema: Arc<Schema> = Arc::new(
            serde_yaml::from_str(
                r#"types:
- name: obj
  map:
    fields:
    - name: ports
      type:
        list:
          elementType:
            map:
              elementType:
                scalar: untyped
          elementRelationship: associative
          keys: ["port"]
"#,
            )
            .unwrap(),
        );
        let tr = TypeRef::named("obj");

        let lhs = TypedValue::new(
            from_yaml("ports:\n- port: 80\n  proto: tcp\n").unwrap(),
            Arc::clone(&schema),
            tr.clone(),
        );
        let rhs = TypedValue::new(
            from_yaml("ports:\n- port: 443\n  proto: tcp\n").unwrap(),
            Arc::clone(&schema),
            tr,
        );

        let merged = lhs.merge(&rhs).unwrap();
        let ports = merged
            .value()
            .as_map()
            .unwrap()
            .get("ports")
            .unwrap()
            .as_list()
            .unwrap();
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn test_undeclared_fields_tracked_as_deduced() {
        // A struct with no element type: undeclared fields have no
        // resolvable type and fall back to deduced leaves.
        let schema: Arc<Schema> = Arc::new(
            serde_yaml::from_str(
                r#"types:
- name: obj
  map:
    fields:
    - name: known
      type:
        scalar: numeric
"#,
            )
            .unwrap(),
        );
        let tr = TypeRef::named("obj");

        let lhs = TypedValue::new(
            from_yaml("known: 1\nextra:\n  deep: x\n").unwrap(),
            Arc::clone(&schema),
            tr.clone(),
        );
        let set = lhs.to_field_set().unwrap();
        assert!(set.has(&Path::make(["known"])));
        assert!(set.has(&Path::make(["extra", "deep"])));

        let rhs = TypedValue::new(
            from_yaml("known: 1\nextra:\n  deep: y\n").unwrap(),
            Arc::clone(&schema),
            tr,
        );
        let comp = lhs.compare(&rhs).unwrap();
        assert!(comp.modified.has(&Path::make(["extra", "deep"])));

        let mut to_remove = Set::new();
        to_remove.insert(&Path::make(["extra", "deep"]));
        let pruned = lhs.remove_items(&to_remove);
        let extra = pruned
            .value()
            .as_map()
            .unwrap()
            .get("extra")
            .unwrap()
            .as_map()
            .unwrap();
        assert!(!extra.has("deep"));
    }
}
