//! Conversion between the persisted managedFields list and the in-memory
//! ownership ledger.

use super::entry::{
    build_manager_identifier, parse_manager_identifier, ManagedFieldsEntry, Operation,
    FIELDS_TYPE_V1,
};
use crate::error::Error;
use crate::fieldpath::{APIVersion, ManagedFields, Set, VersionedSet};
use crate::object::Object;
use crate::value::Value;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Managed is the decoded ledger: per-identity field sets plus the
/// timestamps that only matter for re-encoding.
#[derive(Debug, Clone, Default)]
pub struct Managed {
    pub fields: ManagedFields,
    pub times: HashMap<String, DateTime<Utc>>,
}

impl Managed {
    pub fn new() -> Self {
        Managed::default()
    }
}

/// Decodes the object's managedFields list. An absent list is an empty
/// ledger; a malformed one is an error.
pub fn decode_managed_fields(object: &Object) -> Result<Managed, Error> {
    let Some(raw) = object.managed_fields() else {
        return Ok(Managed::new());
    };

    let Value::List(entries) = raw else {
        return Err(Error::DecodeManagedFields(
            "managedFields is not a list".to_string(),
        ));
    };

    let mut managed = Managed::new();
    for raw_entry in entries {
        let entry: ManagedFieldsEntry = serde_json::from_value(raw_entry.to_json_value())
            .map_err(|e| Error::DecodeManagedFields(format!("invalid entry: {}", e)))?;

        let identifier = build_manager_identifier(&entry)?;

        let set = match &entry.fields_v1 {
            Some(fields) => Set::from_fields_json(fields).map_err(|e| {
                Error::DecodeManagedFields(format!("invalid fieldsV1: {}", e))
            })?,
            None => Set::new(),
        };

        managed.fields.insert(
            identifier.clone(),
            VersionedSet::new(
                set,
                APIVersion::new(entry.api_version.clone()),
                entry.operation == Operation::Apply,
            ),
        );
        if let Some(time) = entry.time {
            managed.times.insert(identifier, time);
        }
    }

    Ok(managed)
}

/// Encodes the ledger back onto the object. Entries are sorted by time
/// then manager identity, so encoding is deterministic; an empty ledger
/// removes the list entirely.
pub fn encode_managed_fields(object: &mut Object, managed: &Managed) -> Result<(), Error> {
    if managed.fields.is_empty() {
        object.remove_managed_fields();
        return Ok(());
    }

    let mut entries: Vec<ManagedFieldsEntry> = Vec::with_capacity(managed.fields.len());
    for (identifier, versioned_set) in managed.fields.iter() {
        let mut entry = parse_manager_identifier(identifier).ok_or_else(|| {
            Error::EncodeManagedFields(format!("unparseable identifier: {}", identifier))
        })?;
        entry.api_version = versioned_set.api_version().as_str().to_string();
        entry.time = managed.times.get(identifier).copied();
        entry.fields_type = Some(FIELDS_TYPE_V1.to_string());
        entry.fields_v1 = Some(versioned_set.set().to_fields_json().map_err(|e| {
            Error::EncodeManagedFields(format!("invalid field set: {}", e))
        })?);
        entries.push(entry);
    }

    entries.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.manager.cmp(&b.manager)));

    let encoded = serde_json::to_value(&entries)
        .map_err(|e| Error::EncodeManagedFields(e.to_string()))?;
    if !object.set_managed_fields(Value::from_json_value(&encoded)) {
        return Err(Error::EncodeManagedFields(
            "object exposes no metadata accessor".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use chrono::TimeZone;

    fn object_with_entry(fields_v1: &str) -> Object {
        Object::from_json(&format!(
            r#"{{"apiVersion":"v1","kind":"Pod","metadata":{{"name":"p","managedFields":[
                {{"manager":"ctl","operation":"Apply","apiVersion":"v1",
                  "fieldsType":"FieldsV1","fieldsV1":{}}}]}}}}"#,
            fields_v1
        ))
        .unwrap()
    }

    #[test]
    fn test_decode_absent_is_empty() {
        let obj = Object::from_yaml("apiVersion: v1\nkind: Pod\n").unwrap();
        let managed = decode_managed_fields(&obj).unwrap();
        assert!(managed.fields.is_empty());
        assert!(managed.times.is_empty());
    }

    #[test]
    fn test_decode_entry() {
        let obj = object_with_entry(r#"{"f:spec":{"f:replicas":{}}}"#);
        let managed = decode_managed_fields(&obj).unwrap();

        assert_eq!(managed.fields.len(), 1);
        let (identifier, vs) = managed.fields.iter().next().unwrap();
        assert!(identifier.contains(r#""manager":"ctl""#));
        assert!(vs.applied());
        assert_eq!(vs.api_version().as_str(), "v1");
        assert!(vs.set().has(&Path::make(["spec", "replicas"])));
    }

    #[test]
    fn test_decode_malformed_is_error() {
        let not_a_list =
            Object::from_yaml("apiVersion: v1\nmetadata:\n  managedFields: oops\n").unwrap();
        assert!(matches!(
            decode_managed_fields(&not_a_list),
            Err(Error::DecodeManagedFields(_))
        ));

        let bad_fields = object_with_entry(r#"{"f:spec": 3}"#);
        assert!(matches!(
            decode_managed_fields(&bad_fields),
            Err(Error::DecodeManagedFields(_))
        ));
    }

    #[test]
    fn test_roundtrip() {
        let obj = object_with_entry(r#"{"f:spec":{".":{},"f:replicas":{}}}"#);
        let managed = decode_managed_fields(&obj).unwrap();

        let mut out = Object::from_yaml("apiVersion: v1\nkind: Pod\n").unwrap();
        encode_managed_fields(&mut out, &managed).unwrap();

        let managed2 = decode_managed_fields(&out).unwrap();
        assert_eq!(managed.fields, managed2.fields);
    }

    #[test]
    fn test_encode_empty_removes_list() {
        let mut obj = object_with_entry(r#"{"f:spec":{}}"#);
        encode_managed_fields(&mut obj, &Managed::new()).unwrap();
        assert!(obj.managed_fields().is_none());
    }

    #[test]
    fn test_encode_sorted_by_time_then_manager() {
        let mut managed = Managed::new();
        let mut set = Set::new();
        set.insert(&Path::make(["a"]));

        for (name, ts) in [("late", Some(20)), ("early", Some(10)), ("untimed", None)] {
            let entry = ManagedFieldsEntry {
                manager: name.to_string(),
                operation: Operation::Update,
                api_version: "v1".to_string(),
                ..Default::default()
            };
            let id = build_manager_identifier(&entry).unwrap();
            managed.fields.insert(
                id.clone(),
                VersionedSet::new(set.clone(), APIVersion::new("v1"), false),
            );
            if let Some(secs) = ts {
                managed
                    .times
                    .insert(id, Utc.timestamp_opt(secs, 0).unwrap());
            }
        }

        let mut obj = Object::from_yaml("apiVersion: v1\nkind: Pod\n").unwrap();
        encode_managed_fields(&mut obj, &managed).unwrap();

        let list = obj.managed_fields().unwrap().as_list().unwrap();
        let names: Vec<&str> = list
            .iter()
            .map(|e| e.as_map().unwrap().get("manager").unwrap().as_str().unwrap())
            .collect();
        // entries without a time sort first
        assert_eq!(names, vec!["untimed", "early", "late"]);
    }
}
