//! Persisted managed-fields entry and the manager identity encoding.

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operation distinguishes ledger entries written by plain updates from
/// those written by applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    #[default]
    Update,
    Apply,
}

/// ManagedFieldsEntry is the persisted form of one manager's ownership
/// record, as it appears in the object's metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedFieldsEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manager: String,

    #[serde(default)]
    pub operation: Operation,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Always "FieldsV1" when a field set is present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields_v1: Option<serde_json::Value>,
}

pub const FIELDS_TYPE_V1: &str = "FieldsV1";

/// Builds the canonical identity string for an entry: a JSON object with
/// alphabetically sorted keys holding apiVersion, manager, and operation.
/// An empty manager name is recorded as "unknown". Identities are the keys
/// of the in-memory ledger, so equal headers must produce equal strings.
pub fn build_manager_identifier(entry: &ManagedFieldsEntry) -> Result<String, Error> {
    let manager = if entry.manager.is_empty() {
        "unknown"
    } else {
        &entry.manager
    };
    let operation = match entry.operation {
        Operation::Update => "Update",
        Operation::Apply => "Apply",
    };

    // serde_json's map keeps keys sorted, which makes the string canonical.
    let mut obj = serde_json::Map::new();
    obj.insert(
        "apiVersion".to_string(),
        serde_json::Value::String(entry.api_version.clone()),
    );
    obj.insert(
        "manager".to_string(),
        serde_json::Value::String(manager.to_string()),
    );
    obj.insert(
        "operation".to_string(),
        serde_json::Value::String(operation.to_string()),
    );

    serde_json::to_string(&serde_json::Value::Object(obj))
        .map_err(|e| Error::EncodeManagedFields(format!("failed to build identifier: {}", e)))
}

/// Parses an identity string back into an entry header. Returns None for
/// identities that are not in the canonical form.
pub fn parse_manager_identifier(identifier: &str) -> Option<ManagedFieldsEntry> {
    serde_json::from_str(identifier).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_is_canonical() {
        let entry = ManagedFieldsEntry {
            manager: "kubectl".to_string(),
            operation: Operation::Apply,
            api_version: "v1".to_string(),
            ..Default::default()
        };
        let id = build_manager_identifier(&entry).unwrap();
        assert_eq!(
            id,
            r#"{"apiVersion":"v1","manager":"kubectl","operation":"Apply"}"#
        );
    }

    #[test]
    fn test_identifier_ignores_bookkeeping() {
        let bare = ManagedFieldsEntry {
            manager: "m".to_string(),
            operation: Operation::Update,
            api_version: "v1".to_string(),
            ..Default::default()
        };
        let full = ManagedFieldsEntry {
            time: Some(Utc::now()),
            fields_type: Some(FIELDS_TYPE_V1.to_string()),
            fields_v1: Some(serde_json::json!({})),
            ..bare.clone()
        };
        assert_eq!(
            build_manager_identifier(&bare).unwrap(),
            build_manager_identifier(&full).unwrap()
        );
    }

    #[test]
    fn test_empty_manager_defaults_to_unknown() {
        let entry = ManagedFieldsEntry {
            api_version: "v1".to_string(),
            ..Default::default()
        };
        let id = build_manager_identifier(&entry).unwrap();
        assert!(id.contains(r#""manager":"unknown""#));
    }

    #[test]
    fn test_parse_roundtrip() {
        let entry = ManagedFieldsEntry {
            manager: "ctl".to_string(),
            operation: Operation::Apply,
            api_version: "apps/v1".to_string(),
            ..Default::default()
        };
        let id = build_manager_identifier(&entry).unwrap();
        let parsed = parse_manager_identifier(&id).unwrap();
        assert_eq!(parsed.manager, "ctl");
        assert_eq!(parsed.operation, Operation::Apply);
        assert_eq!(parsed.api_version, "apps/v1");
    }

    #[test]
    fn test_entry_serde_shape() {
        let entry = ManagedFieldsEntry {
            manager: "ctl".to_string(),
            operation: Operation::Apply,
            api_version: "v1".to_string(),
            time: None,
            fields_type: Some(FIELDS_TYPE_V1.to_string()),
            fields_v1: Some(serde_json::json!({"f:spec": {}})),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "manager": "ctl",
                "operation": "Apply",
                "apiVersion": "v1",
                "fieldsType": "FieldsV1",
                "fieldsV1": {"f:spec": {}},
            })
        );
    }
}
