//! FieldManager: the entry point that ties decoding, merging, stripping,
//! and encoding together for update and apply requests.

use super::typeconverter::{DeducedTypeConverter, SchemaTypeConverter, TypeConverter};
use super::versionconverter::{ObjectConverter, ObjectDefaulter, VersionConverter};
use crate::error::{Error, Result};
use crate::fieldpath::{APIVersion, ManagedFields, Path, Set, VersionedSet};
use crate::managedfields::{
    build_manager_identifier, decode_managed_fields, encode_managed_fields, ConflictError,
    ManagedFieldsEntry, Operation,
};
use crate::merge::{ApplyError, Updater};
use crate::object::Object;
use chrono::Utc;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::{error, warn};

/// Bookkeeping paths that are server-owned and never tracked for any
/// manager.
static STRIP_SET: Lazy<Set> = Lazy::new(|| {
    let mut set = Set::new();
    set.insert(&Path::make(["apiVersion"]));
    set.insert(&Path::make(["kind"]));
    set.insert(&Path::make(["metadata"]));
    set.insert(&Path::make(["metadata", "name"]));
    set.insert(&Path::make(["metadata", "namespace"]));
    set.insert(&Path::make(["metadata", "creationTimestamp"]));
    set.insert(&Path::make(["metadata", "selfLink"]));
    set.insert(&Path::make(["metadata", "uid"]));
    set.insert(&Path::make(["metadata", "clusterName"]));
    set.insert(&Path::make(["metadata", "generation"]));
    set.insert(&Path::make(["metadata", "managedFields"]));
    set.insert(&Path::make(["metadata", "resourceVersion"]));
    set
});

/// Removes the bookkeeping paths from the given manager's entry, deleting
/// the entry entirely when nothing else remains.
pub fn strip_fields(managed: &mut ManagedFields, manager: &str) {
    let stripped = managed.get(manager).map(|vs| {
        (
            vs.set().difference(&STRIP_SET),
            vs.api_version().clone(),
            vs.applied(),
        )
    });
    if let Some((set, version, applied)) = stripped {
        if set.is_empty() {
            managed.remove(manager);
        } else {
            managed.insert(manager.to_string(), VersionedSet::new(set, version, applied));
        }
    }
}

/// FieldManager tracks per-manager field ownership across update and
/// apply requests. Configuration is fixed at construction; every method
/// takes `&self`, so one instance can serve concurrent requests.
pub struct FieldManager {
    type_converter: Arc<dyn TypeConverter>,
    object_converter: Arc<dyn ObjectConverter>,
    object_defaulter: Arc<dyn ObjectDefaulter>,
    group_version: APIVersion,
    hub_version: APIVersion,
    updater: Updater,
}

impl FieldManager {
    /// Creates a schema-backed FieldManager. Fails when the schema does
    /// not parse.
    pub fn new(
        schema_yaml: &str,
        object_converter: Arc<dyn ObjectConverter>,
        object_defaulter: Arc<dyn ObjectDefaulter>,
        group_version: APIVersion,
        hub_version: APIVersion,
    ) -> Result<Self> {
        let type_converter = Arc::new(SchemaTypeConverter::new(schema_yaml, false)?);
        Ok(Self::with_type_converter(
            type_converter,
            object_converter,
            object_defaulter,
            group_version,
            hub_version,
        ))
    }

    /// Creates a FieldManager for custom resources: deduced typing when no
    /// schema is available, otherwise schema-backed with an optional
    /// preserve-unknown-fields mode.
    pub fn new_for_crd(
        schema_yaml: Option<&str>,
        object_converter: Arc<dyn ObjectConverter>,
        object_defaulter: Arc<dyn ObjectDefaulter>,
        group_version: APIVersion,
        hub_version: APIVersion,
        preserve_unknown_fields: bool,
    ) -> Result<Self> {
        let type_converter: Arc<dyn TypeConverter> = match schema_yaml {
            Some(schema) => Arc::new(SchemaTypeConverter::new(schema, preserve_unknown_fields)?),
            None => Arc::new(DeducedTypeConverter),
        };
        Ok(Self::with_type_converter(
            type_converter,
            object_converter,
            object_defaulter,
            group_version,
            hub_version,
        ))
    }

    fn with_type_converter(
        type_converter: Arc<dyn TypeConverter>,
        object_converter: Arc<dyn ObjectConverter>,
        object_defaulter: Arc<dyn ObjectDefaulter>,
        group_version: APIVersion,
        hub_version: APIVersion,
    ) -> Self {
        let updater = Updater::new(Box::new(VersionConverter::new(
            Arc::clone(&type_converter),
            Arc::clone(&object_converter),
        )));
        FieldManager {
            type_converter,
            object_converter,
            object_defaulter,
            group_version,
            hub_version,
            updater,
        }
    }

    fn to_versioned(&self, object: &Object) -> std::result::Result<Object, crate::merge::ConversionError> {
        self.object_converter
            .convert_to_version(object, &self.group_version)
    }

    fn to_unversioned(&self, object: &Object) -> std::result::Result<Object, crate::merge::ConversionError> {
        self.object_converter
            .convert_to_version(object, &self.hub_version)
    }

    fn identity_for(&self, manager: &str, operation: Operation) -> Result<String> {
        build_manager_identifier(&ManagedFieldsEntry {
            manager: manager.to_string(),
            operation,
            api_version: self.group_version.as_str().to_string(),
            ..Default::default()
        })
    }

    /// Update records the ownership changes of an already-merged write and
    /// re-encodes the ledger onto the new object. Writes to objects the
    /// field manager cannot handle pass through untouched; only a broken
    /// ledger on the live object is a hard error.
    pub fn update(&self, live: &Object, new: &Object, manager: &str) -> Result<Object> {
        // No metadata accessor, nowhere to record anything.
        if new.accessor().is_none() {
            return Ok(new.clone());
        }

        // The new object's ledger wins so clients can edit managed fields
        // directly; an empty or broken one falls back to the live object.
        let mut managed = match decode_managed_fields(new) {
            Ok(m) if !m.fields.is_empty() => m,
            _ => decode_managed_fields(live)?,
        };

        let now = Utc::now();

        let mut new_versioned = match self.to_versioned(new) {
            Ok(o) => o,
            Err(e) => {
                warn!("failed to convert new object to proper version: {}", e);
                return Ok(new.clone());
            }
        };
        let mut live_versioned = match self.to_versioned(live) {
            Ok(o) => o,
            Err(e) => {
                warn!("failed to convert live object to proper version: {}", e);
                return Ok(new.clone());
            }
        };
        new_versioned.remove_managed_fields();
        live_versioned.remove_managed_fields();

        let new_typed = match self.type_converter.object_to_typed(&new_versioned) {
            Ok(t) => t,
            Err(e) => {
                error!("[SHOULD NOT HAPPEN] failed to create typed new object: {}", e);
                return Ok(new.clone());
            }
        };
        let live_typed = match self.type_converter.object_to_typed(&live_versioned) {
            Ok(t) => t,
            Err(e) => {
                error!("[SHOULD NOT HAPPEN] failed to create typed live object: {}", e);
                return Ok(new.clone());
            }
        };

        self.updater
            .update(
                &live_typed,
                &new_typed,
                &self.group_version,
                &mut managed.fields,
                manager,
            )
            .map_err(|e| Error::Internal(format!("failed to update managed fields: {}", e)))?;

        strip_fields(&mut managed.fields, manager);

        // The merge engine keys the entry by the plain manager name; fold
        // it into the full identity, merging with any previous updates
        // from the same manager.
        if let Some(vs) = managed.fields.remove(manager) {
            let identity = self.identity_for(manager, Operation::Update)?;
            managed.times.insert(identity.clone(), now);
            let entry = match managed.fields.get(&identity) {
                Some(previous) => VersionedSet::new(
                    vs.set().union(previous.set()),
                    vs.api_version().clone(),
                    vs.applied(),
                ),
                None => vs,
            };
            managed.fields.insert(identity, entry);
        }

        let mut out = new.clone();
        encode_managed_fields(&mut out, &managed)?;
        Ok(out)
    }

    /// Apply merges an applied configuration into the live object. Unlike
    /// update, every failure here is surfaced to the caller.
    pub fn apply(&self, live: &Object, patch: &[u8], manager: &str, force: bool) -> Result<Object> {
        if live.accessor().is_none() {
            return Err(Error::Internal(
                "couldn't get accessor: object has no metadata".to_string(),
            ));
        }

        let mut managed = decode_managed_fields(live)?;

        let patch_text = std::str::from_utf8(patch)
            .map_err(|e| Error::BadRequest(format!("error decoding YAML: {}", e)))?;
        let patch_obj = Object::from_yaml(patch_text)
            .map_err(|e| Error::BadRequest(format!("error decoding YAML: {}", e)))?;

        if patch_obj.managed_fields().is_some() {
            return Err(Error::BadRequest(
                "metadata.managedFields must be nil".to_string(),
            ));
        }

        if patch_obj.api_version() != self.group_version.as_str() {
            return Err(Error::BadRequest(format!(
                "Incorrect version specified in apply patch. \
                 Specified patch version: {}, expected: {}",
                patch_obj.api_version(),
                self.group_version
            )));
        }

        let mut live_versioned = self.to_versioned(live).map_err(|e| {
            Error::Conversion(format!(
                "failed to convert live object to proper version: {}",
                e
            ))
        })?;
        live_versioned.remove_managed_fields();

        let patch_typed = self.type_converter.object_to_typed(&patch_obj)?;
        let live_typed = self.type_converter.object_to_typed(&live_versioned)?;

        let identity = self.identity_for(manager, Operation::Apply)?;
        let now = Utc::now();

        let new_typed = self
            .updater
            .apply(
                &live_typed,
                &patch_typed,
                &self.group_version,
                &mut managed.fields,
                &identity,
                force,
            )
            .map_err(|e| match e {
                ApplyError::Conflicts(conflicts) => {
                    Error::Conflicts(ConflictError::new(conflicts))
                }
                ApplyError::Conversion(e) => Error::Conversion(e.to_string()),
                ApplyError::Validation(e) => {
                    Error::Internal(format!("failed to apply patch: {}", e))
                }
            })?;

        strip_fields(&mut managed.fields, &identity);
        managed.times.insert(identity, now);

        let mut new_obj = self.type_converter.typed_to_object(&new_typed)?;
        encode_managed_fields(&mut new_obj, &managed)?;

        let mut new_versioned = self.to_versioned(&new_obj).map_err(|e| {
            Error::Conversion(format!(
                "failed to convert new object to proper version: {}",
                e
            ))
        })?;
        self.object_defaulter.default_object(&mut new_versioned);

        self.to_unversioned(&new_versioned)
            .map_err(|e| Error::Conversion(format!("failed to convert to unversioned: {}", e)))
    }
}
