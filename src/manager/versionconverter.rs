//! Version conversion seams and the adapter into the merge engine.

use super::typeconverter::TypeConverter;
use crate::fieldpath::APIVersion;
use crate::merge::{ConversionError, Converter};
use crate::object::Object;
use crate::typed::TypedValue;
use std::sync::Arc;

/// ObjectConverter rewrites an object at a target API version.
pub trait ObjectConverter: Send + Sync {
    fn convert_to_version(
        &self,
        object: &Object,
        version: &APIVersion,
    ) -> Result<Object, ConversionError>;
}

/// IdentityObjectConverter serves kinds that exist in a single version:
/// any request for that version is a no-op, everything else is a missing
/// version.
pub struct IdentityObjectConverter {
    version: APIVersion,
}

impl IdentityObjectConverter {
    pub fn new(version: APIVersion) -> Self {
        IdentityObjectConverter { version }
    }
}

impl ObjectConverter for IdentityObjectConverter {
    fn convert_to_version(
        &self,
        object: &Object,
        version: &APIVersion,
    ) -> Result<Object, ConversionError> {
        if version == &self.version {
            Ok(object.clone())
        } else {
            Err(ConversionError::missing_version(version))
        }
    }
}

/// ObjectDefaulter fills in unset fields after a merge. Defaulting is
/// in-place and cannot fail.
pub trait ObjectDefaulter: Send + Sync {
    fn default_object(&self, object: &mut Object);
}

/// NoopDefaulter leaves objects as they are.
#[derive(Default)]
pub struct NoopDefaulter;

impl ObjectDefaulter for NoopDefaulter {
    fn default_object(&self, _object: &mut Object) {}
}

/// VersionConverter adapts the object-level converters into the typed
/// Converter the merge engine wants: typed to object, convert, back to
/// typed.
pub struct VersionConverter {
    type_converter: Arc<dyn TypeConverter>,
    object_converter: Arc<dyn ObjectConverter>,
}

impl VersionConverter {
    pub fn new(
        type_converter: Arc<dyn TypeConverter>,
        object_converter: Arc<dyn ObjectConverter>,
    ) -> Self {
        VersionConverter {
            type_converter,
            object_converter,
        }
    }
}

impl Converter for VersionConverter {
    fn convert(
        &self,
        obj: &TypedValue,
        version: &APIVersion,
    ) -> Result<TypedValue, ConversionError> {
        let object = self
            .type_converter
            .typed_to_object(obj)
            .map_err(|e| ConversionError::new(e.to_string()))?;
        let converted = self.object_converter.convert_to_version(&object, version)?;
        self.type_converter
            .object_to_typed(&converted)
            .map_err(|e| ConversionError::new(e.to_string()))
    }

    fn is_missing_version_error(&self, err: &ConversionError) -> bool {
        err.is_missing_version
    }
}
