//! # Field Manager
//!
//! Server-side field ownership tracking for declarative apply workflows.
//!
//! Every write to a resource is attributed to a manager. Plain updates move
//! ownership silently; applies declare intent, detect conflicts with other
//! managers, and prune fields their manager stopped setting. Ownership is
//! persisted on the object itself as a `managedFields` list.
//!
//! ## Modules
//!
//! - [`value`] - In-memory representation of YAML/JSON documents
//! - [`schema`] - Type schema definition language
//! - [`fieldpath`] - Field paths, path sets, and the per-manager ledger
//! - [`typed`] - Schema-aware validation, comparison, and merging
//! - [`merge`] - The multi-manager merge engine
//! - [`object`] - Unstructured resource objects with metadata accessors
//! - [`managedfields`] - The persisted ledger codec and manager identities
//! - [`manager`] - The [`FieldManager`] orchestrator and converter seams

pub mod error;
pub mod fieldpath;
pub mod managedfields;
pub mod manager;
pub mod merge;
pub mod object;
pub mod schema;
pub mod typed;
pub mod value;

pub use error::{Error, Result};
pub use fieldpath::{APIVersion, ManagedFields, Path, PathElement, Set as FieldPathSet, VersionedSet};
pub use managedfields::{ConflictError, Managed, ManagedFieldsEntry, Operation};
pub use manager::{FieldManager, ObjectConverter, ObjectDefaulter, TypeConverter};
pub use merge::{Conflict, Conflicts, Updater};
pub use object::Object;
pub use schema::Schema;
pub use typed::{Comparison, TypedValue};
pub use value::Value;
