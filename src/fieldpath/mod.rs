//! Field path representation and the per-manager ownership model.

mod path;
mod serialize;
mod set;

pub use path::*;
pub use serialize::*;
pub use set::*;

use std::collections::HashMap;
use std::fmt;

/// APIVersion is the version string a field set was recorded against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct APIVersion(String);

impl APIVersion {
    pub fn new(version: impl Into<String>) -> Self {
        APIVersion(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for APIVersion {
    fn from(s: &str) -> Self {
        APIVersion(s.to_string())
    }
}

impl fmt::Display for APIVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// VersionedSet pairs a field set with the API version it was computed
/// against and whether it came from an apply operation. Transformations
/// produce new instances; an existing VersionedSet is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedSet {
    set: Set,
    api_version: APIVersion,
    applied: bool,
}

impl VersionedSet {
    pub fn new(set: Set, api_version: APIVersion, applied: bool) -> Self {
        VersionedSet {
            set,
            api_version,
            applied,
        }
    }

    pub fn set(&self) -> &Set {
        &self.set
    }

    pub fn api_version(&self) -> &APIVersion {
        &self.api_version
    }

    pub fn applied(&self) -> bool {
        self.applied
    }
}

/// ManagedFields maps manager identities to the field sets they own.
#[derive(Debug, Clone, Default)]
pub struct ManagedFields {
    managers: HashMap<String, VersionedSet>,
}

impl ManagedFields {
    pub fn new() -> Self {
        ManagedFields {
            managers: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn get(&self, manager: &str) -> Option<&VersionedSet> {
        self.managers.get(manager)
    }

    pub fn insert(&mut self, manager: impl Into<String>, vs: VersionedSet) {
        self.managers.insert(manager.into(), vs);
    }

    pub fn remove(&mut self, manager: &str) -> Option<VersionedSet> {
        self.managers.remove(manager)
    }

    pub fn contains(&self, manager: &str) -> bool {
        self.managers.contains_key(manager)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VersionedSet)> {
        self.managers.iter()
    }

    /// Drops every manager whose set has become empty.
    pub fn remove_empty(&mut self) {
        self.managers.retain(|_, vs| !vs.set().is_empty());
    }

    pub fn equals(&self, other: &ManagedFields) -> bool {
        if self.managers.len() != other.managers.len() {
            return false;
        }
        self.managers.iter().all(|(manager, left)| {
            other
                .managers
                .get(manager)
                .map(|right| left == right)
                .unwrap_or(false)
        })
    }
}

impl PartialEq for ManagedFields {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Eq for ManagedFields {}

impl fmt::Display for ManagedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.managers.keys().collect();
        names.sort();
        for manager in names {
            let vs = &self.managers[manager];
            writeln!(f, "{}:", manager)?;
            writeln!(f, "- Applied: {}", vs.applied())?;
            writeln!(f, "- APIVersion: {}", vs.api_version())?;
            writeln!(f, "- Set:")?;
            vs.set().iterate(|path| {
                let _ = writeln!(f, "  {}", path);
            });
        }
        Ok(())
    }
}
