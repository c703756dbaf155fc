//! Updater: the merge orchestrator that keeps the ownership ledger honest.

use super::{Conflict, Conflicts};
use crate::fieldpath::{APIVersion, ManagedFields, Set, VersionedSet};
use crate::typed::{Comparison, TypedValue, ValidationErrors};
use std::collections::HashMap;
use thiserror::Error;

/// Converter moves a TypedValue between API versions.
pub trait Converter: Send + Sync {
    fn convert(&self, obj: &TypedValue, version: &APIVersion) -> Result<TypedValue, ConversionError>;

    /// True when the error means the target version is no longer served,
    /// as opposed to a conversion failure.
    fn is_missing_version_error(&self, err: &ConversionError) -> bool;
}

/// ConversionError is a failure to move an object between versions.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConversionError {
    pub message: String,
    pub is_missing_version: bool,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        ConversionError {
            message: message.into(),
            is_missing_version: false,
        }
    }

    pub fn missing_version(version: &APIVersion) -> Self {
        ConversionError {
            message: format!("no corresponding type for {}", version),
            is_missing_version: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Conflicts(#[from] Conflicts),
    #[error("conversion failed: {0}")]
    Conversion(ConversionError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Conflicts(Conflicts),
    #[error("conversion failed: {0}")]
    Conversion(ConversionError),
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
}

impl From<ApplyError> for UpdateError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Conflicts(c) => UpdateError::Conflicts(c),
            ApplyError::Conversion(e) => UpdateError::Conversion(e),
            ApplyError::Validation(e) => UpdateError::Validation(e),
        }
    }
}

/// Updater applies changes to an object while recording who owns what in
/// the ManagedFields ledger.
pub struct Updater {
    converter: Box<dyn Converter>,
}

impl Updater {
    pub fn new(converter: Box<dyn Converter>) -> Self {
        Updater { converter }
    }

    /// Computes ownership changes from a structural diff and rewrites the
    /// ledger. Fields modified or added by the acting manager are taken
    /// from their previous owners; fields removed from the object are
    /// dropped from every entry. Returns the computed comparison.
    fn update_ledger(
        &self,
        old_object: &TypedValue,
        new_object: &TypedValue,
        version: &APIVersion,
        managers: &mut ManagedFields,
        workflow: &str,
        force: bool,
    ) -> Result<Comparison, ApplyError> {
        let compare = old_object
            .compare(new_object)
            .map_err(ApplyError::Validation)?;

        let mut conflicts = Conflicts::new();
        let mut removed_by_manager: HashMap<String, Set> = HashMap::new();
        let mut obsolete_managers: Vec<String> = Vec::new();

        // Sorted so the conflict list is deterministic.
        let mut entries: Vec<(&String, &VersionedSet)> = managers.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        for (manager, versioned_set) in entries {
            if manager == workflow {
                continue;
            }

            // Entries recorded at another version are compared at that
            // version; entries at no-longer-served versions are dropped.
            let manager_compare = if versioned_set.api_version() == version {
                compare.clone()
            } else {
                let versioned_old = match self.converter.convert(old_object, versioned_set.api_version()) {
                    Ok(v) => v,
                    Err(e) if self.converter.is_missing_version_error(&e) => {
                        obsolete_managers.push(manager.clone());
                        continue;
                    }
                    Err(e) => return Err(ApplyError::Conversion(e)),
                };
                let versioned_new = match self.converter.convert(new_object, versioned_set.api_version()) {
                    Ok(v) => v,
                    Err(e) if self.converter.is_missing_version_error(&e) => {
                        obsolete_managers.push(manager.clone());
                        continue;
                    }
                    Err(e) => return Err(ApplyError::Conversion(e)),
                };
                versioned_old
                    .compare(&versioned_new)
                    .map_err(ApplyError::Validation)?
            };

            let touched = manager_compare.modified.union(&manager_compare.added);
            let contested = versioned_set.set().intersection(&touched);
            contested.iterate(|path| {
                conflicts.add(Conflict::new(manager.clone(), path.clone()));
            });

            if !manager_compare.removed.is_empty() {
                removed_by_manager.insert(manager.clone(), manager_compare.removed.clone());
            }
        }

        if !force && !conflicts.is_empty() {
            return Err(ApplyError::Conflicts(conflicts));
        }

        for manager in obsolete_managers {
            managers.remove(&manager);
        }

        let contested_paths = conflicts.to_set();
        for conflict in conflicts.iter() {
            if let Some(vs) = managers.get(&conflict.manager) {
                let new_vs = VersionedSet::new(
                    vs.set().difference(&contested_paths),
                    vs.api_version().clone(),
                    vs.applied(),
                );
                managers.insert(conflict.manager.clone(), new_vs);
            }
        }

        for (manager, removed) in removed_by_manager {
            if let Some(vs) = managers.get(&manager) {
                let new_vs = VersionedSet::new(
                    vs.set().difference(&removed),
                    vs.api_version().clone(),
                    vs.applied(),
                );
                managers.insert(manager, new_vs);
            }
        }

        managers.remove_empty();

        Ok(compare)
    }

    /// Update records an unconstrained write. The acting manager gains the
    /// fields it changed and loses the fields it removed; updates never
    /// conflict, ownership simply moves.
    pub fn update(
        &self,
        live_object: &TypedValue,
        new_object: &TypedValue,
        version: &APIVersion,
        managers: &mut ManagedFields,
        manager: &str,
    ) -> Result<TypedValue, UpdateError> {
        let compare = self
            .update_ledger(live_object, new_object, version, managers, manager, true)
            .map_err(UpdateError::from)?;

        let current_set = managers
            .get(manager)
            .map(|vs| vs.set().clone())
            .unwrap_or_default();

        let new_set = current_set
            .difference(&compare.removed)
            .union(&compare.modified)
            .union(&compare.added);

        if new_set.is_empty() {
            managers.remove(manager);
        } else {
            managers.insert(
                manager.to_string(),
                VersionedSet::new(new_set, version.clone(), false),
            );
        }

        Ok(new_object.clone())
    }

    /// Apply merges a patch into the live object. The acting identity ends
    /// up owning exactly the patch's field set; fields it used to own but
    /// no longer sets are pruned from the object unless another manager
    /// owns them. Contested fields owned by other managers fail the call
    /// unless `force` is set, and a failed call leaves the ledger as it
    /// was.
    pub fn apply(
        &self,
        live_object: &TypedValue,
        patch_object: &TypedValue,
        version: &APIVersion,
        managers: &mut ManagedFields,
        manager: &str,
        force: bool,
    ) -> Result<TypedValue, ApplyError> {
        let new_object = live_object
            .merge(patch_object)
            .map_err(ApplyError::Validation)?;

        let patch_set = patch_object
            .to_field_set()
            .map_err(ApplyError::Validation)?;

        let last_entry = managers.get(manager).cloned();

        // A previous entry at a version that can no longer be served gives
        // us nothing to prune against.
        let last_version_obsolete = match last_entry {
            Some(ref last) if last.api_version() != version => {
                match self.converter.convert(live_object, last.api_version()) {
                    Ok(_) => false,
                    Err(e) => self.converter.is_missing_version_error(&e),
                }
            }
            _ => false,
        };

        managers.insert(
            manager.to_string(),
            VersionedSet::new(patch_set.clone(), version.clone(), true),
        );

        let pruned_object = match last_entry {
            Some(ref last) if !last_version_obsolete && !last.set().is_empty() => {
                let dropped = last.set().difference(&patch_set);
                let mut to_remove = Set::new();
                dropped.iterate(|path| {
                    let owned_elsewhere = managers
                        .iter()
                        .any(|(other, vs)| other != manager && vs.set().has(path));
                    if !owned_elsewhere {
                        to_remove.insert(path);
                    }
                });
                if to_remove.is_empty() {
                    new_object
                } else {
                    new_object.remove_items(&to_remove)
                }
            }
            _ => new_object,
        };

        let result = self.update_ledger(
            live_object,
            &pruned_object,
            version,
            managers,
            manager,
            force,
        );

        if let Err(err) = result {
            // Roll the acting identity's entry back to its pre-call state.
            match last_entry {
                Some(last) => managers.insert(manager.to_string(), last),
                None => {
                    managers.remove(manager);
                }
            }
            return Err(err);
        }

        Ok(pruned_object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fieldpath::Path;
    use crate::typed::deduced_parseable_type;
    use crate::value::from_yaml;

    /// Treats every version as served and identical.
    struct SameVersionConverter;

    impl Converter for SameVersionConverter {
        fn convert(
            &self,
            obj: &TypedValue,
            _version: &APIVersion,
        ) -> Result<TypedValue, ConversionError> {
            Ok(obj.clone())
        }

        fn is_missing_version_error(&self, err: &ConversionError) -> bool {
            err.is_missing_version
        }
    }

    fn updater() -> Updater {
        Updater::new(Box::new(SameVersionConverter))
    }

    fn typed(yaml: &str) -> TypedValue {
        deduced_parseable_type()
            .from_value(from_yaml(yaml).unwrap())
            .unwrap()
    }

    fn v1() -> APIVersion {
        APIVersion::new("v1")
    }

    #[test]
    fn test_disjoint_applies_coexist() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();
        up.apply(&live, &typed("b: 2\n"), &v1(), &mut managers, "bob", false)
            .unwrap();

        assert!(managers.get("alice").unwrap().set().has(&Path::make(["a"])));
        assert!(managers.get("bob").unwrap().set().has(&Path::make(["b"])));
    }

    #[test]
    fn test_apply_conflict_and_force() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();

        let err = up
            .apply(&live, &typed("a: 2\n"), &v1(), &mut managers, "bob", false)
            .unwrap_err();
        match err {
            ApplyError::Conflicts(conflicts) => {
                assert_eq!(conflicts.len(), 1);
                assert_eq!(conflicts.iter().next().unwrap().manager, "alice");
            }
            other => panic!("expected conflicts, got {}", other),
        }
        // A failed apply must not leave an entry for the caller.
        assert!(!managers.contains("bob"));

        // Forcing transfers ownership.
        up.apply(&live, &typed("a: 2\n"), &v1(), &mut managers, "bob", true)
            .unwrap();
        assert!(managers.get("bob").unwrap().set().has(&Path::make(["a"])));
        assert!(!managers.contains("alice"));
    }

    #[test]
    fn test_apply_prunes_dropped_fields() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(
                &live,
                &typed("a: 1\nb: 2\n"),
                &v1(),
                &mut managers,
                "alice",
                false,
            )
            .unwrap();

        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();

        let m = live.value().as_map().unwrap();
        assert!(m.has("a"));
        assert!(!m.has("b"));
    }

    #[test]
    fn test_apply_keeps_fields_owned_elsewhere() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(
                &live,
                &typed("a: 1\nb: 2\n"),
                &v1(),
                &mut managers,
                "alice",
                false,
            )
            .unwrap();
        let live = up
            .apply(&live, &typed("b: 2\n"), &v1(), &mut managers, "bob", true)
            .unwrap();

        // Alice drops b, but bob still owns it.
        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();
        assert!(live.value().as_map().unwrap().has("b"));
    }

    #[test]
    fn test_update_moves_ownership() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();

        let live = up
            .update(&live, &typed("a: 2\n"), &v1(), &mut managers, "writer")
            .unwrap();

        assert!(managers.get("writer").unwrap().set().has(&Path::make(["a"])));
        assert!(!managers.contains("alice"));
        assert_eq!(
            live.value().as_map().unwrap().get("a"),
            Some(&crate::value::Value::Int(2))
        );
    }

    #[test]
    fn test_update_accumulates() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("a: 1\n");
        let live = up
            .update(&live, &typed("a: 1\nb: 2\n"), &v1(), &mut managers, "writer")
            .unwrap();
        up.update(
            &live,
            &typed("a: 1\nb: 2\nc: 3\n"),
            &v1(),
            &mut managers,
            "writer",
        )
        .unwrap();

        let set = managers.get("writer").unwrap().set();
        assert!(set.has(&Path::make(["b"])));
        assert!(set.has(&Path::make(["c"])));
        assert!(!set.has(&Path::make(["a"])));
    }

    #[test]
    fn test_apply_empty_patch_removes_entry() {
        let up = updater();
        let mut managers = ManagedFields::new();

        let live = typed("{}");
        let live = up
            .apply(&live, &typed("a: 1\n"), &v1(), &mut managers, "alice", false)
            .unwrap();

        up.apply(&live, &typed("{}"), &v1(), &mut managers, "alice", false)
            .unwrap();
        assert!(!managers.contains("alice"));
    }

    /// Converter that declares every version other than v1 unserved.
    struct OnlyV1Converter;

    impl Converter for OnlyV1Converter {
        fn convert(
            &self,
            obj: &TypedValue,
            version: &APIVersion,
        ) -> Result<TypedValue, ConversionError> {
            if version.as_str() == "v1" {
                Ok(obj.clone())
            } else {
                Err(ConversionError::missing_version(version))
            }
        }

        fn is_missing_version_error(&self, err: &ConversionError) -> bool {
            err.is_missing_version
        }
    }

    #[test]
    fn test_obsolete_version_entries_dropped() {
        let up = Updater::new(Box::new(OnlyV1Converter));
        let mut managers = ManagedFields::new();
        let mut old_set = Set::new();
        old_set.insert(&Path::make(["a"]));
        managers.insert(
            "ancient",
            VersionedSet::new(old_set, APIVersion::new("v1alpha1"), false),
        );

        let live = typed("a: 1\n");
        up.update(&live, &typed("a: 2\n"), &v1(), &mut managers, "writer")
            .unwrap();

        assert!(!managers.contains("ancient"));
        assert!(managers.contains("writer"));
    }
}
