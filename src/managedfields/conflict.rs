//! User-facing translation of merge conflicts.

use super::entry::parse_manager_identifier;
use crate::fieldpath::Path;
use crate::merge::Conflicts;
use std::fmt;

/// ConflictError carries the conflicts of a failed apply, rendered for
/// the client rather than in ledger-identity form.
#[derive(Debug, Clone)]
pub struct ConflictError {
    conflicts: Conflicts,
}

impl ConflictError {
    pub fn new(conflicts: Conflicts) -> Self {
        ConflictError { conflicts }
    }

    pub fn conflicts(&self) -> &Conflicts {
        &self.conflicts
    }
}

/// Renders a ledger identity for humans: `"name" using apiVersion`, or the
/// raw string when the identity is not in canonical form.
fn print_manager(identifier: &str) -> String {
    match parse_manager_identifier(identifier) {
        Some(entry) => format!("{:?} using {}", entry.manager, entry.api_version),
        None => format!("{:?}", identifier),
    }
}

impl fmt::Display for ConflictError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conflicts.len() == 1 {
            let conflict = self.conflicts.iter().next().ok_or(fmt::Error)?;
            return write!(
                f,
                "Apply failed with 1 conflict: conflict with {}: {}",
                print_manager(&conflict.manager),
                conflict.path
            );
        }

        write!(f, "Apply failed with {} conflicts:", self.conflicts.len())?;

        // Group paths by owner, first-seen order.
        let mut managers: Vec<&str> = Vec::new();
        let mut paths_by_manager: Vec<Vec<&Path>> = Vec::new();
        for conflict in self.conflicts.iter() {
            match managers.iter().position(|m| *m == conflict.manager) {
                Some(i) => paths_by_manager[i].push(&conflict.path),
                None => {
                    managers.push(&conflict.manager);
                    paths_by_manager.push(vec![&conflict.path]);
                }
            }
        }

        for (manager, paths) in managers.iter().zip(&paths_by_manager) {
            write!(f, " conflicts with {}:", print_manager(manager))?;
            for path in paths {
                write!(f, "\n- {}", path)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ConflictError {}
