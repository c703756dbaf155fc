//! Comparison result types.

use crate::fieldpath::Set;
use std::fmt;

/// Comparison holds the result of comparing two TypedValues.
///
/// No path appears in more than one of the three sets. If all three are
/// empty the objects were equal.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    /// Paths present on the left-hand side only.
    pub removed: Set,
    /// Paths present on both sides with different values.
    pub modified: Set,
    /// Paths present on the right-hand side only.
    pub added: Set,
}

impl Comparison {
    pub fn new() -> Self {
        Comparison::default()
    }

    pub fn is_same(&self) -> bool {
        self.removed.is_empty() && self.modified.is_empty() && self.added.is_empty()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, set) in [
            ("Modified", &self.modified),
            ("Added", &self.added),
            ("Removed", &self.removed),
        ] {
            if set.is_empty() {
                continue;
            }
            writeln!(f, "- {} Fields:", label)?;
            set.iterate(|path| {
                let _ = writeln!(f, "  {}", path);
            });
        }
        Ok(())
    }
}
