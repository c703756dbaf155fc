//! Multi-manager merge and apply with field ownership tracking.

mod conflict;
mod updater;

pub use conflict::*;
pub use updater::*;
