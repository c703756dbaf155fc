//! The field manager orchestrator and its converter seams.

mod fieldmanager;
mod typeconverter;
mod versionconverter;


pub use fieldmanager::*;
pub use typeconverter::*;
pub use versionconverter::*;
