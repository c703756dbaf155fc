//! Managed-fields persistence: the wire codec for ownership entries, the
//! manager identity encoding, and conflict reporting.

mod codec;
mod conflict;
mod entry;

pub use codec::*;
pub use conflict::*;
pub use entry::*;
