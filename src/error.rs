//! Crate-level error taxonomy for field-manager operations.

use crate::managedfields::ConflictError;
use thiserror::Error;

/// Error covers every way an Update or Apply request can fail. Conflicts
/// are a variant of their own so callers can branch on them without
/// downcasting.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to decode managed fields: {0}")]
    DecodeManagedFields(String),

    #[error("failed to encode managed fields: {0}")]
    EncodeManagedFields(String),

    /// The request body is at fault; the message is meant for the client.
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Conflicts(#[from] ConflictError),

    #[error("failed to convert object: {0}")]
    Conversion(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the error should surface as a client-side conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflicts(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
