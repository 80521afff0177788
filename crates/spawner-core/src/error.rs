//! Core domain errors.

use thiserror::Error;

/// Why a [`Context`](crate::Context) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The context was cancelled explicitly.
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors returned by [`Spawner`](crate::Spawner) operations.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Malformed request payload or world details. Never retried.
    #[error("decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    /// The backend refused the run request.
    #[error("run rejected: {0}")]
    Rejected(String),

    /// A status query failed while waiting for the unit to run.
    #[error("query unit status: {0}")]
    Query(String),

    /// The caller's context ended before the operation completed.
    #[error(transparent)]
    Cancelled(#[from] ContextError),

    /// Expected network metadata was absent or unusable.
    #[error("resolve attachment: {0}")]
    Attachment(String),

    /// Any other backend failure (stop, list, describe, resolve).
    #[error("backend: {0}")]
    Backend(String),

    /// Serialization of a world failed.
    #[error("encode {0}")]
    Encode(String),

    /// I/O failure at the caller boundary.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Build a decode error from any displayable cause.
    pub fn decode(what: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            what,
            reason: reason.to_string(),
        }
    }

    /// Returns true when the caller gave up, as opposed to the system failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}
