//! Error taxonomy shared by every component.
//!
//! Per-file problems ([`WardenError::Parse`], and scorer failures inside the
//! gate) are isolated by their callers; everything else aborts the single
//! operation that raised it.

use rusqlite::ErrorCode;

/// Top-level error enum for the warden library.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// A path was queried that the index does not know about.
    #[error("not indexed: {subject}")]
    NotFound { subject: String },

    /// A single file could not be parsed. Recoverable: the scan keeps going.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    /// Memory store or index persistence failed. No partial write is visible.
    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    /// An operation exceeded its bound. Safe to retry.
    #[error("timed out during {operation} on {subject}")]
    Timeout { operation: String, subject: String },

    /// A risk signal computation failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// Bad arguments from the caller (empty key, path outside the root, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A scan was cancelled between file units; the index is unchanged.
    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound {
            subject: subject.into(),
        }
    }

    pub fn storage(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn timeout(operation: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
            subject: subject.into(),
        }
    }

    /// `true` for errors that a retry may clear.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<rusqlite::Error> for WardenError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                Self::timeout("memory store", "database lock")
            }
            _ => Self::storage("memory store", err),
        }
    }
}

impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        Self::storage("serialization", err)
    }
}

pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_sqlite_error_maps_to_timeout() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let mapped = WardenError::from(err);
        assert!(matches!(mapped, WardenError::Timeout { .. }));
        assert!(mapped.is_retryable());
    }

    #[test]
    fn other_sqlite_errors_map_to_storage() {
        let mapped = WardenError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(mapped, WardenError::Storage { .. }));
        assert!(!mapped.is_retryable());
    }

    #[test]
    fn messages_carry_subject() {
        let err = WardenError::not_found("src/lib.rs");
        assert_eq!(err.to_string(), "not indexed: src/lib.rs");
    }
}
