// ⚠️ Ledger Errors - one taxonomy for every operation
//
// Callers branch on `ErrorKind`, users see `user_message()`.
// Raw store text only ever reaches the logs.

use crate::ids::EntityKind;
use rusqlite::ErrorCode;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

// ============================================================================
// ERROR KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Connectivity,
    ReferenceNotFound,
    NotFound,
    Validation,
    DuplicateKey,
    Allocation,
    Persistence,
    Migration,
    Overflow,
}

// ============================================================================
// LEDGER ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Store unreachable; nothing was written
    #[error("store unreachable: {0}")]
    Connectivity(#[source] rusqlite::Error),

    /// Foreign key target missing or tombstoned
    #[error("{kind} {id} does not exist or has been deleted")]
    ReferenceNotFound { kind: EntityKind, id: String },

    /// The record asked for directly does not exist
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: String },

    /// Malformed input; every problem found is listed
    #[error("invalid input: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("{field} '{value}' is already registered")]
    DuplicateKey { field: &'static str, value: String },

    #[error("could not allocate {kind} identifier: {reason}")]
    Allocation { kind: EntityKind, reason: String },

    /// Transaction failed mid-write and was rolled back
    #[error("transaction failed: {0}")]
    Persistence(#[source] rusqlite::Error),

    /// A running total no longer fits in the amount type
    #[error("{what} overflowed")]
    Overflow { what: &'static str },

    #[error("schema migration '{step}' failed: {source}")]
    Migration {
        step: &'static str,
        #[source]
        source: rusqlite::Error,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Connectivity(_) => ErrorKind::Connectivity,
            LedgerError::ReferenceNotFound { .. } => ErrorKind::ReferenceNotFound,
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            LedgerError::Allocation { .. } => ErrorKind::Allocation,
            LedgerError::Persistence(_) => ErrorKind::Persistence,
            LedgerError::Migration { .. } => ErrorKind::Migration,
            LedgerError::Overflow { .. } => ErrorKind::Overflow,
        }
    }

    /// Message safe to show an end user.
    ///
    /// Built from the kind and the caller-supplied values only. Validation
    /// messages are our own text, so they are passed through.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::Connectivity(_) => {
                "Database connection failed. Please try again later.".to_string()
            }
            LedgerError::ReferenceNotFound { kind, id } => {
                format!("The selected {} ({}) is no longer available.", kind.label(), id)
            }
            LedgerError::NotFound { kind, id } => {
                format!("No {} found with ID {}.", kind.label(), id)
            }
            LedgerError::Validation(messages) => messages.join("\n"),
            LedgerError::DuplicateKey { field, .. } => {
                format!("This {} is already registered.", field)
            }
            LedgerError::Allocation { .. } => {
                "Could not generate a new record ID. Nothing was saved.".to_string()
            }
            LedgerError::Persistence(_) => {
                "The change could not be saved. Nothing was changed.".to_string()
            }
            LedgerError::Migration { .. } => {
                "The database needs maintenance before it can be used.".to_string()
            }
            LedgerError::Overflow { .. } => {
                "Totals are too large to compute. Check the fine amounts on record.".to_string()
            }
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation(vec![message.into()])
    }

    /// Map an error raised inside an open write transaction.
    ///
    /// Unreachable-store codes still report as connectivity; anything else
    /// happened mid-write and is a persistence failure.
    pub(crate) fn from_write(err: rusqlite::Error) -> Self {
        if is_connectivity(&err) {
            LedgerError::Connectivity(err)
        } else {
            LedgerError::Persistence(err)
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::from_write(err)
    }
}

/// True for codes that mean the store cannot be reached or locked in time.
pub(crate) fn is_connectivity(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::SystemIoFailure
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::PermissionDenied
                | ErrorCode::ReadOnly
        )
    )
}

/// True when the error is a UNIQUE/PRIMARY KEY constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_store_text() {
        let err = LedgerError::Persistence(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            Some("FOREIGN KEY constraint failed on payments".to_string()),
        ));

        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(!err.user_message().contains("payments"));
        assert!(err.to_string().contains("transaction failed"));
    }

    #[test]
    fn test_validation_message_lists_everything() {
        let err = LedgerError::Validation(vec![
            "Payer name is required".to_string(),
            "Contact number must start with '09'".to_string(),
        ]);

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(
            err.user_message(),
            "Payer name is required\nContact number must start with '09'"
        );
    }

    #[test]
    fn test_busy_is_connectivity() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(is_connectivity(&busy));
        assert_eq!(LedgerError::from(busy).kind(), ErrorKind::Connectivity);
    }
}
