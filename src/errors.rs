//! Centralized error handling.
//!
//! Provides a unified error type for the whole data-access layer. Every
//! failure propagates to the immediate caller; nothing is swallowed or
//! retried inside this crate.

use sea_orm::DbErr;
use thiserror::Error;

/// Data-access error types.
#[derive(Error, Debug)]
pub enum AccessError {
    /// Malformed request shape, rejected before any SQL is built.
    #[error("{0}")]
    Validation(String),

    /// Caller misuse: absent or empty input where a value is required.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    // Bulk execution failures, each wrapping the original cause behind a
    // fixed statement-class label.
    #[error("Bulk insert error")]
    BulkInsertFailed(#[source] ExecCause),

    #[error("Bulk update error")]
    BulkUpdateFailed(#[source] ExecCause),

    #[error("Bulk delete error")]
    BulkDeleteFailed(#[source] ExecCause),

    /// A flush touched a different number of rows than the tracked changes
    /// expected. Surfaced distinctly so callers can reload and retry.
    #[error("concurrency conflict: expected {expected} row(s), {affected} affected")]
    Concurrency { expected: u64, affected: u64 },

    #[error("database error")]
    Database(#[from] DbErr),

    #[error("a transaction is already open on this unit of work")]
    TransactionInProgress,

    /// The transaction handle was already committed, rolled back or dropped.
    #[error("transaction handle is no longer usable")]
    TransactionClosed,

    /// The owning unit of work has been disposed; cached repositories are
    /// invalid from that point on.
    #[error("unit of work has been disposed")]
    Disposed,

    #[error("internal error: {0}")]
    Internal(String),
}

/// Underlying cause of a failed bulk execution.
#[derive(Error, Debug)]
pub enum ExecCause {
    #[error(transparent)]
    Db(#[from] DbErr),

    #[error("statement timed out after {0}s")]
    Timeout(u64),

    #[error("expected {expected} generated id(s), server returned {returned}")]
    UnexpectedRowCount { expected: usize, returned: usize },

    /// A generated statement referenced a parameter it never bound, or bound
    /// one twice. Indicates a builder bug, not caller error.
    #[error("malformed generated statement: {0}")]
    MalformedStatement(String),
}

/// Result type alias
pub type AccessResult<T> = Result<T, AccessError>;

/// Convenience constructors
impl AccessError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AccessError::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        AccessError::Internal(msg.into())
    }
}
