//! Database error types.
//!
//! Every failure the facade reports classifies into one `ErrorKind`, which is
//! what a transport layer maps onto its own status codes.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::storage::{InvalidNameError, StorageError};
use crate::transaction::TransactionError;

/// Result type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Database errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("invalid name: {0}")]
    InvalidName(#[from] InvalidNameError),

    #[error("database not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// a branch, tag, commit, document or transaction does not exist
    NotFound,
    /// a branch or tag with that name already exists
    AlreadyExists,
    /// a malformed key or ref name
    InvalidKey,
    /// a branch moved underneath the caller; retry against the new head
    Conflict,
    /// both sides changed the same documents; retrying will not help
    MergeConflict,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::InvalidKey => "invalid key",
            ErrorKind::Conflict => "conflict",
            ErrorKind::MergeConflict => "merge conflict",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DatabaseError::Storage(e) => storage_kind(e),
            DatabaseError::Transaction(TransactionError::Storage(e)) => storage_kind(e),
            DatabaseError::Transaction(TransactionError::NotFound(_)) => ErrorKind::NotFound,
            DatabaseError::Transaction(TransactionError::Conflict { .. }) => ErrorKind::Conflict,
            DatabaseError::InvalidName(_) => ErrorKind::InvalidKey,
            DatabaseError::NotFound(_) => ErrorKind::NotFound,
            DatabaseError::InvalidConfig(_) => ErrorKind::Internal,
        }
    }

    /// Only a lost compare-and-swap is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// The paths named by a merge or rebase conflict.
    pub fn conflicting_paths(&self) -> Option<&[String]> {
        match self {
            DatabaseError::Storage(StorageError::MergeConflict { conflicting_paths })
            | DatabaseError::Transaction(TransactionError::Storage(StorageError::MergeConflict {
                conflicting_paths,
            })) => Some(conflicting_paths.as_slice()),
            _ => None,
        }
    }
}

fn storage_kind(e: &StorageError) -> ErrorKind {
    match e {
        StorageError::RefNotFound(_)
        | StorageError::CommitNotFound(_)
        | StorageError::TreeNotFound(_)
        | StorageError::BlobNotFound(_)
        | StorageError::DocumentNotFound { .. }
        | StorageError::NotInitialized(_) => ErrorKind::NotFound,
        StorageError::BranchAlreadyExists(_) | StorageError::TagAlreadyExists(_) => ErrorKind::AlreadyExists,
        StorageError::InvalidKey { .. } => ErrorKind::InvalidKey,
        StorageError::ConcurrentModification { .. } => ErrorKind::Conflict,
        StorageError::MergeConflict { .. } => ErrorKind::MergeConflict,
        StorageError::Git(_) => ErrorKind::Internal,
    }
}
