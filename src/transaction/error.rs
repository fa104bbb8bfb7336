//! Transaction error types.

use thiserror::Error;

use crate::storage::StorageError;

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Failures of the transaction table and of commits.
#[derive(Debug, Error)]
pub enum TransactionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// No open transaction has this id (never existed, committed or aborted).
    #[error("transaction not found: {0}")]
    NotFound(String),

    /// The branch moved after the transaction captured its base.
    ///
    /// The transaction stays open; abort it and start over from the new head.
    #[error("transaction {tx_id} conflicts: branch {branch} has moved since it began")]
    Conflict { tx_id: String, branch: String },
}

impl TransactionError {
    /// A conflicting commit can be retried in a fresh transaction.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransactionError::Conflict { .. } => true,
            TransactionError::Storage(e) => e.is_retriable(),
            TransactionError::NotFound(_) => false,
        }
    }

    /// Check if this error means something the caller named does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            TransactionError::NotFound(_) => true,
            TransactionError::Storage(e) => e.is_not_found(),
            TransactionError::Conflict { .. } => false,
        }
    }
}
