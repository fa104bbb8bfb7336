//! Storage layer error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the object store, refs, trees and merges.
#[derive(Debug, Error)]
pub enum StorageError {
    /// libgit2 failure not covered by another variant
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// a branch, tag or commit reference could not be resolved
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// the requested commit was not found
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// the requested tree was not found
    #[error("tree not found: {0}")]
    TreeNotFound(String),

    /// the requested blob was not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// no document is stored under the key
    #[error("document not found: {branch}:{key}")]
    DocumentNotFound { branch: String, key: String },

    /// branch already exists
    #[error("branch already exists: {0}")]
    BranchAlreadyExists(String),

    /// tag already exists
    #[error("tag already exists: {0}")]
    TagAlreadyExists(String),

    /// malformed document key or ref name
    #[error("invalid key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    /// the branch head moved between read and compare-and-swap
    #[error("concurrent modification: branch {branch} was updated by another writer")]
    ConcurrentModification { branch: String },

    /// both sides of a merge or rebase changed the same paths differently
    #[error("merge conflict: {}", conflicting_paths.join(", "))]
    MergeConflict { conflicting_paths: Vec<String> },

    /// no bare repository at the path
    #[error("repository not initialized: {0}")]
    NotInitialized(PathBuf),
}

impl StorageError {
    /// true when a ref, object or document is missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
                | StorageError::TreeNotFound(_)
                | StorageError::BlobNotFound(_)
                | StorageError::DocumentNotFound { .. }
        )
    }

    /// a lost compare-and-swap; a retry against the fresh head may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, StorageError::ConcurrentModification { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
