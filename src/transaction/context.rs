//! The state of one open transaction.
//!
//! A transaction is a base commit plus an ordered list of staged writes.
//! Nothing touches the object store until commit, so an abandoned
//! transaction leaves no trace.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use ulid::Ulid;

use crate::storage::{BranchName, CommitId, Document, DocumentKey, Write};

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(Ulid);

impl TransactionId {
    pub(crate) fn generate() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_string().to_lowercase())
    }
}

impl FromStr for TransactionId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(&s.to_uppercase()).map(Self)
    }
}

impl Serialize for TransactionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An open transaction's staged work.
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    branch: BranchName,
    base_commit: CommitId,
    staged: Vec<Write>,
    started_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, branch: BranchName, base_commit: CommitId) -> Self {
        Self {
            id,
            branch,
            base_commit,
            staged: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The branch this transaction will advance.
    pub fn branch(&self) -> &BranchName {
        &self.branch
    }

    /// The branch head captured when the transaction was created.
    pub fn base_commit(&self) -> CommitId {
        self.base_commit
    }

    /// Staged writes in the order they were added.
    pub fn staged(&self) -> &[Write] {
        &self.staged
    }

    pub(crate) fn stage_put(&mut self, document: Document) {
        self.staged.push(Write::Put(document));
    }

    pub(crate) fn stage_delete(&mut self, key: DocumentKey) {
        self.staged.push(Write::Delete(key));
    }

    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id,
            branch: self.branch.clone(),
            base_commit: self.base_commit,
            staged_writes: self.staged.len(),
            started_at: self.started_at,
        }
    }
}

/// A snapshot of an open transaction, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub branch: BranchName,
    pub base_commit: CommitId,
    pub staged_writes: usize,
    pub started_at: DateTime<Utc>,
}
