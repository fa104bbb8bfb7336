//! Commit creation.
//!
//! commits are the atomic units of change in Git. In docgit:
//! - each single-document save or delete creates one commit
//! - each committed transaction creates exactly one commit, however many
//!   documents it touched
//! - merges create a commit with two parents
//!
//! Building a commit never moves a ref. Callers decide whether and how to
//! advance a branch to the returned id.

use git2::Repository;

use crate::storage::error::StorageResult;
use crate::storage::object::{self, CommitMeta};
use crate::storage::tree::TreeMutator;
use crate::storage::types::{Author, BlobId, CommitId, DocumentKey, TreeId, Write};

/// builds one commit on top of a base commit
///
/// # Usage Pattern
///
/// ```ignore
/// let mut builder = CommitBuilder::on(repo, head)?;
/// builder.apply_all(&writes)?;
/// let id = builder.commit(&CommitMeta::new("update users", author))?;
/// ```
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    parents: Vec<CommitId>,
    mutator: TreeMutator<'a>,
}

impl<'a> CommitBuilder<'a> {
    /// start from `base`'s tree; `base` becomes the first parent
    pub fn on(repo: &'a Repository, base: CommitId) -> StorageResult<Self> {
        let tree_id = object::get_commit(repo, base)?.tree_id;
        Ok(Self {
            repo,
            parents: vec![base],
            mutator: TreeMutator::new(repo, tree_id),
        })
    }

    /// add another parent (for merge commits)
    pub fn parent(&mut self, parent: CommitId) -> &mut Self {
        self.parents.push(parent);
        self
    }

    /// apply one staged write
    pub fn apply(&mut self, write: &Write) -> StorageResult<&mut Self> {
        self.mutator.apply(write)?;
        Ok(self)
    }

    /// apply staged writes in order; later writes to a key win
    pub fn apply_all<'w>(&mut self, writes: impl IntoIterator<Item = &'w Write>) -> StorageResult<&mut Self> {
        for write in writes {
            self.mutator.apply(write)?;
        }
        Ok(self)
    }

    /// point `key` at an already stored blob, or remove it when `blob` is None
    pub fn set_blob(&mut self, key: &DocumentKey, blob: Option<BlobId>) -> StorageResult<&mut Self> {
        match blob {
            Some(blob) => self.mutator.put(key, blob)?,
            None => {
                self.mutator.delete(key)?;
            }
        }
        Ok(self)
    }

    /// the tree the commit will snapshot
    pub fn tree(&self) -> TreeId {
        self.mutator.root()
    }

    /// write the commit and return its ID
    pub fn commit(&self, meta: &CommitMeta) -> StorageResult<CommitId> {
        object::put_commit(self.repo, self.mutator.root(), &self.parents, meta)
    }
}

/// apply `writes` to `base` and commit the result with `base` as sole parent
pub fn build(
    repo: &Repository,
    base: CommitId,
    writes: &[Write],
    message: &str,
    author: &Author,
) -> StorageResult<CommitId> {
    let mut builder = CommitBuilder::on(repo, base)?;
    builder.apply_all(writes)?;
    builder.commit(&CommitMeta::new(message, author.clone()))
}

/// create the root commit for a new repository (empty tree, no parents)
pub fn create_initial_commit(repo: &Repository, author: &Author) -> StorageResult<CommitId> {
    let tree = object::empty_tree(repo)?;
    object::put_commit(repo, tree, &[], &CommitMeta::new("Initial commit", author.clone()))
}
