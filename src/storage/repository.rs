//! Core Git repository wrapper.
//!
//! This is the central component of the storage layer. It wraps
//! `git2::Repository` with thread-safe access and provides the high-level
//! operations the transaction manager and the database facade use.
//!
//! `git2::Repository` can move between threads but cannot be shared, so the
//! handle sits behind a mutex. Every method takes the lock for one step (a
//! read, a commit build, a ref update) and releases it before the next, so a
//! long merge or a slow log consumer never starves other writers. Correctness
//! under concurrency comes from the ref compare-and-swap, not from the lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::Repository;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::storage::commit;
use crate::storage::diff;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::log::LogIter;
use crate::storage::merge::{self, MergeOutcome, RebaseOutcome};
use crate::storage::object::{self, CommitInfo};
use crate::storage::refs::RefManager;
use crate::storage::tree::TreeHandle;
use crate::storage::types::{
    Author, BranchName, Change, CommitId, Document, DocumentKey, Reference, TagName, Write,
};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct GitRepository {
    inner: Arc<GitRepositoryInner>,
}

struct GitRepositoryInner {
    repo: Mutex<Repository>,
    path: PathBuf,
}

impl GitRepository {
    fn wrap(repo: Repository, path: &Path) -> Self {
        Self {
            inner: Arc::new(GitRepositoryInner {
                repo: Mutex::new(repo),
                path: path.to_path_buf(),
            }),
        }
    }

    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open_bare(path).map_err(|_| StorageError::NotInitialized(path.to_path_buf()))?;
        debug!(path = %path.display(), "opened repository");
        Ok(Self::wrap(repo, path))
    }

    /// Initialize a new bare repository with an empty initial commit on
    /// `default_branch`.
    pub fn init(path: impl AsRef<Path>, default_branch: &BranchName, author: &Author) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::init_bare(path)?;
        let storage = Self::wrap(repo, path);

        storage.with_repo(|repo| {
            let commit_id = commit::create_initial_commit(repo, author)?;
            RefManager::init_default_branch(repo, default_branch, commit_id)
        })?;

        info!(path = %path.display(), branch = %default_branch, "initialized repository");
        Ok(storage)
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>, default_branch: &BranchName, author: &Author) -> StorageResult<Self> {
        let path = path.as_ref();
        match Repository::open_bare(path) {
            Ok(repo) => Ok(Self::wrap(repo, path)),
            Err(_) => Self::init(path, default_branch, author),
        }
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run `f` with exclusive access to the underlying repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    // ==================== Refs ====================

    /// Resolve a branch, tag or full commit id.
    pub fn resolve(&self, name: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve(repo, name))
    }

    /// Get the commit ID for a branch.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<CommitId> {
        self.with_repo(|repo| RefManager::resolve_branch(repo, branch))
    }

    pub fn branch_exists(&self, branch: &BranchName) -> bool {
        let repo = self.inner.repo.lock();
        RefManager::branch_exists(&repo, branch)
    }

    /// Create a branch at whatever `from` resolves to.
    pub fn create_branch(&self, branch: &BranchName, from: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let target = RefManager::resolve(repo, from)?;
            RefManager::create_branch(repo, branch, target)?;
            Ok(target)
        })
    }

    pub fn delete_branch(&self, branch: &BranchName) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::delete_branch(repo, branch))
    }

    pub fn list_branches(&self) -> StorageResult<Vec<Reference>> {
        self.with_repo(RefManager::list_branches)
    }

    /// Compare-and-swap a branch from `expected` to `new_target`.
    pub fn advance_branch(
        &self,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
        log_message: &str,
    ) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::advance_branch(repo, branch, expected, new_target, log_message))
    }

    /// Tag whatever `target` resolves to.
    pub fn create_tag(&self, tag: &TagName, target: &str) -> StorageResult<CommitId> {
        self.with_repo(|repo| {
            let commit_id = RefManager::resolve(repo, target)?;
            RefManager::create_tag(repo, tag, commit_id)?;
            Ok(commit_id)
        })
    }

    pub fn delete_tag(&self, tag: &TagName) -> StorageResult<()> {
        self.with_repo(|repo| RefManager::delete_tag(repo, tag))
    }

    // ==================== Documents ====================

    /// Get information about a commit.
    pub fn get_commit(&self, id: CommitId) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| object::get_commit(repo, id))
    }

    /// Read one document at the head of `branch`.
    pub fn read_document(&self, branch: &BranchName, key: &DocumentKey) -> StorageResult<Document> {
        self.with_repo(|repo| {
            let head = RefManager::resolve_branch(repo, branch)?;
            Self::read_at(repo, head, branch, key)
        })
    }

    fn read_at(repo: &Repository, at: CommitId, branch: &BranchName, key: &DocumentKey) -> StorageResult<Document> {
        let tree = TreeHandle::at_commit(repo, at)?;
        let blob = tree.blob_at(key).ok_or_else(|| StorageError::DocumentNotFound {
            branch: branch.to_string(),
            key: key.to_string(),
        })?;
        Ok(Document {
            key: key.clone(),
            content: object::get_blob(repo, blob)?,
        })
    }

    /// Whether a document exists at `at`.
    pub fn document_exists(&self, at: CommitId, key: &DocumentKey) -> StorageResult<bool> {
        self.with_repo(|repo| Ok(TreeHandle::at_commit(repo, at)?.blob_at(key).is_some()))
    }

    /// Documents under `prefix` at the head of `branch`, in key order.
    ///
    /// `skip` and `take` select a page; only the page's contents are read.
    pub fn list_documents(
        &self,
        branch: &BranchName,
        prefix: Option<&DocumentKey>,
        skip: usize,
        take: Option<usize>,
    ) -> StorageResult<Vec<Document>> {
        self.with_repo(|repo| {
            let head = RefManager::resolve_branch(repo, branch)?;
            let tree = TreeHandle::at_commit(repo, head)?;
            let entries = tree.documents_under(repo, prefix)?;

            let mut page = Vec::new();
            for (key, blob) in entries.into_iter().skip(skip).take(take.unwrap_or(usize::MAX)) {
                page.push(Document {
                    key,
                    content: object::get_blob(repo, blob)?,
                });
            }
            Ok(page)
        })
    }

    // ==================== Commits ====================

    /// Build one commit on `base` from `writes`. No ref moves.
    pub fn build_commit(
        &self,
        base: CommitId,
        writes: &[Write],
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitId> {
        self.with_repo(|repo| commit::build(repo, base, writes, message, author))
    }

    /// Build a commit on `expected` and move `branch` to it, failing with
    /// `ConcurrentModification` if the branch moved in the meantime.
    pub fn commit_to_branch(
        &self,
        branch: &BranchName,
        expected: CommitId,
        writes: &[Write],
        message: &str,
        author: &Author,
    ) -> StorageResult<CommitId> {
        let new_head = self.build_commit(expected, writes, message, author)?;
        self.advance_branch(branch, expected, new_head, &format!("commit: {}", first_line(message)))?;
        debug!(branch = %branch, commit = %new_head.short(), writes = writes.len(), "committed");
        Ok(new_head)
    }

    // ==================== Merge / Rebase ====================

    /// Merge `source` into `target` and advance `target`.
    pub fn merge_branches(
        &self,
        source: &BranchName,
        target: &BranchName,
        message: &str,
        author: &Author,
    ) -> StorageResult<MergeOutcome> {
        let source_head = self.resolve_branch(source)?;
        let target_head = self.resolve_branch(target)?;

        let outcome = self.with_repo(|repo| merge::merge(repo, source_head, target_head, message, author))?;

        let log_message = match outcome {
            MergeOutcome::UpToDate(_) => return Ok(outcome),
            MergeOutcome::FastForward(_) => format!("merge {}: fast-forward", source),
            MergeOutcome::Merged(_) => format!("merge {}: {}", source, first_line(message)),
        };
        self.advance_branch(target, target_head, outcome.head(), &log_message)?;

        info!(source = %source, target = %target, head = %outcome.head().short(), ?outcome, "merged branch");
        Ok(outcome)
    }

    /// Replay `source`'s unique commits onto `target` and advance `target`.
    ///
    /// `message` is recorded in the target's reflog; replayed commits keep
    /// their own messages.
    pub fn rebase_branch(
        &self,
        source: &BranchName,
        target: &BranchName,
        message: &str,
        author: &Author,
    ) -> StorageResult<RebaseOutcome> {
        let source_head = self.resolve_branch(source)?;
        let target_head = self.resolve_branch(target)?;

        let outcome = self.with_repo(|repo| merge::rebase(repo, source_head, target_head, author))?;
        if outcome.replayed == 0 {
            return Ok(outcome);
        }

        self.advance_branch(target, target_head, outcome.head, &format!("rebase: {}", first_line(message)))?;
        info!(
            source = %source,
            target = %target,
            replayed = outcome.replayed,
            head = %outcome.head.short(),
            "rebased branch"
        );
        Ok(outcome)
    }

    // ==================== History ====================

    /// Document-level changes from `from` to `to` (refs or commit ids).
    pub fn diff(&self, from: &str, to: &str) -> StorageResult<Vec<Change>> {
        self.with_repo(|repo| {
            let old = RefManager::resolve(repo, from)?;
            let new = RefManager::resolve(repo, to)?;
            diff::diff_commits(repo, old, new)
        })
    }

    /// Commits reachable from `to` but not from `from`, newest first.
    pub fn log(&self, from: &str, to: &str) -> StorageResult<LogIter> {
        let hide = self.resolve(from)?;
        let start = self.resolve(to)?;
        LogIter::new(self.clone(), hide, start)
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository").field("path", &self.inner.path).finish()
    }
}
