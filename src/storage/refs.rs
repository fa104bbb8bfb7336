//! Branch and tag management.
//!
//! Git refs are pointers to commits. This module handles:
//! - Branch lifecycle (create, compare-and-swap advance, delete)
//! - Tag lifecycle (create once, delete)
//! - Resolving a branch, tag or commit id to a commit
//!
//! Branches live under `refs/heads/`, tags under `refs/tags/`. A branch only
//! ever moves through `advance_branch`, which is git's conditional reference
//! update: it succeeds only if the ref still holds the expected commit.

use git2::{ErrorCode, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object;
use crate::storage::types::{BranchName, CommitId, Reference, TagName};

/// Manages Git references (branches and tags).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<CommitId> {
        Self::peel(repo, &branch.as_ref_path())
            .ok_or_else(|| StorageError::RefNotFound(branch.to_string()))
    }

    /// Resolve a tag name to the commit it marks.
    pub fn resolve_tag(repo: &Repository, tag: &TagName) -> StorageResult<CommitId> {
        Self::peel(repo, &tag.as_ref_path()).ok_or_else(|| StorageError::RefNotFound(tag.to_string()))
    }

    /// Resolve a branch name, tag name or full commit id, in that order.
    pub fn resolve(repo: &Repository, name: &str) -> StorageResult<CommitId> {
        if let Some(id) = Self::peel(repo, &format!("refs/heads/{}", name)) {
            return Ok(id);
        }
        if let Some(id) = Self::peel(repo, &format!("refs/tags/{}", name)) {
            return Ok(id);
        }
        if name.len() == 40 {
            if let Ok(id) = CommitId::from_hex(name) {
                if object::find_commit(repo, id).is_ok() {
                    return Ok(id);
                }
            }
        }
        Err(StorageError::RefNotFound(name.to_string()))
    }

    fn peel(repo: &Repository, ref_path: &str) -> Option<CommitId> {
        let reference = repo.find_reference(ref_path).ok()?;
        let commit = reference.peel_to_commit().ok()?;
        Some(CommitId::new(commit.id()))
    }

    /// Check if a branch exists.
    pub fn branch_exists(repo: &Repository, branch: &BranchName) -> bool {
        repo.find_reference(&branch.as_ref_path()).is_ok()
    }

    /// Create a new branch pointing to the given commit.
    pub fn create_branch(repo: &Repository, branch: &BranchName, target: CommitId) -> StorageResult<()> {
        object::find_commit(repo, target)?;
        let log = format!("branch: created from {}", target.short());
        match repo.reference(&branch.as_ref_path(), target.raw(), false, &log) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Exists => Err(StorageError::BranchAlreadyExists(branch.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a branch from `expected` to `new_target`.
    ///
    /// This provides compare-and-swap semantics for safe concurrent updates.
    /// Returns `ConcurrentModification` if the branch no longer points at
    /// `expected`, and leaves the branch untouched.
    pub fn advance_branch(
        repo: &Repository,
        branch: &BranchName,
        expected: CommitId,
        new_target: CommitId,
        log_message: &str,
    ) -> StorageResult<()> {
        if !Self::branch_exists(repo, branch) {
            return Err(StorageError::RefNotFound(branch.to_string()));
        }
        object::find_commit(repo, new_target)?;

        match repo.reference_matching(&branch.as_ref_path(), new_target.raw(), true, expected.raw(), log_message) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Modified => Err(StorageError::ConcurrentModification {
                branch: branch.to_string(),
            }),
            Err(e) if e.code() == ErrorCode::NotFound => Err(StorageError::RefNotFound(branch.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a branch.
    pub fn delete_branch(repo: &Repository, branch: &BranchName) -> StorageResult<()> {
        Self::delete_ref(repo, &branch.as_ref_path(), branch.as_str())
    }

    /// List all branches with their heads, sorted by name.
    pub fn list_branches(repo: &Repository) -> StorageResult<Vec<Reference>> {
        let mut result = Vec::new();
        for reference in repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name().and_then(|n| n.strip_prefix("refs/heads/")) else {
                continue;
            };
            if let Ok(commit) = reference.peel_to_commit() {
                result.push(Reference {
                    name: name.to_string(),
                    target: CommitId::new(commit.id()),
                });
            }
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(result)
    }

    /// Create a tag. Tags never move once created.
    pub fn create_tag(repo: &Repository, tag: &TagName, target: CommitId) -> StorageResult<()> {
        object::find_commit(repo, target)?;
        let log = format!("tag: {}", target.short());
        match repo.reference(&tag.as_ref_path(), target.raw(), false, &log) {
            Ok(_) => Ok(()),
            Err(e) if e.code() == ErrorCode::Exists => Err(StorageError::TagAlreadyExists(tag.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a tag; the commit it marked stays in the object store.
    pub fn delete_tag(repo: &Repository, tag: &TagName) -> StorageResult<()> {
        Self::delete_ref(repo, &tag.as_ref_path(), tag.as_str())
    }

    fn delete_ref(repo: &Repository, ref_path: &str, short: &str) -> StorageResult<()> {
        let mut reference = repo
            .find_reference(ref_path)
            .map_err(|_| StorageError::RefNotFound(short.to_string()))?;
        reference.delete()?;
        Ok(())
    }

    /// Create the default branch at `initial_commit` if it doesn't exist,
    /// and point HEAD at it.
    pub fn init_default_branch(repo: &Repository, branch: &BranchName, initial_commit: CommitId) -> StorageResult<()> {
        if !Self::branch_exists(repo, branch) {
            Self::create_branch(repo, branch, initial_commit)?;
        }
        repo.set_head(&branch.as_ref_path())?;
        Ok(())
    }
}
