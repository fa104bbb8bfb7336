//! Content-addressed object storage.
//!
//! Blobs hold document bodies, trees map path segments to blobs or subtrees,
//! commits snapshot a tree together with parents and metadata. Every id is
//! the git hash of the object's content, so writing the same object twice is
//! a no-op that returns the same id.

use chrono::{DateTime, TimeZone, Utc};
use git2::{ErrorCode, FileMode, ObjectType, Oid, Repository};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{Author, BlobId, CommitId, TreeId};

/// What a tree entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryTarget {
    Blob(BlobId),
    Tree(TreeId),
}

impl EntryTarget {
    pub(crate) fn oid(&self) -> Oid {
        match self {
            EntryTarget::Blob(id) => id.raw(),
            EntryTarget::Tree(id) => id.raw(),
        }
    }

    pub(crate) fn mode(&self) -> i32 {
        match self {
            EntryTarget::Blob(_) => FileMode::Blob.into(),
            EntryTarget::Tree(_) => FileMode::Tree.into(),
        }
    }

    pub(crate) fn from_git2(entry: &git2::TreeEntry<'_>) -> Option<Self> {
        match entry.kind()? {
            ObjectType::Blob => Some(EntryTarget::Blob(BlobId::new(entry.id()))),
            ObjectType::Tree => Some(EntryTarget::Tree(TreeId::new(entry.id()))),
            _ => None,
        }
    }
}

/// One named child of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub target: EntryTarget,
}

impl TreeEntry {
    pub fn blob(name: impl Into<String>, id: BlobId) -> Self {
        Self {
            name: name.into(),
            target: EntryTarget::Blob(id),
        }
    }

    pub fn tree(name: impl Into<String>, id: TreeId) -> Self {
        Self {
            name: name.into(),
            target: EntryTarget::Tree(id),
        }
    }
}

/// Metadata recorded on a new commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMeta {
    pub message: String,
    pub author: Author,
    pub committer: Author,
    pub timestamp: DateTime<Utc>,
}

impl CommitMeta {
    /// metadata authored and committed by `author`, stamped now
    pub fn new(message: impl Into<String>, author: Author) -> Self {
        Self {
            message: message.into(),
            committer: author.clone(),
            author,
            timestamp: Utc::now(),
        }
    }

    /// override the committer (used when replaying someone else's commit)
    pub fn committed_by(mut self, committer: Author) -> Self {
        self.committer = committer;
        self
    }

    /// override the timestamp
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// information about a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author: Author,
    pub committer: Author,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let committer = commit.committer();
        let timestamp = Utc
            .timestamp_opt(commit.time().seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author: Author::new(
                author.name().unwrap_or("Unknown"),
                author.email().unwrap_or("unknown@unknown"),
            ),
            committer: Author::new(
                committer.name().unwrap_or("Unknown"),
                committer.email().unwrap_or("unknown@unknown"),
            ),
            timestamp,
        }
    }

    /// check if this is a merge commit (has multiple parents)
    pub fn is_merge(&self) -> bool {
        self.parent_ids.len() > 1
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or(&self.message)
    }
}

fn is_missing(e: &git2::Error) -> bool {
    e.code() == ErrorCode::NotFound
}

/// store bytes as a blob
pub fn put_blob(repo: &Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    Ok(BlobId::new(repo.blob(bytes)?))
}

/// read a blob's content
pub fn get_blob(repo: &Repository, id: BlobId) -> StorageResult<Vec<u8>> {
    match repo.find_blob(id.raw()) {
        Ok(blob) => Ok(blob.content().to_vec()),
        Err(e) if is_missing(&e) => Err(StorageError::BlobNotFound(id.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// store a tree with exactly these entries
pub fn put_tree(repo: &Repository, entries: &[TreeEntry]) -> StorageResult<TreeId> {
    let mut builder = repo.treebuilder(None)?;
    for entry in entries {
        builder.insert(&entry.name, entry.target.oid(), entry.target.mode())?;
    }
    Ok(TreeId::new(builder.write()?))
}

/// id of the tree with no entries
pub fn empty_tree(repo: &Repository) -> StorageResult<TreeId> {
    put_tree(repo, &[])
}

/// read a tree's entries, in git's canonical order
pub fn get_tree(repo: &Repository, id: TreeId) -> StorageResult<Vec<TreeEntry>> {
    let tree = find_tree(repo, id)?;
    let entries = tree
        .iter()
        .filter_map(|entry| {
            let target = EntryTarget::from_git2(&entry)?;
            let name = entry.name()?.to_string();
            Some(TreeEntry { name, target })
        })
        .collect();
    Ok(entries)
}

pub(crate) fn find_tree(repo: &Repository, id: TreeId) -> StorageResult<git2::Tree<'_>> {
    repo.find_tree(id.raw()).map_err(|e| {
        if is_missing(&e) {
            StorageError::TreeNotFound(id.to_string())
        } else {
            StorageError::Git(e)
        }
    })
}

pub(crate) fn find_commit(repo: &Repository, id: CommitId) -> StorageResult<git2::Commit<'_>> {
    repo.find_commit(id.raw()).map_err(|e| {
        if is_missing(&e) {
            StorageError::CommitNotFound(id.to_string())
        } else {
            StorageError::Git(e)
        }
    })
}

/// store a commit
///
/// the id covers tree, parents, message, author, committer and timestamp, so
/// the same inputs always produce the same commit
pub fn put_commit(
    repo: &Repository,
    tree: TreeId,
    parents: &[CommitId],
    meta: &CommitMeta,
) -> StorageResult<CommitId> {
    let tree = find_tree(repo, tree)?;
    let author = meta.author.to_git2_signature(meta.timestamp)?;
    let committer = meta.committer.to_git2_signature(meta.timestamp)?;

    let parent_commits: Vec<git2::Commit<'_>> = parents
        .iter()
        .map(|id| find_commit(repo, *id))
        .collect::<Result<_, _>>()?;
    let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

    let oid = repo.commit(None, &author, &committer, &meta.message, &tree, &parent_refs)?;
    Ok(CommitId::new(oid))
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = find_commit(repo, id)?;
    Ok(CommitInfo::from_git2(&commit))
}
