//! tree operations for document storage.
//!
//! in Git, a tree is a directory. In docgit a document key `a/b/c` is the
//! blob `c` inside tree `b` inside tree `a` inside the commit's root tree.
//!
//! Trees are immutable, so every change rebuilds the chain of trees from the
//! changed entry up to the root. The rebuild is an explicit walk over the key's
//! segments rather than recursion, so deep keys cost heap, not stack.

use std::path::Path;

use git2::{FileMode, ObjectType, Oid, Repository, Tree};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::object::{self, EntryTarget};
use crate::storage::types::{BlobId, CommitId, DocumentKey, TreeId, Write};

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// open the root tree of a commit
    pub fn at_commit(repo: &'repo Repository, commit_id: CommitId) -> StorageResult<Self> {
        let commit = object::find_commit(repo, commit_id)?;
        Ok(Self::new(commit.tree()?))
    }

    /// open a tree by id
    pub fn open(repo: &'repo Repository, tree_id: TreeId) -> StorageResult<Self> {
        Ok(Self::new(object::find_tree(repo, tree_id)?))
    }

    /// get the tree ID
    pub fn id(&self) -> TreeId {
        TreeId::new(self.tree.id())
    }

    /// whatever sits at `path`, if anything
    pub fn entry_at(&self, path: &str) -> Option<EntryTarget> {
        let entry = self.tree.get_path(Path::new(path)).ok()?;
        EntryTarget::from_git2(&entry)
    }

    /// the blob stored under a document key
    pub fn blob_at(&self, key: &DocumentKey) -> Option<BlobId> {
        match self.entry_at(key.as_str())? {
            EntryTarget::Blob(id) => Some(id),
            EntryTarget::Tree(_) => None,
        }
    }

    /// every document under `prefix` (the whole tree when None), sorted by key
    pub fn documents_under(
        &self,
        repo: &Repository,
        prefix: Option<&DocumentKey>,
    ) -> StorageResult<Vec<(DocumentKey, BlobId)>> {
        let start = match prefix {
            None => self.id(),
            Some(prefix) => match self.entry_at(prefix.as_str()) {
                Some(EntryTarget::Tree(id)) => id,
                _ => return Ok(Vec::new()),
            },
        };
        let base = prefix.map(|p| p.as_str().to_string());
        let mut documents: Vec<(DocumentKey, BlobId)> = collect_blobs(repo, start, base)?
            .into_iter()
            .map(|(path, id)| (DocumentKey::from_tree_path(path), id))
            .collect();
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(documents)
    }
}

/// every blob reachable from `tree`, with paths relative to `base`
///
/// order is walk order; callers sort when they need to
pub(crate) fn collect_blobs(
    repo: &Repository,
    tree: TreeId,
    base: Option<String>,
) -> StorageResult<Vec<(String, BlobId)>> {
    let mut blobs = Vec::new();
    let mut pending = vec![(base, tree)];

    while let Some((prefix, tree_id)) = pending.pop() {
        for entry in object::get_tree(repo, tree_id)? {
            let path = join_path(prefix.as_deref(), &entry.name);
            match entry.target {
                EntryTarget::Blob(id) => blobs.push((path, id)),
                EntryTarget::Tree(id) => pending.push((Some(path), id)),
            }
        }
    }

    Ok(blobs)
}

pub(crate) fn join_path(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, name),
        None => name.to_string(),
    }
}

/// a mutable view over a root tree for making changes
///
/// each edit writes the rebuilt trees straight into the object store and
/// moves the root forward; the original tree is never modified
///
/// # Usage Pattern
///
/// ```ignore
/// let mut mutator = TreeMutator::new(repo, base_tree);
/// mutator.put(&key, blob_id)?;
/// mutator.delete(&other_key)?;
/// let new_tree_id = mutator.root();
/// ```
pub struct TreeMutator<'repo> {
    repo: &'repo Repository,
    root: TreeId,
}

impl<'repo> TreeMutator<'repo> {
    /// create a new TreeMutator from an existing tree
    pub fn new(repo: &'repo Repository, root: TreeId) -> Self {
        Self { repo, root }
    }

    /// current root tree, including every edit applied so far
    pub fn root(&self) -> TreeId {
        self.root
    }

    /// apply a staged write, storing its content first
    pub fn apply(&mut self, write: &Write) -> StorageResult<()> {
        match write {
            Write::Put(doc) => {
                let blob = object::put_blob(self.repo, &doc.content)?;
                self.put(&doc.key, blob)
            }
            Write::Delete(key) => self.delete(key).map(|_| ()),
        }
    }

    /// point `key` at `blob`, creating intermediate trees as needed
    pub fn put(&mut self, key: &DocumentKey, blob: BlobId) -> StorageResult<()> {
        self.edit(key, Some(blob)).map(|_| ())
    }

    /// remove `key`; returns false when there was nothing to remove
    pub fn delete(&mut self, key: &DocumentKey) -> StorageResult<bool> {
        self.edit(key, None)
    }

    fn edit(&mut self, key: &DocumentKey, blob: Option<BlobId>) -> StorageResult<bool> {
        let segments: Vec<&str> = key.segments().collect();
        let last = segments.len() - 1;

        // levels[i] is the existing tree holding segments[i], if it exists
        let mut levels: Vec<Option<Tree<'repo>>> = Vec::with_capacity(segments.len());
        let mut current = Some(object::find_tree(self.repo, self.root)?);

        for (depth, segment) in segments.iter().enumerate() {
            let child = match &current {
                Some(tree) => tree.get_name(segment).map(|e| (e.kind(), e.id())),
                None => None,
            };

            let next = match (depth == last, child, blob.is_some()) {
                // leaf
                (true, Some((Some(ObjectType::Tree), _)), true) => {
                    return Err(invalid(key, "key names a folder"));
                }
                (true, Some((Some(ObjectType::Blob), _)), _) | (true, _, true) => None,
                (true, _, false) => return Ok(false),

                // interior
                (false, Some((Some(ObjectType::Tree), id)), _) => Some(self.repo.find_tree(id)?),
                (false, Some(_), true) => {
                    return Err(invalid(key, "path passes through an existing document"));
                }
                (false, None, true) => None,
                (false, _, false) => return Ok(false),
            };

            levels.push(current);
            current = next;
        }

        // rebuild bottom-up; an emptied subtree disappears from its parent
        let mut child: Option<(Oid, i32)> = blob.map(|b| (b.raw(), FileMode::Blob.into()));
        let mut root = self.root;

        for depth in (0..segments.len()).rev() {
            let segment = segments[depth];
            let mut builder = self.repo.treebuilder(levels[depth].as_ref())?;
            match child {
                Some((oid, mode)) => {
                    builder.insert(segment, oid, mode)?;
                }
                None => {
                    if builder.get(segment)?.is_some() {
                        builder.remove(segment)?;
                    }
                }
            }

            if depth > 0 && builder.len() == 0 {
                child = None;
            } else {
                let oid = builder.write()?;
                child = Some((oid, FileMode::Tree.into()));
                if depth == 0 {
                    root = TreeId::new(oid);
                }
            }
        }

        self.root = root;
        Ok(true)
    }
}

fn invalid(key: &DocumentKey, reason: &str) -> StorageError {
    StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
