//! path-level diff between two trees
//!
//! Walks both trees side by side. Subtrees with the same id are skipped
//! without being opened, so the cost is proportional to what changed.

use std::collections::BTreeMap;

use git2::Repository;

use crate::storage::error::StorageResult;
use crate::storage::object::{self, EntryTarget};
use crate::storage::tree::{collect_blobs, join_path};
use crate::storage::types::{BlobId, Change, ChangeKind, CommitId, TreeId};

/// every document that differs between `old` and `new`, sorted by path
pub fn diff_trees(repo: &Repository, old: TreeId, new: TreeId) -> StorageResult<Vec<Change>> {
    let mut changes = Vec::new();
    let mut pending: Vec<(Option<String>, TreeId, TreeId)> = vec![(None, old, new)];

    while let Some((prefix, old_tree, new_tree)) = pending.pop() {
        if old_tree == new_tree {
            continue;
        }

        let mut sides: BTreeMap<String, (Option<EntryTarget>, Option<EntryTarget>)> = BTreeMap::new();
        for entry in object::get_tree(repo, old_tree)? {
            sides.entry(entry.name).or_default().0 = Some(entry.target);
        }
        for entry in object::get_tree(repo, new_tree)? {
            sides.entry(entry.name).or_default().1 = Some(entry.target);
        }

        for (name, pair) in sides {
            let path = join_path(prefix.as_deref(), &name);
            match pair {
                (Some(a), Some(b)) if a == b => {}
                (Some(EntryTarget::Tree(a)), Some(EntryTarget::Tree(b))) => {
                    pending.push((Some(path), a, b));
                }
                (Some(EntryTarget::Blob(a)), Some(EntryTarget::Blob(b))) => {
                    changes.push(modified(path, a, b));
                }
                (old_side, new_side) => {
                    // kind changed (document <-> folder) or present on one side only
                    if let Some(target) = old_side {
                        removed(repo, path.clone(), target, &mut changes)?;
                    }
                    if let Some(target) = new_side {
                        added(repo, path, target, &mut changes)?;
                    }
                }
            }
        }
    }

    changes.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(changes)
}

/// diff the snapshots of two commits
pub fn diff_commits(repo: &Repository, old: CommitId, new: CommitId) -> StorageResult<Vec<Change>> {
    let old_tree = object::get_commit(repo, old)?.tree_id;
    let new_tree = object::get_commit(repo, new)?.tree_id;
    diff_trees(repo, old_tree, new_tree)
}

fn modified(path: String, old: BlobId, new: BlobId) -> Change {
    Change {
        path,
        kind: ChangeKind::Modified,
        old: Some(old),
        new: Some(new),
    }
}

fn added(repo: &Repository, path: String, target: EntryTarget, out: &mut Vec<Change>) -> StorageResult<()> {
    for (path, id) in flatten(repo, path, target)? {
        out.push(Change {
            path,
            kind: ChangeKind::Added,
            old: None,
            new: Some(id),
        });
    }
    Ok(())
}

fn removed(repo: &Repository, path: String, target: EntryTarget, out: &mut Vec<Change>) -> StorageResult<()> {
    for (path, id) in flatten(repo, path, target)? {
        out.push(Change {
            path,
            kind: ChangeKind::Deleted,
            old: Some(id),
            new: None,
        });
    }
    Ok(())
}

fn flatten(repo: &Repository, path: String, target: EntryTarget) -> StorageResult<Vec<(String, BlobId)>> {
    match target {
        EntryTarget::Blob(id) => Ok(vec![(path, id)]),
        EntryTarget::Tree(id) => collect_blobs(repo, id, Some(path)),
    }
}
