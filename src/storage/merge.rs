//! Merge and rebase.
//!
//! Both operations compute new commits from immutable history and never move
//! a ref themselves. `GitRepository` runs them and then advances the target
//! branch with a single compare-and-swap, so a failed or conflicting attempt
//! leaves every branch exactly where it was.
//!
//! Conflict rules:
//! - merge: a path conflicts when both sides changed it since the common
//!   ancestor and ended up with different content
//! - rebase: a path conflicts when the target holds content that matches
//!   neither the replayed commit's parent nor the replayed commit itself

use std::collections::{BTreeSet, HashMap};

use git2::Repository;
use serde::Serialize;
use tracing::debug;

use crate::storage::commit::CommitBuilder;
use crate::storage::diff::diff_trees;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::log::{merge_base, replay_order};
use crate::storage::object::{self, CommitMeta, EntryTarget};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{Author, BlobId, Change, ChangeKind, CommitId, DocumentKey};

/// What a merge did to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "head", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// the source is already part of the target's history
    UpToDate(CommitId),
    /// the target had not moved since the fork; it moves to the source head
    FastForward(CommitId),
    /// a new two-parent commit
    Merged(CommitId),
}

impl MergeOutcome {
    /// the commit the target branch ends up at
    pub fn head(&self) -> CommitId {
        match self {
            MergeOutcome::UpToDate(id) | MergeOutcome::FastForward(id) | MergeOutcome::Merged(id) => *id,
        }
    }
}

/// What a rebase produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RebaseOutcome {
    pub head: CommitId,
    /// number of commits replayed onto the target
    pub replayed: usize,
}

/// three-way merge of `source` into `target`
pub fn merge(
    repo: &Repository,
    source: CommitId,
    target: CommitId,
    message: &str,
    author: &Author,
) -> StorageResult<MergeOutcome> {
    let base = merge_base(repo, source, target)?;

    if base == Some(source) {
        return Ok(MergeOutcome::UpToDate(target));
    }
    if base == Some(target) {
        return Ok(MergeOutcome::FastForward(source));
    }

    let base_tree = match base {
        Some(id) => object::get_commit(repo, id)?.tree_id,
        None => object::empty_tree(repo)?,
    };
    let source_tree = object::get_commit(repo, source)?.tree_id;
    let target_tree = object::get_commit(repo, target)?.tree_id;

    let ours: HashMap<String, Option<BlobId>> = diff_trees(repo, base_tree, target_tree)?
        .into_iter()
        .map(|c| (c.path, c.new))
        .collect();
    let theirs = diff_trees(repo, base_tree, source_tree)?;

    let conflicts: Vec<String> = theirs
        .iter()
        .filter(|c| matches!(ours.get(&c.path), Some(new) if *new != c.new))
        .map(|c| c.path.clone())
        .collect();
    if !conflicts.is_empty() {
        return Err(StorageError::MergeConflict {
            conflicting_paths: conflicts,
        });
    }

    let mut builder = CommitBuilder::on(repo, target)?;
    builder.parent(source);
    for change in deletions_first(theirs) {
        if ours.contains_key(&change.path) {
            continue;
        }
        set_or_conflict(&mut builder, &change)?;
    }

    let id = builder.commit(&CommitMeta::new(message, author.clone()))?;
    debug!(merge = %id.short(), base = ?base.map(|b| b.short()), "created merge commit");
    Ok(MergeOutcome::Merged(id))
}

/// replay the commits unique to `source` onto `target`, parents first
///
/// each replayed commit keeps its message and author; `rebaser` becomes the
/// committer
pub fn rebase(repo: &Repository, source: CommitId, target: CommitId, rebaser: &Author) -> StorageResult<RebaseOutcome> {
    let base = merge_base(repo, source, target)?;
    let to_replay = replay_order(repo, base, source)?;

    let mut head = target;
    for original in &to_replay {
        let parent_tree = match original.first_parent() {
            Some(parent) => object::get_commit(repo, parent)?.tree_id,
            None => object::empty_tree(repo)?,
        };
        let changes = diff_trees(repo, parent_tree, original.tree_id)?;

        let current = TreeHandle::at_commit(repo, head)?;
        let mut builder = CommitBuilder::on(repo, head)?;
        let mut conflicts = BTreeSet::new();

        for change in deletions_first(changes) {
            let existing = match current.entry_at(&change.path) {
                None => None,
                Some(EntryTarget::Blob(id)) => Some(id),
                Some(EntryTarget::Tree(_)) => {
                    conflicts.insert(change.path);
                    continue;
                }
            };
            if existing == change.new {
                continue;
            }
            if existing != change.old {
                conflicts.insert(change.path);
                continue;
            }
            if let Err(e) = set_or_conflict(&mut builder, &change) {
                match e {
                    StorageError::MergeConflict { conflicting_paths } => conflicts.extend(conflicting_paths),
                    other => return Err(other),
                }
            }
        }

        if !conflicts.is_empty() {
            return Err(StorageError::MergeConflict {
                conflicting_paths: conflicts.into_iter().collect(),
            });
        }

        let meta = CommitMeta::new(original.message.clone(), original.author.clone()).committed_by(rebaser.clone());
        head = builder.commit(&meta)?;
        debug!(original = %original.id.short(), replayed = %head.short(), "replayed commit");
    }

    Ok(RebaseOutcome {
        head,
        replayed: to_replay.len(),
    })
}

/// removals before additions, so a document can become a folder (and back)
fn deletions_first(mut changes: Vec<Change>) -> Vec<Change> {
    changes.sort_by_key(|c| c.kind != ChangeKind::Deleted);
    changes
}

/// apply one change; a document/folder collision is a conflict on that path
fn set_or_conflict(builder: &mut CommitBuilder<'_>, change: &Change) -> StorageResult<()> {
    let key = DocumentKey::from_tree_path(change.path.clone());
    match builder.set_blob(&key, change.new) {
        Ok(_) => Ok(()),
        Err(StorageError::InvalidKey { .. }) => Err(StorageError::MergeConflict {
            conflicting_paths: vec![change.path.clone()],
        }),
        Err(e) => Err(e),
    }
}
