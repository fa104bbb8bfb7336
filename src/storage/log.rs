//! commit graph walks
//!
//! All walks are breadth-first over parent links with a visited set, so
//! shared history in a merge-heavy graph is read once.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use git2::Repository;

use crate::storage::error::StorageResult;
use crate::storage::object::{self, CommitInfo};
use crate::storage::repository::GitRepository;
use crate::storage::types::CommitId;

/// `start` and every commit reachable from it
pub fn ancestors(repo: &Repository, start: CommitId) -> StorageResult<HashSet<CommitId>> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start]);

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id) {
            continue;
        }
        for parent in object::get_commit(repo, id)?.parent_ids {
            if !seen.contains(&parent) {
                queue.push_back(parent);
            }
        }
    }

    Ok(seen)
}

/// the common ancestor of `a` and `b` closest to `b`
///
/// `None` when the histories never meet
pub fn merge_base(repo: &Repository, a: CommitId, b: CommitId) -> StorageResult<Option<CommitId>> {
    let reachable_from_a = ancestors(repo, a)?;

    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([b]);
    while let Some(id) = queue.pop_front() {
        if reachable_from_a.contains(&id) {
            return Ok(Some(id));
        }
        if !seen.insert(id) {
            continue;
        }
        queue.extend(object::get_commit(repo, id)?.parent_ids);
    }

    Ok(None)
}

/// whether `ancestor` is reachable from `descendant` (a commit contains itself)
pub fn is_ancestor(repo: &Repository, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
    Ok(ancestors(repo, descendant)?.contains(&ancestor))
}

#[derive(Debug, PartialEq, Eq)]
struct Pending {
    timestamp: i64,
    // earlier discovery wins ties
    order: Reverse<u64>,
    id: CommitId,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// newest-first walk of the commits reachable from one commit but not another
struct Walk {
    hidden: HashSet<CommitId>,
    queued: HashSet<CommitId>,
    frontier: BinaryHeap<Pending>,
    next_order: u64,
}

impl Walk {
    fn new(repo: &Repository, hide: Option<CommitId>, start: CommitId) -> StorageResult<Self> {
        let hidden = match hide {
            Some(hide) => ancestors(repo, hide)?,
            None => HashSet::new(),
        };
        let mut walk = Self {
            hidden,
            queued: HashSet::new(),
            frontier: BinaryHeap::new(),
            next_order: 0,
        };
        walk.enqueue(repo, start)?;
        Ok(walk)
    }

    fn enqueue(&mut self, repo: &Repository, id: CommitId) -> StorageResult<()> {
        if self.hidden.contains(&id) || !self.queued.insert(id) {
            return Ok(());
        }
        let timestamp = object::get_commit(repo, id)?.timestamp.timestamp();
        self.frontier.push(Pending {
            timestamp,
            order: Reverse(self.next_order),
            id,
        });
        self.next_order += 1;
        Ok(())
    }

    fn step(&mut self, repo: &Repository) -> StorageResult<Option<CommitInfo>> {
        let Some(pending) = self.frontier.pop() else {
            return Ok(None);
        };
        let info = object::get_commit(repo, pending.id)?;
        for parent in &info.parent_ids {
            self.enqueue(repo, *parent)?;
        }
        Ok(Some(info))
    }

    fn is_done(&self) -> bool {
        self.frontier.is_empty()
    }
}

/// commits reachable from `start` but not from `hide`, newest first
///
/// with no `hide`, the whole history of `start`
pub fn unique_commits(repo: &Repository, hide: Option<CommitId>, start: CommitId) -> StorageResult<Vec<CommitInfo>> {
    let mut walk = Walk::new(repo, hide, start)?;
    let mut commits = Vec::new();
    while let Some(info) = walk.step(repo)? {
        commits.push(info);
    }
    Ok(commits)
}

/// commits reachable from `start` but not from `hide`, every parent before
/// its children
///
/// commits with no ancestry between them stay oldest first, so skewed
/// committer clocks can reorder siblings but never put a child first
pub fn replay_order(repo: &Repository, hide: Option<CommitId>, start: CommitId) -> StorageResult<Vec<CommitInfo>> {
    let mut candidates = unique_commits(repo, hide, start)?;
    candidates.reverse();

    let index: HashMap<CommitId, usize> = candidates.iter().enumerate().map(|(i, c)| (c.id, i)).collect();
    let mut emitted = vec![false; candidates.len()];
    let mut order = Vec::with_capacity(candidates.len());

    for next in 0..candidates.len() {
        let mut stack = vec![next];
        while let Some(&top) = stack.last() {
            if emitted[top] {
                stack.pop();
                continue;
            }
            let waiting = candidates[top]
                .parent_ids
                .iter()
                .filter_map(|parent| index.get(parent).copied())
                .find(|&parent| !emitted[parent]);
            match waiting {
                Some(parent) => stack.push(parent),
                None => {
                    emitted[top] = true;
                    order.push(top);
                    stack.pop();
                }
            }
        }
    }

    let mut slots: Vec<Option<CommitInfo>> = candidates.into_iter().map(Some).collect();
    Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
}

/// Lazy log over the commit graph.
///
/// Each call to `next` takes the repository lock for one step only, so a slow
/// consumer never blocks writers. The iterator is finite: the graph is a DAG
/// and every commit is yielded at most once. After an error it yields `None`.
pub struct LogIter {
    repo: GitRepository,
    walk: Walk,
    failed: bool,
}

impl LogIter {
    pub(crate) fn new(repo: GitRepository, hide: CommitId, start: CommitId) -> StorageResult<Self> {
        let walk = repo.with_repo(|r| Walk::new(r, Some(hide), start))?;
        Ok(Self {
            repo,
            walk,
            failed: false,
        })
    }
}

impl Iterator for LogIter {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.walk.is_done() {
            return None;
        }
        let walk = &mut self.walk;
        match self.repo.with_repo(|r| walk.step(r)) {
            Ok(info) => info.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
