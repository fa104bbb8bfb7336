//! Transaction manager - coordinates all transaction operations.
//!
//! The TransactionManager is the main entry point for transactions.
//! It handles:
//! - Transaction creation against a branch head
//! - Staging writes and tombstones by transaction id
//! - Committing with a compare-and-swap on the branch
//! - Aborting, alone or for every transaction on a branch
//!
//! Each open transaction has its own mutex inside a shared table. Work on
//! different ids never contends; work on one id is serialized, so a commit
//! and an abort racing on the same transaction cannot both succeed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::storage::{Author, BranchName, CommitId, Document, DocumentKey, GitRepository, StorageError};
use crate::transaction::context::{Transaction, TransactionId, TransactionInfo};
use crate::transaction::error::{TransactionError, TransactionResult};

/// `None` once the transaction has committed or aborted
type Slot = Arc<Mutex<Option<Transaction>>>;

/// Transaction manager - coordinates all transaction operations.
///
/// Thread-safe: can be shared across threads via Clone (uses Arc internally).
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TransactionManagerInner>,
}

struct TransactionManagerInner {
    /// The underlying repository.
    repo: GitRepository,
    /// Open transactions tracked by ID.
    open: RwLock<HashMap<TransactionId, Slot>>,
}

impl TransactionManager {
    /// Create a new transaction manager for the given repository.
    pub fn new(repo: GitRepository) -> Self {
        Self {
            inner: Arc::new(TransactionManagerInner {
                repo,
                open: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Get a reference to the underlying repository.
    pub fn repo(&self) -> &GitRepository {
        &self.inner.repo
    }

    /// Open a transaction on `branch`, capturing its current head.
    pub fn create(&self, branch: &BranchName) -> TransactionResult<TransactionId> {
        let base_commit = self.inner.repo.resolve_branch(branch)?;
        let id = TransactionId::generate();

        let tx = Transaction::new(id, branch.clone(), base_commit);
        self.inner.open.write().insert(id, Arc::new(Mutex::new(Some(tx))));

        debug!(tx = %id, branch = %branch, base = %base_commit.short(), "transaction created");
        Ok(id)
    }

    /// Stage a document write.
    pub fn add(&self, id: TransactionId, document: Document) -> TransactionResult<()> {
        self.with_open(id, |tx| tx.stage_put(document))
    }

    /// Stage several document writes, in order.
    pub fn add_many(&self, id: TransactionId, documents: impl IntoIterator<Item = Document>) -> TransactionResult<()> {
        self.with_open(id, |tx| documents.into_iter().for_each(|doc| tx.stage_put(doc)))
    }

    /// Stage a tombstone. Deleting a key that does not exist at commit time
    /// is a no-op.
    pub fn delete(&self, id: TransactionId, key: DocumentKey) -> TransactionResult<()> {
        self.with_open(id, |tx| tx.stage_delete(key))
    }

    /// Stage several tombstones, in order.
    pub fn delete_many(&self, id: TransactionId, keys: impl IntoIterator<Item = DocumentKey>) -> TransactionResult<()> {
        self.with_open(id, |tx| keys.into_iter().for_each(|key| tx.stage_delete(key)))
    }

    /// Commit the staged writes as one commit and advance the branch.
    ///
    /// If the branch moved since the transaction began this fails with
    /// `Conflict` and the transaction stays open. On success the
    /// transaction is gone.
    pub fn commit(&self, id: TransactionId, message: &str, author: &Author) -> TransactionResult<CommitId> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let tx = guard.as_ref().ok_or_else(|| not_found(id))?;

        let result = self.inner.repo.commit_to_branch(
            tx.branch(),
            tx.base_commit(),
            tx.staged(),
            message,
            author,
        );

        match result {
            Ok(commit_id) => {
                info!(
                    tx = %id,
                    branch = %tx.branch(),
                    commit = %commit_id.short(),
                    writes = tx.staged().len(),
                    "transaction committed"
                );
                *guard = None;
                self.inner.open.write().remove(&id);
                Ok(commit_id)
            }
            Err(StorageError::ConcurrentModification { branch }) => {
                debug!(tx = %id, branch = %branch, "transaction commit lost the race");
                Err(TransactionError::Conflict {
                    tx_id: id.to_string(),
                    branch,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Discard a transaction and everything it staged.
    pub fn abort(&self, id: TransactionId) -> TransactionResult<()> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        if guard.take().is_none() {
            return Err(not_found(id));
        }
        self.inner.open.write().remove(&id);

        debug!(tx = %id, "transaction aborted");
        Ok(())
    }

    /// Abort every open transaction on `branch`; returns how many were closed.
    pub fn close_all(&self, branch: &BranchName) -> usize {
        let slots: Vec<(TransactionId, Slot)> = self
            .inner
            .open
            .read()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(slot)))
            .collect();

        let mut closed = 0;
        for (id, slot) in slots {
            let mut guard = slot.lock();
            if guard.as_ref().is_some_and(|tx| tx.branch() == branch) {
                *guard = None;
                self.inner.open.write().remove(&id);
                closed += 1;
            }
        }

        if closed > 0 {
            info!(branch = %branch, closed, "closed open transactions");
        }
        closed
    }

    /// Get the number of open transactions.
    pub fn open_count(&self) -> usize {
        self.inner.open.read().len()
    }

    /// Check if a transaction is open.
    pub fn is_open(&self, id: TransactionId) -> bool {
        self.inner.open.read().contains_key(&id)
    }

    /// Snapshot of an open transaction.
    pub fn info(&self, id: TransactionId) -> TransactionResult<TransactionInfo> {
        let slot = self.slot(id)?;
        let guard = slot.lock();
        guard.as_ref().map(Transaction::info).ok_or_else(|| not_found(id))
    }

    fn slot(&self, id: TransactionId) -> TransactionResult<Slot> {
        self.inner
            .open
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    fn with_open<T>(&self, id: TransactionId, f: impl FnOnce(&mut Transaction) -> T) -> TransactionResult<T> {
        let slot = self.slot(id)?;
        let mut guard = slot.lock();
        let tx = guard.as_mut().ok_or_else(|| not_found(id))?;
        Ok(f(tx))
    }
}

fn not_found(id: TransactionId) -> TransactionError {
    TransactionError::NotFound(id.to_string())
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("open_count", &self.open_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn setup() -> (TempDir, TransactionManager) {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::init(dir.path(), &master(), &Author::docgit()).unwrap();
        let manager = TransactionManager::new(repo);
        (dir, manager)
    }

    fn master() -> BranchName {
        BranchName::new("master").unwrap()
    }

    fn doc(key: &str, content: &str) -> Document {
        Document::new(key, content).unwrap()
    }

    fn key(s: &str) -> DocumentKey {
        DocumentKey::new(s).unwrap()
    }

    fn read(manager: &TransactionManager, k: &str) -> Option<String> {
        manager
            .repo()
            .read_document(&master(), &key(k))
            .ok()
            .and_then(|d| d.content_str().map(str::to_string))
    }

    #[test]
    fn test_create_and_commit() {
        let (_dir, manager) = setup();
        let before = manager.repo().resolve_branch(&master()).unwrap();

        let tx = manager.create(&master()).unwrap();
        assert!(manager.is_open(tx));

        manager.add(tx, doc("a", "1")).unwrap();
        manager.add_many(tx, vec![doc("b", "2"), doc("c", "3")]).unwrap();
        manager.delete(tx, key("c")).unwrap();

        let commit_id = manager.commit(tx, "three writes", &Author::docgit()).unwrap();
        assert_eq!(manager.open_count(), 0);

        // exactly one commit on top of the captured base
        let info = manager.repo().get_commit(commit_id).unwrap();
        assert_eq!(info.parent_ids, vec![before]);
        assert_eq!(manager.repo().resolve_branch(&master()).unwrap(), commit_id);

        assert_eq!(read(&manager, "a").as_deref(), Some("1"));
        assert_eq!(read(&manager, "b").as_deref(), Some("2"));
        assert_eq!(read(&manager, "c"), None);
    }

    #[test]
    fn test_create_on_missing_branch() {
        let (_dir, manager) = setup();
        let result = manager.create(&BranchName::new("ghost").unwrap());
        assert!(matches!(result, Err(ref e) if e.is_not_found()));
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn test_abort_discards_writes() {
        let (_dir, manager) = setup();
        let head = manager.repo().resolve_branch(&master()).unwrap();

        let tx = manager.create(&master()).unwrap();
        manager.add(tx, doc("a", "1")).unwrap();
        manager.abort(tx).unwrap();

        assert_eq!(manager.repo().resolve_branch(&master()).unwrap(), head);
        assert_eq!(read(&manager, "a"), None);
    }

    #[test]
    fn test_finished_transactions_are_unknown() {
        let (_dir, manager) = setup();

        let committed = manager.create(&master()).unwrap();
        manager.commit(committed, "done", &Author::docgit()).unwrap();
        let aborted = manager.create(&master()).unwrap();
        manager.abort(aborted).unwrap();

        for id in [committed, aborted] {
            assert!(matches!(manager.add(id, doc("x", "1")), Err(TransactionError::NotFound(_))));
            assert!(matches!(manager.delete(id, key("x")), Err(TransactionError::NotFound(_))));
            assert!(matches!(
                manager.commit(id, "again", &Author::docgit()),
                Err(TransactionError::NotFound(_))
            ));
            assert!(matches!(manager.abort(id), Err(TransactionError::NotFound(_))));
        }
    }

    #[test]
    fn test_conflict_keeps_transaction_open() {
        let (_dir, manager) = setup();

        // Start two transactions from the same base
        let tx1 = manager.create(&master()).unwrap();
        let tx2 = manager.create(&master()).unwrap();
        manager.add(tx1, doc("k1", "1")).unwrap();
        manager.add(tx2, doc("k2", "2")).unwrap();

        // First commit wins
        let winner = manager.commit(tx1, "first", &Author::docgit()).unwrap();

        // Second fails even though the keys differ: the base moved
        let result = manager.commit(tx2, "second", &Author::docgit());
        let err = result.unwrap_err();
        assert!(matches!(err, TransactionError::Conflict { .. }));
        assert!(err.is_retryable());

        assert!(manager.is_open(tx2));
        assert_eq!(manager.repo().resolve_branch(&master()).unwrap(), winner);
        assert_eq!(read(&manager, "k2"), None);

        manager.abort(tx2).unwrap();
        assert_eq!(manager.open_count(), 0);
    }

    #[test]
    fn test_close_all_only_touches_one_branch() {
        let (_dir, manager) = setup();
        let feature = BranchName::new("feature").unwrap();
        manager.repo().create_branch(&feature, "master").unwrap();

        let on_master = manager.create(&master()).unwrap();
        let on_feature_1 = manager.create(&feature).unwrap();
        let on_feature_2 = manager.create(&feature).unwrap();

        assert_eq!(manager.close_all(&feature), 2);
        assert!(manager.is_open(on_master));
        assert!(!manager.is_open(on_feature_1));
        assert!(matches!(manager.abort(on_feature_2), Err(TransactionError::NotFound(_))));
        assert_eq!(manager.close_all(&feature), 0);
    }

    #[test]
    fn test_info_reports_staged_writes() {
        let (_dir, manager) = setup();
        let tx = manager.create(&master()).unwrap();
        manager.delete_many(tx, vec![key("a"), key("b")]).unwrap();

        let info = manager.info(tx).unwrap();
        assert_eq!(info.id, tx);
        assert_eq!(info.staged_writes, 2);
        assert_eq!(info.branch, master());
    }

    #[test]
    fn test_concurrent_transactions_on_different_ids() {
        let (_dir, manager) = setup();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = manager.clone();
                thread::spawn(move || {
                    let tx = manager.create(&master()).unwrap();
                    for j in 0..10 {
                        manager.add(tx, doc(&format!("t{i}/d{j}"), "x")).unwrap();
                    }
                    (tx, manager.info(tx).unwrap().staged_writes)
                })
            })
            .collect();

        for handle in handles {
            let (tx, staged) = handle.join().unwrap();
            assert_eq!(staged, 10);
            assert!(manager.is_open(tx));
        }
        assert_eq!(manager.open_count(), 8);
    }

    #[test]
    fn test_racing_commits_exactly_one_wins() {
        let (_dir, manager) = setup();
        let ids: Vec<TransactionId> = (0..4)
            .map(|i| {
                let tx = manager.create(&master()).unwrap();
                manager.add(tx, doc("counter", &i.to_string())).unwrap();
                tx
            })
            .collect();

        let handles: Vec<_> = ids
            .into_iter()
            .map(|tx| {
                let manager = manager.clone();
                thread::spawn(move || manager.commit(tx, "race", &Author::docgit()))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, TransactionError::Conflict { .. })));
        assert_eq!(manager.open_count(), 3);
    }
}
