//! Database API - high-level interface for docgit.
//!
//! `Database` is the whole external contract: documents, branches, tags,
//! transactions, merge, rebase, diff and log. Names arrive as strings and are
//! validated here; everything below works on typed names.

use std::path::Path;
use std::slice;

use tracing::{debug, info, warn};

use crate::db::config::DatabaseConfig;
use crate::db::error::{DatabaseError, DatabaseResult};
use crate::storage::{
    Author, BranchName, Change, CommitId, CommitInfo, Document, DocumentKey, GitRepository, MergeOutcome,
    RebaseOutcome, Reference, StorageError, TagName, Write,
};
use crate::transaction::{TransactionId, TransactionInfo, TransactionManager};

/// The main database handle.
///
/// Cheap to clone; clones share the repository and the transaction table.
#[derive(Debug, Clone)]
pub struct Database {
    config: DatabaseConfig,
    repo: GitRepository,
    transactions: TransactionManager,
}

impl Database {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        Self::open_with_config(DatabaseConfig::new(path.as_ref()))
    }

    /// Open or create a database with custom configuration.
    pub fn open_with_config(config: DatabaseConfig) -> DatabaseResult<Self> {
        let default_branch = BranchName::new(config.default_branch.as_str())
            .map_err(|e| DatabaseError::InvalidConfig(format!("default branch: {e}")))?;
        config
            .signature
            .validate()
            .map_err(|e| DatabaseError::InvalidConfig(format!("signature: {e}")))?;

        let repo = if config.create_if_missing {
            GitRepository::open_or_init(&config.path, &default_branch, &config.signature)?
        } else if config.path.exists() {
            GitRepository::open(&config.path)?
        } else {
            return Err(DatabaseError::NotFound(config.path.clone()));
        };

        debug!(path = %config.path.display(), "database opened");
        let transactions = TransactionManager::new(repo.clone());
        Ok(Self {
            config,
            repo,
            transactions,
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// The underlying repository.
    pub fn repo(&self) -> &GitRepository {
        &self.repo
    }

    // ==================== Documents ====================

    /// Read the document stored under `key` at the head of `branch`.
    pub fn get(&self, branch: &str, key: &str) -> DatabaseResult<Document> {
        let branch = BranchName::new(branch)?;
        let key = DocumentKey::new(key)?;
        Ok(self.repo.read_document(&branch, &key)?)
    }

    /// Every document under `prefix`, in key order. An empty prefix lists the
    /// whole branch; a prefix naming nothing (or a single document) lists
    /// nothing.
    pub fn list(&self, branch: &str, prefix: &str) -> DatabaseResult<Vec<Document>> {
        self.list_range(branch, prefix, 0, None)
    }

    /// One page of `list`: `page_size` documents starting at position `start`.
    pub fn list_paged(&self, branch: &str, prefix: &str, start: usize, page_size: usize) -> DatabaseResult<Vec<Document>> {
        self.list_range(branch, prefix, start, Some(page_size))
    }

    fn list_range(&self, branch: &str, prefix: &str, start: usize, take: Option<usize>) -> DatabaseResult<Vec<Document>> {
        let branch = BranchName::new(branch)?;
        let prefix = prefix.trim_end_matches('/');
        let prefix = if prefix.is_empty() {
            None
        } else {
            Some(DocumentKey::new(prefix)?)
        };
        Ok(self.repo.list_documents(&branch, prefix.as_ref(), start, take)?)
    }

    /// Store `document` on `branch` as a single commit.
    pub fn save(&self, branch: &str, message: &str, document: Document, author: &Author) -> DatabaseResult<CommitId> {
        let branch = BranchName::new(branch)?;
        self.write_one(&branch, Write::Put(document), message, author)
    }

    /// Remove the document under `key` from `branch` as a single commit.
    pub fn delete(&self, branch: &str, key: &str, message: &str, author: &Author) -> DatabaseResult<CommitId> {
        let branch = BranchName::new(branch)?;
        let key = DocumentKey::new(key)?;
        self.write_one(&branch, Write::Delete(key), message, author)
    }

    /// A one-write transaction against the freshest head, retried when
    /// another writer wins the race.
    fn write_one(&self, branch: &BranchName, write: Write, message: &str, author: &Author) -> DatabaseResult<CommitId> {
        author.validate()?;
        let mut attempt = 0;
        loop {
            let head = self.repo.resolve_branch(branch)?;

            if let Write::Delete(key) = &write {
                if !self.repo.document_exists(head, key)? {
                    return Err(StorageError::DocumentNotFound {
                        branch: branch.to_string(),
                        key: key.to_string(),
                    }
                    .into());
                }
            }

            match self
                .repo
                .commit_to_branch(branch, head, slice::from_ref(&write), message, author)
            {
                Ok(commit_id) => return Ok(commit_id),
                Err(e) if e.is_retriable() && attempt < self.config.write_retries => {
                    attempt += 1;
                    warn!(branch = %branch, key = %write.key(), attempt, "lost race for branch head, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==================== Branches & Tags ====================

    /// Create `name` at whatever `from` resolves to (branch, tag or commit id).
    pub fn create_branch(&self, name: &str, from: &str) -> DatabaseResult<CommitId> {
        let branch = BranchName::new(name)?;
        let head = self.repo.create_branch(&branch, from)?;
        info!(branch = %branch, from, head = %head.short(), "branch created");
        Ok(head)
    }

    pub fn list_branches(&self) -> DatabaseResult<Vec<Reference>> {
        Ok(self.repo.list_branches()?)
    }

    /// Delete a branch, aborting its open transactions first.
    pub fn delete_branch(&self, name: &str) -> DatabaseResult<()> {
        let branch = BranchName::new(name)?;
        if !self.repo.branch_exists(&branch) {
            return Err(StorageError::RefNotFound(branch.to_string()).into());
        }
        self.transactions.close_all(&branch);
        self.repo.delete_branch(&branch)?;
        info!(branch = %branch, "branch deleted");
        Ok(())
    }

    /// Tag whatever `target` resolves to. Tags never move.
    pub fn create_tag(&self, name: &str, target: &str) -> DatabaseResult<CommitId> {
        let tag = TagName::new(name)?;
        let commit_id = self.repo.create_tag(&tag, target)?;
        info!(tag = %tag, commit = %commit_id.short(), "tag created");
        Ok(commit_id)
    }

    pub fn delete_tag(&self, name: &str) -> DatabaseResult<()> {
        let tag = TagName::new(name)?;
        self.repo.delete_tag(&tag)?;
        info!(tag = %tag, "tag deleted");
        Ok(())
    }

    // ==================== Transactions ====================

    pub fn create_transaction(&self, branch: &str) -> DatabaseResult<TransactionId> {
        let branch = BranchName::new(branch)?;
        Ok(self.transactions.create(&branch)?)
    }

    pub fn add(&self, tx: TransactionId, document: Document) -> DatabaseResult<()> {
        Ok(self.transactions.add(tx, document)?)
    }

    pub fn add_many(&self, tx: TransactionId, documents: impl IntoIterator<Item = Document>) -> DatabaseResult<()> {
        Ok(self.transactions.add_many(tx, documents)?)
    }

    pub fn delete_in(&self, tx: TransactionId, key: &str) -> DatabaseResult<()> {
        let key = DocumentKey::new(key)?;
        Ok(self.transactions.delete(tx, key)?)
    }

    /// Stage several tombstones; nothing is staged if any key is invalid.
    pub fn delete_many_in<'k>(&self, tx: TransactionId, keys: impl IntoIterator<Item = &'k str>) -> DatabaseResult<()> {
        let keys = keys
            .into_iter()
            .map(DocumentKey::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.transactions.delete_many(tx, keys)?)
    }

    pub fn commit_transaction(&self, tx: TransactionId, message: &str, author: &Author) -> DatabaseResult<CommitId> {
        author.validate()?;
        Ok(self.transactions.commit(tx, message, author)?)
    }

    pub fn abort_transaction(&self, tx: TransactionId) -> DatabaseResult<()> {
        Ok(self.transactions.abort(tx)?)
    }

    /// Abort every open transaction on `branch`; returns how many closed.
    pub fn close_transactions(&self, branch: &str) -> DatabaseResult<usize> {
        let branch = BranchName::new(branch)?;
        Ok(self.transactions.close_all(&branch))
    }

    pub fn transaction_info(&self, tx: TransactionId) -> DatabaseResult<TransactionInfo> {
        Ok(self.transactions.info(tx)?)
    }

    // ==================== Merge & Rebase ====================

    /// Merge `source` into `target`.
    pub fn merge(&self, source: &str, target: &str, author: &Author, message: &str) -> DatabaseResult<MergeOutcome> {
        let source = BranchName::new(source)?;
        let target = BranchName::new(target)?;
        author.validate()?;
        Ok(self.repo.merge_branches(&source, &target, message, author)?)
    }

    /// Replay `source`'s own commits onto `target`.
    pub fn rebase(&self, source: &str, target: &str, author: &Author, message: &str) -> DatabaseResult<RebaseOutcome> {
        let source = BranchName::new(source)?;
        let target = BranchName::new(target)?;
        author.validate()?;
        Ok(self.repo.rebase_branch(&source, &target, message, author)?)
    }

    // ==================== History ====================

    /// Document-level changes from `from` to `to`.
    pub fn diff(&self, from: &str, to: &str) -> DatabaseResult<Vec<Change>> {
        Ok(self.repo.diff(from, to)?)
    }

    /// Commits reachable from `to` but not from `from`, newest first.
    ///
    /// Lazy: the graph is walked as the iterator is consumed.
    pub fn log(&self, from: &str, to: &str) -> DatabaseResult<impl Iterator<Item = DatabaseResult<CommitInfo>>> {
        let walk = self.repo.log(from, to)?;
        Ok(walk.map(|step| step.map_err(DatabaseError::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::error::ErrorKind;
    use crate::storage::{ChangeKind, TreeHandle};
    use std::thread;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database) {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path().join("db")).unwrap();
        (dir, db)
    }

    fn alice() -> Author {
        Author::new("alice", "alice@example.com")
    }

    fn doc(key: &str, content: &str) -> Document {
        Document::new(key, content).unwrap()
    }

    fn content(db: &Database, branch: &str, key: &str) -> Option<String> {
        db.get(branch, key)
            .ok()
            .map(|d| String::from_utf8(d.content).unwrap())
    }

    fn head(db: &Database, branch: &str) -> CommitId {
        db.repo().resolve(branch).unwrap()
    }

    #[test]
    fn test_open_existing_and_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("db");

        let missing = Database::open_with_config(DatabaseConfig::new(&path).create_if_missing(false));
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::NotFound);

        let db = Database::open(&path).unwrap();
        db.save("master", "seed", doc("a", "1"), &alice()).unwrap();
        drop(db);

        let reopened = Database::open_with_config(DatabaseConfig::new(&path).create_if_missing(false)).unwrap();
        assert_eq!(content(&reopened, "master", "a").as_deref(), Some("1"));
    }

    #[test]
    fn test_custom_default_branch() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::new(dir.path().join("db")).default_branch("main");
        let db = Database::open_with_config(config).unwrap();

        let names: Vec<String> = db.list_branches().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["main"]);

        let bad = DatabaseConfig::new(dir.path().join("db2")).default_branch("no spaces");
        assert!(matches!(Database::open_with_config(bad), Err(DatabaseError::InvalidConfig(_))));
    }

    #[test]
    fn test_save_get_round_trip() {
        let (_dir, db) = setup();
        let before = head(&db, "master");

        let commit_id = db
            .save("master", "add alice", doc("users/alice", "{\"age\":30}"), &alice())
            .unwrap();

        assert_eq!(content(&db, "master", "users/alice").as_deref(), Some("{\"age\":30}"));
        let info = db.repo().get_commit(commit_id).unwrap();
        assert_eq!(info.parent_ids, vec![before]);
        assert_eq!(info.message, "add alice");
        assert_eq!(info.author, alice());
    }

    #[test]
    fn test_not_found_semantics() {
        let (_dir, db) = setup();

        assert_eq!(db.get("master", "nope").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.get("no-branch", "a").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            db.delete("master", "nope", "rm", &alice()).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(db.diff("master", "nowhere").unwrap_err().kind(), ErrorKind::NotFound);
        assert!(db.log("nowhere", "master").is_err());
        assert_eq!(db.delete_branch("ghost").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(db.delete_tag("ghost").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_invalid_keys() {
        let (_dir, db) = setup();
        assert_eq!(db.get("master", "../etc").unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(db.get("master", "").unwrap_err().kind(), ErrorKind::InvalidKey);
        assert_eq!(db.create_branch("bad name", "master").unwrap_err().kind(), ErrorKind::InvalidKey);

        db.save("master", "doc", doc("a", "1"), &alice()).unwrap();
        let through = db.save("master", "nested", doc("a/b", "2"), &alice()).unwrap_err();
        assert_eq!(through.kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_bad_author_is_rejected_before_writing() {
        let (dir, db) = setup();
        db.create_branch("feature", "master").unwrap();
        let before = head(&db, "master");

        for author in [Author::new("", ""), Author::new("Eve <evil>", "e@x")] {
            let err = db.save("master", "m", doc("a", "1"), &author).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidKey, "{err}");
            assert_eq!(db.delete("master", "a", "m", &author).unwrap_err().kind(), ErrorKind::InvalidKey);
            assert_eq!(db.merge("feature", "master", &author, "m").unwrap_err().kind(), ErrorKind::InvalidKey);
            assert_eq!(db.rebase("feature", "master", &author, "m").unwrap_err().kind(), ErrorKind::InvalidKey);

            let tx = db.create_transaction("master").unwrap();
            db.add(tx, doc("a", "1")).unwrap();
            let err = db.commit_transaction(tx, "m", &author).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidKey);
            assert!(db.transaction_info(tx).is_ok());
            db.commit_transaction(tx, "m", &alice()).unwrap();
            db.delete("master", "a", "reset", &alice()).unwrap();
        }
        assert_ne!(head(&db, "master"), before);
        assert_eq!(content(&db, "master", "a"), None);

        let config = DatabaseConfig::new(dir.path().join("other")).signature(Author::new("x", ""));
        let err = Database::open_with_config(config).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidConfig(_)), "{err}");
    }

    #[test]
    fn test_delete_document() {
        let (_dir, db) = setup();
        db.save("master", "add", doc("a", "1"), &alice()).unwrap();
        db.delete("master", "a", "remove a", &alice()).unwrap();
        assert_eq!(content(&db, "master", "a"), None);
    }

    #[test]
    fn test_list_and_paging() {
        let (_dir, db) = setup();
        let tx = db.create_transaction("master").unwrap();
        db.add_many(
            tx,
            ["users/c", "users/a", "users/b", "users/team/d", "orders/1"]
                .into_iter()
                .map(|k| doc(k, k)),
        )
        .unwrap();
        db.commit_transaction(tx, "seed", &alice()).unwrap();

        let keys = |docs: Vec<Document>| docs.into_iter().map(|d| d.key.into_string()).collect::<Vec<_>>();

        assert_eq!(
            keys(db.list("master", "users/").unwrap()),
            vec!["users/a", "users/b", "users/c", "users/team/d"]
        );
        assert_eq!(keys(db.list_paged("master", "users", 1, 2).unwrap()), vec!["users/b", "users/c"]);
        assert_eq!(keys(db.list_paged("master", "users", 3, 10).unwrap()), vec!["users/team/d"]);
        assert!(db.list_paged("master", "users", 4, 10).unwrap().is_empty());
        assert_eq!(db.list("master", "").unwrap().len(), 5);
        assert!(db.list("master", "missing").unwrap().is_empty());
    }

    #[test]
    fn test_branch_isolation() {
        let (_dir, db) = setup();
        db.save("master", "shared", doc("shared", "0"), &alice()).unwrap();
        db.create_branch("feature", "master").unwrap();

        db.save("feature", "only on feature", doc("f", "1"), &alice()).unwrap();
        db.save("master", "only on master", doc("m", "1"), &alice()).unwrap();

        assert_eq!(content(&db, "feature", "f").as_deref(), Some("1"));
        assert_eq!(content(&db, "master", "f"), None);
        assert_eq!(content(&db, "feature", "m"), None);
        assert_eq!(content(&db, "feature", "shared").as_deref(), Some("0"));

        assert_eq!(db.create_branch("feature", "master").unwrap_err().kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn test_transaction_is_atomic() {
        let (_dir, db) = setup();
        let before = head(&db, "master");

        let tx = db.create_transaction("master").unwrap();
        db.add(tx, doc("a", "1")).unwrap();
        db.add(tx, doc("b", "2")).unwrap();
        db.delete_in(tx, "never-existed").unwrap();

        // nothing visible before commit
        assert_eq!(content(&db, "master", "a"), None);
        assert_eq!(head(&db, "master"), before);

        let commit_id = db.commit_transaction(tx, "two docs", &alice()).unwrap();
        assert_eq!(db.repo().get_commit(commit_id).unwrap().parent_ids, vec![before]);
        assert_eq!(content(&db, "master", "a").as_deref(), Some("1"));
        assert_eq!(content(&db, "master", "b").as_deref(), Some("2"));

        // the transaction is gone
        assert_eq!(db.add(tx, doc("c", "3")).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_many_in_transaction() {
        let (_dir, db) = setup();
        for key in ["logs/1", "logs/2", "keep"] {
            db.save("master", "seed", doc(key, "x"), &alice()).unwrap();
        }

        let tx = db.create_transaction("master").unwrap();
        db.delete_many_in(tx, ["logs/1", "logs/2"]).unwrap();
        assert_eq!(db.transaction_info(tx).unwrap().staged_writes, 2);
        db.commit_transaction(tx, "drop logs", &alice()).unwrap();

        assert!(db.list("master", "logs").unwrap().is_empty());
        assert_eq!(content(&db, "master", "keep").as_deref(), Some("x"));

        let tx = db.create_transaction("master").unwrap();
        assert_eq!(
            db.delete_many_in(tx, ["ok", "../bad"]).unwrap_err().kind(),
            ErrorKind::InvalidKey
        );
        assert_eq!(db.transaction_info(tx).unwrap().staged_writes, 0);
    }

    #[test]
    fn test_abort_leaves_branch_unchanged() {
        let (_dir, db) = setup();
        let before = head(&db, "master");

        let tx = db.create_transaction("master").unwrap();
        db.add(tx, doc("a", "1")).unwrap();
        db.abort_transaction(tx).unwrap();

        assert_eq!(head(&db, "master"), before);
        assert_eq!(db.abort_transaction(tx).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_optimistic_conflict() {
        let (_dir, db) = setup();
        let tx1 = db.create_transaction("master").unwrap();
        let tx2 = db.create_transaction("master").unwrap();
        db.add(tx1, doc("x", "1")).unwrap();
        db.add(tx2, doc("y", "2")).unwrap();

        let winner = db.commit_transaction(tx1, "first", &alice()).unwrap();
        let err = db.commit_transaction(tx2, "second", &alice()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());
        assert_eq!(head(&db, "master"), winner);
        assert_eq!(content(&db, "master", "y"), None);
    }

    #[test]
    fn test_transaction_on_missing_branch() {
        let (_dir, db) = setup();
        assert_eq!(db.create_transaction("ghost").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_delete_branch_closes_its_transactions() {
        let (_dir, db) = setup();
        db.create_branch("feature", "master").unwrap();
        let on_feature = db.create_transaction("feature").unwrap();
        let on_master = db.create_transaction("master").unwrap();

        db.delete_branch("feature").unwrap();

        assert_eq!(db.transaction_info(on_feature).unwrap_err().kind(), ErrorKind::NotFound);
        assert!(db.transaction_info(on_master).is_ok());
        assert_eq!(db.close_transactions("master").unwrap(), 1);
    }

    #[test]
    fn test_concurrent_saves_all_land() {
        let (_dir, db) = setup();

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let db = db.clone();
                thread::spawn(move || {
                    for j in 0..3 {
                        let key = format!("w{i}/{j}");
                        db.save("master", "concurrent", doc(&key, "x"), &alice()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(db.list("master", "").unwrap().len(), 9);
    }

    #[test]
    fn test_fast_forward_merge() {
        let (_dir, db) = setup();
        db.create_branch("feature", "master").unwrap();
        let feature_head = db.save("feature", "work", doc("f", "1"), &alice()).unwrap();

        let outcome = db.merge("feature", "master", &alice(), "merge feature").unwrap();

        assert_eq!(outcome, MergeOutcome::FastForward(feature_head));
        assert_eq!(head(&db, "master"), feature_head);
    }

    #[test]
    fn test_three_way_merge() {
        let (_dir, db) = setup();
        db.create_branch("feature", "master").unwrap();
        let feature_head = db.save("feature", "theirs", doc("f", "1"), &alice()).unwrap();
        let master_head = db.save("master", "ours", doc("m", "1"), &alice()).unwrap();

        let outcome = db.merge("feature", "master", &alice(), "merge feature").unwrap();
        let MergeOutcome::Merged(merge_id) = outcome else {
            panic!("expected merge commit, got {outcome:?}");
        };

        let info = db.repo().get_commit(merge_id).unwrap();
        assert_eq!(info.parent_ids, vec![master_head, feature_head]);
        assert_eq!(content(&db, "master", "f").as_deref(), Some("1"));
        assert_eq!(content(&db, "master", "m").as_deref(), Some("1"));
        assert_eq!(head(&db, "feature"), feature_head);

        // merging again changes nothing
        let again = db.merge("feature", "master", &alice(), "merge feature").unwrap();
        assert_eq!(again, MergeOutcome::UpToDate(merge_id));
    }

    #[test]
    fn test_merge_conflict_leaves_refs() {
        let (_dir, db) = setup();
        db.save("master", "base", doc("doc", "base"), &alice()).unwrap();
        db.create_branch("feature", "master").unwrap();
        let feature_head = db.save("feature", "theirs", doc("doc", "feature"), &alice()).unwrap();
        let master_head = db.save("master", "ours", doc("doc", "master"), &alice()).unwrap();

        let err = db.merge("feature", "master", &alice(), "merge").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MergeConflict);
        assert!(!err.is_retryable());
        assert_eq!(err.conflicting_paths(), Some(&["doc".to_string()][..]));

        assert_eq!(head(&db, "master"), master_head);
        assert_eq!(head(&db, "feature"), feature_head);
    }

    #[test]
    fn test_rebase() {
        let (_dir, db) = setup();
        db.save("master", "base", doc("base", "0"), &alice()).unwrap();
        db.create_branch("feature", "master").unwrap();
        let f1 = db.save("feature", "feature one", doc("f1", "1"), &alice()).unwrap();
        let f2 = db.save("feature", "feature two", doc("f2", "2"), &alice()).unwrap();
        let master_head = db.save("master", "master moves", doc("m", "1"), &alice()).unwrap();

        let bob = Author::new("bob", "bob@example.com");
        let outcome = db.rebase("feature", "master", &bob, "rebase feature").unwrap();
        assert_eq!(outcome.replayed, 2);
        assert_eq!(head(&db, "master"), outcome.head);
        assert_eq!(head(&db, "feature"), f2);

        let log: Vec<CommitInfo> = db
            .log(&master_head.to_string(), "master")
            .unwrap()
            .collect::<DatabaseResult<_>>()
            .unwrap();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|c| c.id != f1 && c.id != f2));
        assert!(log.iter().all(|c| c.author == alice() && c.committer == bob));
        assert_eq!(log[1].parent_ids, vec![master_head]);
        assert_eq!(log[0].parent_ids, vec![log[1].id]);

        assert_eq!(content(&db, "master", "f2").as_deref(), Some("2"));
    }

    #[test]
    fn test_rebase_conflict_leaves_refs() {
        let (_dir, db) = setup();
        db.save("master", "base", doc("doc", "0"), &alice()).unwrap();
        db.create_branch("feature", "master").unwrap();
        db.save("feature", "theirs", doc("doc", "feature"), &alice()).unwrap();
        let master_head = db.save("master", "ours", doc("doc", "master"), &alice()).unwrap();

        let err = db.rebase("feature", "master", &alice(), "rebase").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MergeConflict);
        assert_eq!(head(&db, "master"), master_head);
    }

    #[test]
    fn test_diff() {
        let (_dir, db) = setup();
        db.save("master", "seed", doc("keep", "k"), &alice()).unwrap();
        db.save("master", "seed", doc("edit", "v1"), &alice()).unwrap();
        db.save("master", "seed", doc("gone", "g"), &alice()).unwrap();
        db.create_branch("next", "master").unwrap();

        db.save("next", "edit", doc("edit", "v2"), &alice()).unwrap();
        db.delete("next", "gone", "drop", &alice()).unwrap();
        db.save("next", "add", doc("new", "n"), &alice()).unwrap();

        let changes: Vec<(String, ChangeKind)> = db
            .diff("master", "next")
            .unwrap()
            .into_iter()
            .map(|c| (c.path, c.kind))
            .collect();
        assert_eq!(
            changes,
            vec![
                ("edit".to_string(), ChangeKind::Modified),
                ("gone".to_string(), ChangeKind::Deleted),
                ("new".to_string(), ChangeKind::Added),
            ]
        );
        assert!(db.diff("master", "master").unwrap().is_empty());
    }

    #[test]
    fn test_log_newest_first_excludes_ancestor() {
        let (_dir, db) = setup();
        db.create_branch("feature", "master").unwrap();
        let c1 = db.save("feature", "one", doc("a", "1"), &alice()).unwrap();
        let c2 = db.save("feature", "two", doc("b", "2"), &alice()).unwrap();

        let ids: Vec<CommitId> = db
            .log("master", "feature")
            .unwrap()
            .map(|c| c.unwrap().id)
            .collect();
        assert_eq!(ids, vec![c2, c1]);

        assert_eq!(db.log("feature", "master").unwrap().count(), 0);
    }

    #[test]
    fn test_tags_survive_branch_moves_and_deletion() {
        let (_dir, db) = setup();
        let tagged = db.save("master", "v1 content", doc("a", "v1"), &alice()).unwrap();
        db.create_tag("v1", "master").unwrap();
        assert_eq!(db.create_tag("v1", "master").unwrap_err().kind(), ErrorKind::AlreadyExists);

        db.save("master", "v2 content", doc("a", "v2"), &alice()).unwrap();
        assert_eq!(head(&db, "v1"), tagged);

        // a branch from the tag sees the old content
        db.create_branch("hotfix", "v1").unwrap();
        assert_eq!(content(&db, "hotfix", "a").as_deref(), Some("v1"));

        db.delete_tag("v1").unwrap();
        assert!(db.repo().get_commit(tagged).is_ok());
        assert_eq!(head(&db, &tagged.to_string()), tagged);
    }

    #[test]
    fn test_content_addressing_is_idempotent() {
        let (_dir, db) = setup();
        db.save("master", "one", doc("a", "same bytes"), &alice()).unwrap();
        db.save("master", "two", doc("b", "same bytes"), &alice()).unwrap();

        let tip = head(&db, "master");
        let (a, b) = db
            .repo()
            .with_repo(|repo| {
                let tree = TreeHandle::at_commit(repo, tip)?;
                let a = tree.blob_at(&DocumentKey::new("a").unwrap());
                let b = tree.blob_at(&DocumentKey::new("b").unwrap());
                Ok((a, b))
            })
            .unwrap();
        assert!(a.is_some());
        assert_eq!(a, b);

        // the same tree saved twice yields the same snapshot
        let before = db.repo().get_commit(head(&db, "master")).unwrap().tree_id;
        db.save("master", "rewrite", doc("a", "same bytes"), &alice()).unwrap();
        let after = db.repo().get_commit(head(&db, "master")).unwrap().tree_id;
        assert_eq!(before, after);
    }
}
