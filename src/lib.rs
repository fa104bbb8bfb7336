//! docgit - a transactional document database stored as a Git object graph
//!
//! Documents are blobs addressed by slash-separated keys, branches are
//! independent lines of history, and every write is a commit. Writers stage
//! changes in transactions that commit atomically with a compare-and-swap on
//! the branch head.
//!
//! # Example
//!
//! ```no_run
//! use docgit::db::Database;
//! use docgit::storage::{Author, Document};
//!
//! let db = Database::open("./my_database").unwrap();
//! let author = Author::new("Alice", "alice@example.com");
//!
//! let doc = Document::new("users/alice", "{\"name\":\"Alice\"}").unwrap();
//! db.save("master", "add alice", doc, &author).unwrap();
//!
//! let tx = db.create_transaction("master").unwrap();
//! db.add(tx, Document::new("users/bob", "{}").unwrap()).unwrap();
//! db.delete_in(tx, "users/alice").unwrap();
//! db.commit_transaction(tx, "swap users", &author).unwrap();
//! ```

pub mod db;
pub mod storage;
pub mod transaction;
