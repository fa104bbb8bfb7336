//! Transaction management for docgit.
//!
//! A transaction stages document writes against the head a branch had when
//! the transaction began. Committing turns every staged write into a single
//! commit and moves the branch with a compare-and-swap; if another writer got
//! there first the commit fails with a conflict instead of overwriting their
//! work.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   TransactionManager                        │
//! │     (id -> open transaction table, one mutex per entry)     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!       ┌─────────────┐                 ┌─────────────┐
//!       │ Transaction │                 │GitRepository│
//!       │  (staged    │                 │ (build +    │
//!       │   writes)   │                 │  ref CAS)   │
//!       └─────────────┘                 └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use docgit::transaction::TransactionManager;
//!
//! let manager = TransactionManager::new(repo);
//!
//! let tx = manager.create(&branch)?;
//! manager.add(tx, Document::new("users/alice", "{}")?)?;
//! manager.delete(tx, DocumentKey::new("users/bob")?)?;
//!
//! manager.commit(tx, "update users", &author)?;  // or manager.abort(tx)?
//! ```

mod context;
mod error;
mod manager;

pub use context::{Transaction, TransactionId, TransactionInfo};
pub use error::{TransactionError, TransactionResult};
pub use manager::TransactionManager;
