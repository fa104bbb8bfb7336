//! storage layer for docgit
//!
//! this module provides a complete abstraction over git for document storage.
//! The upper layers (transaction manager, database facade) use this API and
//! never touch git2 directly.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │  (documents, branches, tags, merge, rebase, diff, log)      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌──────────────┬──────┴───────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐
//!  │   refs    │  │   merge   │  │   diff    │  │    log    │
//!  │ (branches │  │ (3-way,   │  │ (changed  │  │ (graph    │
//!  │  & tags)  │  │  rebase)  │  │  paths)   │  │  walks)   │
//!  └───────────┘  └───────────┘  └───────────┘  └───────────┘
//!                       │
//!                       ▼
//!  ┌───────────┐  ┌───────────┐
//!  │  commit   │─▶│   tree    │
//!  │ (builder) │  │ (mutator) │
//!  └───────────┘  └───────────┘
//!        │              │
//!        └──────┬───────┘
//!               ▼
//!        ┌─────────────┐
//!        │   object    │
//!        │ (blob, tree │
//!        │   commit)   │
//!        └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use docgit::storage::{Author, BranchName, Document, GitRepository, Write};
//!
//! let master = BranchName::new("master")?;
//! let repo = GitRepository::open_or_init("./my_database", &master, &Author::docgit())?;
//!
//! let head = repo.resolve_branch(&master)?;
//! let doc = Document::new("users/alice", r#"{"age": 30}"#)?;
//! repo.commit_to_branch(&master, head, &[Write::Put(doc)], "add alice", &Author::docgit())?;
//!
//! let alice = repo.read_document(&master, &DocumentKey::new("users/alice")?)?;
//! ```

mod commit;
mod diff;
mod error;
mod log;
mod merge;
mod object;
mod refs;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use commit::{build, create_initial_commit, CommitBuilder};
pub use diff::{diff_commits, diff_trees};
pub use error::{StorageError, StorageResult};
pub use log::{ancestors, is_ancestor, merge_base, replay_order, unique_commits, LogIter};
pub use merge::{merge, rebase, MergeOutcome, RebaseOutcome};
pub use object::{
    empty_tree, get_blob, get_commit, get_tree, put_blob, put_commit, put_tree, CommitInfo, CommitMeta,
    EntryTarget, TreeEntry,
};
pub use refs::RefManager;
pub use repository::GitRepository;
pub use tree::{TreeHandle, TreeMutator};
pub use types::{
    Author, BlobId, BranchName, Change, ChangeKind, CommitId, Document, DocumentKey, InvalidNameError,
    Reference, TagName, TreeId, Write,
};
