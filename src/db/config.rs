//! Database configuration.

use std::path::PathBuf;

use crate::storage::{Author, BranchName};

/// Options for `Database::open_with_config`.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the bare repository.
    pub path: PathBuf,
    /// Initialize a fresh repository when none exists at `path`.
    pub create_if_missing: bool,
    /// Branch a new repository starts with.
    pub default_branch: String,
    /// Identity recorded on commits the database makes on its own behalf.
    pub signature: Author,
    /// How often a single-document save or delete retries a lost
    /// compare-and-swap before reporting a conflict.
    pub write_retries: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".docgit"),
            create_if_missing: true,
            default_branch: BranchName::DEFAULT.to_string(),
            signature: Author::docgit(),
            write_retries: 10,
        }
    }
}

impl DatabaseConfig {
    /// Defaults for everything but the repository path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn default_branch(mut self, name: impl Into<String>) -> Self {
        self.default_branch = name.into();
        self
    }

    pub fn signature(mut self, signature: Author) -> Self {
        self.signature = signature;
        self
    }

    pub fn write_retries(mut self, retries: u32) -> Self {
        self.write_retries = retries;
        self
    }
}
