//! core type-safe wrappers around git primitives for the storage layer.

use std::fmt;
use std::fmt::Formatter;

use chrono::{DateTime, Utc};
use git2::Oid;
use serde::{Serialize, Serializer};

/// This makes sure we don't accidentally pass a blob ID where a commit ID
/// is expected. The inner Oid is only accessible within the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommitId(pub(crate) Oid);

impl CommitId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    /// raw Oid (for internal use only)
    pub(crate) fn raw(&self) -> Oid {
        self.0
    }

    /// parse CommitId from a hex string
    pub fn from_hex(hex: &str) -> Result<Self, git2::Error> {
        Oid::from_str(hex).map(CommitId)
    }

    /// short form of the commit ID
    pub fn short(&self) -> String {
        self.0.to_string()[..7].to_string()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git blob identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobId(pub(crate) Oid);

impl BlobId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Git tree identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeId(pub(crate) Oid);

impl TreeId {
    pub(crate) fn new(oid: Oid) -> Self {
        Self(oid)
    }

    pub(crate) fn raw(&self) -> Oid {
        self.0
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! serialize_as_hex {
    ($($ty:ty),*) => {
        $(
            impl Serialize for $ty {
                fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    serializer.serialize_str(&self.0.to_string())
                }
            }
        )*
    };
}

serialize_as_hex!(CommitId, BlobId, TreeId);

/// A validated document key.
///
/// Keys are `/`-separated paths inside the commit tree. Every segment must be
/// non-empty and must not step outside the tree.
///
/// Valid keys:
/// - `users/alice.json`
/// - `readme`
///
/// Invalid keys:
/// - `` (empty), `/a`, `a/`, `a//b` (empty segments)
/// - `a/../b`, `./a` (relative segments)
/// - `.git/config` (reserved by git)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DocumentKey(String);

impl DocumentKey {
    /// Segment names git refuses to store in a tree.
    const RESERVED: &'static [&'static str] = &[".git"];

    /// create a new DocumentKey, validating the input
    pub fn new(key: impl Into<String>) -> Result<Self, InvalidNameError> {
        let key = key.into();
        Self::validate(&key)?;
        Ok(Self(key))
    }

    fn validate(key: &str) -> Result<(), InvalidNameError> {
        if key.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if let Some(position) = key.find('\0') {
            return Err(InvalidNameError::InvalidCharacter { char: '\0', position });
        }

        for segment in key.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(InvalidNameError::InvalidPath(key.to_string()));
            }
            if Self::RESERVED.contains(&segment.to_lowercase().as_str()) {
                return Err(InvalidNameError::Reserved(segment.to_string()));
            }
        }

        Ok(())
    }

    /// wrap a path read back out of a stored tree
    pub(crate) fn from_tree_path(path: String) -> Self {
        Self(path)
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// iterate over the path segments
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// convert to owned String
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for DocumentKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A document: a key and the raw bytes stored under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub key: DocumentKey,
    pub content: Vec<u8>,
}

impl Document {
    /// create a document, validating the key
    pub fn new(key: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self, InvalidNameError> {
        Ok(Self {
            key: DocumentKey::new(key)?,
            content: content.into(),
        })
    }

    /// content as UTF-8, if it is valid UTF-8
    pub fn content_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }
}

/// A single staged write: new content for a key, or a tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Write {
    Put(Document),
    Delete(DocumentKey),
}

impl Write {
    /// the key this write targets
    pub fn key(&self) -> &DocumentKey {
        match self {
            Write::Put(doc) => &doc.key,
            Write::Delete(key) => key,
        }
    }
}

/// a branch name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BranchName(String);

impl BranchName {
    /// the branch a new repository starts with
    pub const DEFAULT: &'static str = "master";

    /// create a new BranchName
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_ref_name(&name, "refs/heads/")?;
        Ok(Self(name))
    }

    /// get the full ref path (e.g., "refs/heads/master")
    pub fn as_ref_path(&self) -> String {
        format!("refs/heads/{}", self.0)
    }

    /// get the short name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// a tag name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TagName(String);

impl TagName {
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        validate_ref_name(&name, "refs/tags/")?;
        Ok(Self(name))
    }

    /// get the full ref path (e.g., "refs/tags/v1")
    pub fn as_ref_path(&self) -> String {
        format!("refs/tags/{}", self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_ref_name(name: &str, namespace: &str) -> Result<(), InvalidNameError> {
    if name.is_empty() {
        return Err(InvalidNameError::Empty);
    }
    // git is the final word on what a ref may be called
    if !git2::Reference::is_valid_name(&format!("{namespace}{name}")) {
        return Err(InvalidNameError::InvalidPath(name.to_string()));
    }
    Ok(())
}

/// identity recorded on commits (author/committer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// create a new author
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// identity used for commits the database makes on its own behalf
    pub fn docgit() -> Self {
        Self::new("docgit", "docgit@localhost")
    }

    /// reject identities git cannot record: blank fields or angle brackets
    pub fn validate(&self) -> Result<(), InvalidNameError> {
        for field in [&self.name, &self.email] {
            if field.trim().is_empty() {
                return Err(InvalidNameError::Empty);
            }
            if let Some((position, char)) = field.char_indices().find(|&(_, c)| c == '<' || c == '>') {
                return Err(InvalidNameError::InvalidCharacter { char, position });
            }
        }
        Ok(())
    }

    /// convert to git2::Signature at the given instant
    pub(crate) fn to_git2_signature(&self, at: DateTime<Utc>) -> Result<git2::Signature<'static>, git2::Error> {
        git2::Signature::new(&self.name, &self.email, &git2::Time::new(at.timestamp(), 0))
    }
}

impl Default for Author {
    fn default() -> Self {
        Self::docgit()
    }
}

/// A named pointer to a commit, as reported by branch listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub name: String,
    pub target: CommitId,
}

/// error type for invalid names (keys, branches, tags)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// represents a document-level change between two commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: String,
    pub kind: ChangeKind,
    /// blob at `path` before the change (None when added)
    pub old: Option<BlobId>,
    /// blob at `path` after the change (None when deleted)
    pub new: Option<BlobId>,
}

/// the type of change in a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let tag = match self {
            ChangeKind::Added => "A",
            ChangeKind::Modified => "M",
            ChangeKind::Deleted => "D",
        };
        f.write_str(tag)
    }
}
