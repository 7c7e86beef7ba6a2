//! Version-controlled repository the migrations live in.

mod git;

pub use git::GitRepository;

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Repository errors.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Git error.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// A revision could not be resolved to a commit.
    #[error("cannot resolve revision {0}")]
    UnknownRevision(String),

    /// A path does not exist in a commit's tree.
    #[error("{} does not exist at commit {commit}", path.display())]
    MissingFile { commit: String, path: PathBuf },
}

/// A commit in the linearized history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Full commit id.
    pub id: String,
    /// First line of the commit message.
    pub summary: String,
}

impl Commit {
    pub fn new(id: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            summary: summary.into(),
        }
    }
}

/// Kind of change a diff reports for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Added,
    Modified,
    Deleted,
}

impl std::fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeAction::Added => write!(f, "A"),
            ChangeAction::Modified => write!(f, "M"),
            ChangeAction::Deleted => write!(f, "D"),
        }
    }
}

/// One path reported by a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub action: ChangeAction,
    /// Path relative to the repository root.
    pub path: PathBuf,
}

impl FileChange {
    pub fn new(action: ChangeAction, path: impl Into<PathBuf>) -> Self {
        Self {
            action,
            path: path.into(),
        }
    }
}

/// Source of commit history and diffs.
///
/// History must be linear; branch and merge topologies are not interpreted.
pub trait Repository {
    /// Resolve a revision (hash, abbreviated hash, tag, branch) to a commit id.
    fn resolve(&self, rev: &str) -> Result<String, RepositoryError>;

    /// Commits reachable from the checkout, most recent first.
    fn commits(&self) -> Result<Vec<Commit>, RepositoryError>;

    /// Changes between two commits. `from == None` diffs against the empty tree.
    fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<FileChange>, RepositoryError>;

    /// Changes a single commit introduced relative to its parent.
    fn show(&self, commit: &str) -> Result<Vec<FileChange>, RepositoryError>;

    /// Content of a repository-relative file as committed, independent of
    /// the working tree.
    fn read(&self, commit: &str, path: &Path) -> Result<Vec<u8>, RepositoryError>;
}
