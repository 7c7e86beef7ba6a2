//! Core error types.

use crate::console::ConsoleError;
use crate::definition::Direction;
use crate::repository::RepositoryError;
use std::path::PathBuf;
use thiserror::Error;

/// Outcome of the compensation pass that follows a failed migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompensationReport {
    /// Migrations whose opposite action succeeded, in the order they were reverted.
    pub reverted: Vec<String>,
    /// Migrations whose opposite action failed, with the reason.
    pub failures: Vec<(String, String)>,
}

impl CompensationReport {
    /// True when every already-applied migration was reverted.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl std::fmt::Display for CompensationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_complete() {
            write!(f, "fully compensated, {} reverted", self.reverted.len())
        } else {
            let failed: Vec<&str> = self.failures.iter().map(|(id, _)| id.as_str()).collect();
            write!(
                f,
                "partially compensated, {} reverted, could not revert [{}]",
                self.reverted.len(),
                failed.join(", ")
            )
        }
    }
}

/// Errors produced by the migration orchestration engine.
#[derive(Debug, Error)]
pub enum MongrateError {
    /// The status collection has not been initialized.
    #[error("database is not managed by mongrate, run the initialize action first")]
    NotManaged,

    /// Initialize was called on a managed database without force.
    #[error("database is already managed by mongrate (recorded commit {commit}), use force to reset")]
    AlreadyManaged {
        /// The commit currently recorded.
        commit: String,
    },

    /// A commit could not be found in the repository history.
    #[error("commit {commit} is not part of the repository history")]
    UnknownCommit {
        /// The commit that was looked up.
        commit: String,
    },

    /// A migration file could not be loaded or lacks an id.
    #[error("invalid migration {}: {reason}", path.display())]
    InvalidMigration {
        /// Repository-relative path of the file.
        path: PathBuf,
        /// Why the file was rejected.
        reason: String,
    },

    /// Two files in the same run declare the same id.
    #[error("duplicate migration id {id} in {} (already defined in {})", second.display(), first.display())]
    DuplicateMigration {
        /// The conflicting id.
        id: String,
        /// File that registered the id first.
        first: PathBuf,
        /// File that tried to register it again.
        second: PathBuf,
    },

    /// The runAfter graph contains a cycle.
    #[error("cyclic dependency between migrations [{}]", ids.join(", "))]
    CyclicDependency {
        /// Ids that could not be ordered.
        ids: Vec<String>,
    },

    /// A migration failed while executing and the run was compensated.
    #[error("migration {migration_id} failed running {direction}: {reason} ({compensation})")]
    ApplyFailed {
        /// The migration that failed.
        migration_id: String,
        /// The action that failed.
        direction: Direction,
        /// Error reported by the runner.
        reason: String,
        /// What happened to the migrations applied before the failure.
        compensation: CompensationReport,
    },

    /// A migration template already exists at the target path.
    #[error("migration file {} already exists", path.display())]
    TemplateExists {
        /// Path that would have been overwritten.
        path: PathBuf,
    },

    /// Template rendering error.
    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    /// Repository error.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Console error while reading or writing the status collection.
    #[error("status collection error: {0}")]
    Console(#[from] ConsoleError),

    /// A status document does not have the expected shape.
    #[error("malformed status document: {0}")]
    MalformedStatus(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Status document could not be encoded or decoded.
    #[error("status document error: {0}")]
    Document(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
