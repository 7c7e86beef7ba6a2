//! The collaborator that executes migration code against the database.
//!
//! The engine only hands over structural requests; how a runner reaches the
//! database is private to it.

mod shell;

pub use shell::ShellRunner;

use crate::console::ConsoleError;
use crate::definition::{Direction, MigrationDefinition, RunContext};
use std::path::Path;
use thiserror::Error;

/// Why a migration file could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file does not export a migration with an id.
    #[error("exports object is missing or has no id")]
    MissingId,

    /// The runner could not be started.
    #[error("failed to start runner: {0}")]
    Io(#[from] std::io::Error),

    /// The runner exited unsuccessfully.
    #[error("runner exited with status {status:?}: {stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },

    /// The runner's output did not describe a migration.
    #[error("malformed migration description: {0}")]
    Malformed(String),
}

impl From<ConsoleError> for LoadError {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Io(e) => LoadError::Io(e),
            ConsoleError::Failed { status, stderr } => LoadError::Failed { status, stderr },
            ConsoleError::Malformed(msg) => LoadError::Malformed(msg),
        }
    }
}

/// Why a migration action failed.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The runner could not be started.
    #[error("failed to start runner: {0}")]
    Io(#[from] std::io::Error),

    /// The action raised or the runner exited unsuccessfully.
    #[error("runner exited with status {status:?}: {stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },
}

impl From<ConsoleError> for ApplyError {
    fn from(err: ConsoleError) -> Self {
        match err {
            ConsoleError::Io(e) => ApplyError::Io(e),
            ConsoleError::Failed { status, stderr } => ApplyError::Failed { status, stderr },
            ConsoleError::Malformed(msg) => ApplyError::Failed {
                status: None,
                stderr: msg,
            },
        }
    }
}

/// Request to load one migration file.
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest<'a> {
    /// Repository-relative path.
    pub path: &'a Path,
    /// File content at the run's source commit.
    pub script: &'a str,
    pub context: &'a RunContext,
}

/// Request to run one action of a loaded migration.
#[derive(Debug, Clone, Copy)]
pub struct ApplyRequest<'a> {
    pub migration: &'a MigrationDefinition,
    pub direction: Direction,
    pub context: &'a RunContext,
}

/// Executes migration code.
///
/// Calls block until the migration code returns. There is no timeout or
/// cancellation at this level.
pub trait MigrationRunner {
    /// Evaluate a file, run its onLoad hook and return its definition.
    fn load(&self, request: &LoadRequest<'_>) -> Result<MigrationDefinition, LoadError>;

    /// Run the up or down action of a migration.
    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError>;
}

impl<T: MigrationRunner + ?Sized> MigrationRunner for &T {
    fn load(&self, request: &LoadRequest<'_>) -> Result<MigrationDefinition, LoadError> {
        (**self).load(request)
    }

    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError> {
        (**self).apply(request)
    }
}
