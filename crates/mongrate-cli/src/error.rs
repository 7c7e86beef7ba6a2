//! CLI error types.

use crate::config::ConfigError;
use mongrate_core::{MongrateError, RepositoryError};
use thiserror::Error;

/// Errors surfaced to the operator.
#[derive(Debug, Error)]
pub enum CliError {
    /// Engine error.
    #[error(transparent)]
    Core(#[from] MongrateError),

    /// Repository error.
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The migrate action was called without a target.
    #[error("the migrate action requires --git-hash")]
    MissingTarget,

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
