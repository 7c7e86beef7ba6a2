//! mongrate core - git-driven migration orchestration for document databases.
//!
//! Decides which migrations a database needs to reach a target commit, orders
//! them by their declared dependencies, runs them through a [`MigrationRunner`]
//! and undoes the applied ones when one fails.
//!
//! # Example
//!
//! ```ignore
//! use mongrate_core::{Console, EngineConfig, ExecutionEngine, GitRepository, MigrationPaths, StatusStore};
//! use mongrate_core::runner::ShellRunner;
//!
//! let database = "mongodb://localhost/app";
//! let repo = GitRepository::open("/srv/app")?;
//! let runner = ShellRunner::new(Console::default())?;
//! let status = StatusStore::console(Console::default(), database);
//!
//! let config = EngineConfig::new(database, MigrationPaths::new("migrations/common"));
//! let report = ExecutionEngine::new(&repo, &runner, &status, config).migrate("v1.4.0")?;
//! println!("applied {:?}", report.executed);
//! ```

pub mod changeset;
pub mod console;
pub mod definition;
pub mod error;
pub mod executor;
pub mod registry;
pub mod repository;
pub mod resolver;
pub mod runner;
pub mod status;
pub mod template;

pub use changeset::{ChangeSet, MigrationPaths};
pub use console::{Console, ConsoleError, DEFAULT_SHELL};
pub use definition::{Direction, MigrationDefinition, RunContext, NO_COMMIT};
pub use error::{CompensationReport, MongrateError};
pub use executor::{EngineConfig, ExecutionEngine, RunPhase, RunReport};
pub use registry::{MigrationRegistry, WorkingSet};
pub use repository::{ChangeAction, Commit, FileChange, GitRepository, Repository, RepositoryError};
pub use runner::{ApplyError, ApplyRequest, LoadError, LoadRequest, MigrationRunner};
pub use status::{ConsoleBackend, SledBackend, StatusBackend, StatusSnapshot, StatusStore};
