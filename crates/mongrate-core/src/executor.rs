//! Execution engine - drives one migration run.
//!
//! A run moves through `Loading → Ordering → Executing` and ends in `Done`,
//! or in `Compensating → Compensated` when a migration fails. Only `Done`
//! writes to the status store.

use crate::changeset::{self, MigrationPaths};
use crate::definition::{Direction, MigrationDefinition, RunContext};
use crate::error::{CompensationReport, MongrateError};
use crate::registry::MigrationRegistry;
use crate::repository::{Repository, RepositoryError};
use crate::resolver;
use crate::runner::{ApplyError, ApplyRequest, MigrationRunner};
use crate::status::StatusStore;

/// Execution engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Handle of the target database, passed to the runner.
    pub database: String,
    /// Directories migrations are discovered in.
    pub paths: MigrationPaths,
    /// Log mutations instead of performing them.
    pub dry_run: bool,
}

impl EngineConfig {
    pub fn new(database: impl Into<String>, paths: MigrationPaths) -> Self {
        Self {
            database: database.into(),
            paths,
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// State of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Loading,
    Ordering,
    Executing,
    Done,
    Compensating,
    Compensated,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Loading => write!(f, "loading"),
            RunPhase::Ordering => write!(f, "ordering"),
            RunPhase::Executing => write!(f, "executing"),
            RunPhase::Done => write!(f, "done"),
            RunPhase::Compensating => write!(f, "compensating"),
            RunPhase::Compensated => write!(f, "compensated"),
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Commit recorded before the run.
    pub from: String,
    /// Commit the run migrated to.
    pub target: String,
    pub direction: Direction,
    /// Execution order.
    pub order: Vec<String>,
    /// Migrations that ran, in order.
    pub executed: Vec<String>,
    /// Phases the run went through.
    pub phases: Vec<RunPhase>,
    pub dry_run: bool,
}

/// Drives migration runs against one database.
pub struct ExecutionEngine<'a, R: Repository + ?Sized, M: MigrationRunner + ?Sized> {
    repo: &'a R,
    runner: &'a M,
    status: &'a StatusStore,
    config: EngineConfig,
}

impl<'a, R: Repository + ?Sized, M: MigrationRunner + ?Sized> ExecutionEngine<'a, R, M> {
    pub fn new(repo: &'a R, runner: &'a M, status: &'a StatusStore, config: EngineConfig) -> Self {
        Self {
            repo,
            runner,
            status,
            config,
        }
    }

    /// Bring the database to `target`, a revision the repository can resolve.
    pub fn migrate(&self, target: &str) -> Result<RunReport, MongrateError> {
        if !self.status.is_managed()? {
            return Err(MongrateError::NotManaged);
        }
        let from = self.status.current_commit()?;
        let target = self.repo.resolve(target).map_err(|e| match e {
            RepositoryError::UnknownRevision(rev) => MongrateError::UnknownCommit { commit: rev },
            other => other.into(),
        })?;

        let change_set = changeset::resolve(self.repo, &from, &target, &self.config.paths)?;
        let context = RunContext {
            target,
            from,
            direction: if change_set.rollback {
                Direction::Down
            } else {
                Direction::Up
            },
            database: self.config.database.clone(),
            dry_run: self.config.dry_run,
        };

        let mut phases = Vec::new();

        enter(&mut phases, RunPhase::Loading, &context);
        let mut registry = MigrationRegistry::new(self.repo, self.runner, &context);
        registry.register_all(&change_set.changes);
        let working = registry.finish()?;

        enter(&mut phases, RunPhase::Ordering, &context);
        let order = resolver::execution_order(&working, context.is_rollback())?;
        tracing::info!(order = ?order, "execution order");

        enter(&mut phases, RunPhase::Executing, &context);
        let mut ledger: Vec<&MigrationDefinition> = Vec::with_capacity(order.len());
        for id in &order {
            let Some(migration) = working.get(id) else {
                continue;
            };
            if let Err(e) = self.apply(migration, context.direction, &context) {
                tracing::error!(migration = %id, direction = %context.direction, error = %e, "migration failed");
                enter(&mut phases, RunPhase::Compensating, &context);
                let compensation = self.compensate(&ledger, &context);
                enter(&mut phases, RunPhase::Compensated, &context);
                if !compensation.is_complete() {
                    tracing::error!(%compensation, "database left partially migrated");
                }
                return Err(MongrateError::ApplyFailed {
                    migration_id: id.clone(),
                    direction: context.direction,
                    reason: e.to_string(),
                    compensation,
                });
            }
            ledger.push(migration);
        }

        let executed: Vec<String> = ledger.iter().map(|m| m.id.clone()).collect();
        if context.from == context.target {
            tracing::info!(commit = %context.target, "already at target, status left untouched");
        } else if context.dry_run {
            tracing::info!(commit = %context.target, "dry-run: would record commit");
        } else {
            let detail = serde_json::json!({
                "from": context.from,
                "to": context.target,
                "direction": context.direction,
                "migrations": executed,
            });
            self.status.record_commit(&context.target, detail)?;
        }
        enter(&mut phases, RunPhase::Done, &context);

        Ok(RunReport {
            from: context.from,
            target: context.target,
            direction: context.direction,
            order,
            executed,
            phases,
            dry_run: context.dry_run,
        })
    }

    fn apply(
        &self,
        migration: &MigrationDefinition,
        direction: Direction,
        context: &RunContext,
    ) -> Result<(), ApplyError> {
        if context.dry_run {
            tracing::info!(migration = %migration.id, %direction, "dry-run: would apply migration");
            return Ok(());
        }
        tracing::info!(migration = %migration.id, %direction, "applying migration");
        self.runner.apply(&ApplyRequest {
            migration,
            direction,
            context,
        })
    }

    /// Undo the ledger in reverse, continuing past failures.
    fn compensate(&self, ledger: &[&MigrationDefinition], context: &RunContext) -> CompensationReport {
        let direction = context.direction.opposite();
        let mut report = CompensationReport::default();
        for migration in ledger.iter().rev() {
            match self.apply(migration, direction, context) {
                Ok(()) => report.reverted.push(migration.id.clone()),
                Err(e) => {
                    tracing::error!(migration = %migration.id, %direction, error = %e, "compensation failed");
                    report.failures.push((migration.id.clone(), e.to_string()));
                }
            }
        }
        report
    }
}

fn enter(phases: &mut Vec<RunPhase>, phase: RunPhase, context: &RunContext) {
    tracing::debug!(%phase, target = %context.target, dry_run = context.dry_run, "run phase");
    phases.push(phase);
}
