//! Supported actions and their handlers.

use crate::config::{Args, MongrateConfig};
use crate::error::CliError;
use crate::formatter::{format_status, StatusView};
use clap::ValueEnum;
use mongrate_core::runner::ShellRunner;
use mongrate_core::{
    template, EngineConfig, ExecutionEngine, GitRepository, MigrationPaths, MongrateError,
    Repository,
};

/// Action selected on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Action {
    /// Report on the git repository and the database
    Status,
    /// Start managing a database
    Initialize,
    /// Migrate to or from the commit given by --git-hash
    Migrate,
    /// Write a migration scaffold
    #[value(alias = "generate_template_migration")]
    GenerateTemplateMigration,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Status => write!(f, "status"),
            Action::Initialize => write!(f, "initialize"),
            Action::Migrate => write!(f, "migrate"),
            Action::GenerateTemplateMigration => write!(f, "generate-template-migration"),
        }
    }
}

/// Perform an action.
pub fn dispatch(action: Action, args: &Args, config: &MongrateConfig) -> Result<(), CliError> {
    tracing::debug!(%action, dry_run = args.dry_run, "got request for action");
    let result = match action {
        Action::Status => status(args, config),
        Action::Initialize => initialize(args, config),
        Action::Migrate => migrate(args, config),
        Action::GenerateTemplateMigration => generate_template_migration(args, config),
    };
    if result.is_ok() {
        tracing::debug!(%action, "action complete");
    }
    result
}

fn migration_paths(args: &Args, config: &MongrateConfig) -> MigrationPaths {
    let paths = MigrationPaths::new(config.common_path());
    match &args.dc {
        Some(dc) => paths.with_distribution_center(config.distribution_center_path(dc)),
        None => paths,
    }
}

fn status(args: &Args, config: &MongrateConfig) -> Result<(), CliError> {
    let repo = GitRepository::open(&config.git)?;
    let commits = repo.commits().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "cannot list commits");
        Vec::new()
    });

    let store = config.status_store()?;
    let snapshot = store.snapshot()?;
    if !snapshot.is_managed() {
        tracing::error!("this database does not seem to be managed by mongrate");
    }

    let repo_path = config.git.display().to_string();
    let migration_home = config.migration_home.display().to_string();
    let location = store.location();
    let view = StatusView {
        repo: &repo_path,
        migration_home: &migration_home,
        database: &config.mongodb,
        status_location: &location,
        commits: &commits,
        snapshot: &snapshot,
    };
    println!("{}", format_status(&view, args.format));
    Ok(())
}

fn initialize(args: &Args, config: &MongrateConfig) -> Result<(), CliError> {
    let store = config.status_store()?;

    if args.dry_run {
        if !args.force && store.is_managed()? {
            return Err(MongrateError::AlreadyManaged {
                commit: store.current_commit()?,
            }
            .into());
        }
        tracing::info!(force = args.force, "dry-run: would initialize status collection");
        return Ok(());
    }

    store.initialize(args.force)?;
    println!("{} is now managed by mongrate", config.mongodb);
    Ok(())
}

fn migrate(args: &Args, config: &MongrateConfig) -> Result<(), CliError> {
    let target = args.git_hash.as_deref().ok_or(CliError::MissingTarget)?;

    let repo = GitRepository::open(&config.git)?;
    let runner = ShellRunner::new(config.console())?;
    let store = config.status_store()?;

    let engine_config = EngineConfig::new(&config.mongodb, migration_paths(args, config))
        .with_dry_run(args.dry_run);
    let report = ExecutionEngine::new(&repo, &runner, &store, engine_config).migrate(target)?;

    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    println!(
        "{}migrated {} -> {} ({}), {} migration(s): {}",
        prefix,
        report.from,
        report.target,
        report.direction,
        report.executed.len(),
        report.executed.join(", ")
    );
    Ok(())
}

fn generate_template_migration(args: &Args, config: &MongrateConfig) -> Result<(), CliError> {
    let relative = match &args.dc {
        Some(dc) => config.distribution_center_path(dc),
        None => config.common_path(),
    };
    let dir = config.git.join(relative);
    let id = args
        .name
        .clone()
        .unwrap_or_else(template::default_migration_id);

    let path = template::generate(&dir, &id, &args.info, args.dry_run)?;
    println!("{}", path.display());
    Ok(())
}
