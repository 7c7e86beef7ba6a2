//! Configuration file and command-line arguments.

use crate::actions::Action;
use crate::formatter::OutputFormat;
use clap::Parser;
use mongrate_core::{Console, MongrateError, StatusStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "./mongrate.conf";

/// Directory under `migration_home` shared by every distribution center.
pub const DEFAULT_COMMON_DIR: &str = "common";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML for this tool.
    #[error("invalid config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Contents of `mongrate.conf`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MongrateConfig {
    /// Path of the git checkout holding the migrations.
    pub git: PathBuf,
    /// Migration directory, relative to the repository root.
    pub migration_home: PathBuf,
    /// Common directory name under `migration_home`.
    pub common_dir: String,
    /// Database connection string handed to the console.
    pub mongodb: String,
    /// Console binary used to run migrations.
    pub shell: String,
    /// Extra console arguments.
    pub shell_args: Vec<String>,
    /// Keep the status collection in a local sled database at this path
    /// instead of `admin.mongrate.status` on `mongodb`.
    pub status_path: Option<PathBuf>,
    /// Default log level.
    pub loglevel: String,
    /// Log to this file instead of stdout.
    pub logfile: Option<PathBuf>,
    /// Print full error chains.
    pub verbose: bool,
}

impl Default for MongrateConfig {
    fn default() -> Self {
        Self {
            git: PathBuf::from("."),
            migration_home: PathBuf::from("migrations"),
            common_dir: DEFAULT_COMMON_DIR.to_string(),
            mongodb: "mongodb://localhost:27017/test".to_string(),
            shell: mongrate_core::DEFAULT_SHELL.to_string(),
            shell_args: Vec::new(),
            status_path: None,
            loglevel: "info".to_string(),
            logfile: None,
            verbose: false,
        }
    }
}

impl MongrateConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse YAML; missing keys keep their defaults.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, args: &Args) -> Self {
        if let Some(level) = &args.loglevel {
            self.loglevel = level.clone();
        }
        if args.verbose {
            self.verbose = true;
        }
        self
    }

    /// Console used for migrations and the status collection.
    pub fn console(&self) -> Console {
        Console::new(&self.shell).with_args(&self.shell_args)
    }

    /// Status collection of the configured database.
    pub fn status_store(&self) -> Result<StatusStore, MongrateError> {
        match &self.status_path {
            Some(path) => StatusStore::local(path),
            None => Ok(StatusStore::console(self.console(), &self.mongodb)),
        }
    }

    /// Repository-relative common migration directory.
    pub fn common_path(&self) -> PathBuf {
        self.migration_home.join(&self.common_dir)
    }

    /// Repository-relative distribution-center directory.
    pub fn distribution_center_path(&self, dc: &str) -> PathBuf {
        self.migration_home.join(dc)
    }
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "mongrate")]
#[command(version, about = "git-based migration tool for MongoDB", long_about = None)]
pub struct Args {
    /// Action to perform.
    #[arg(short, long, value_enum, default_value = "status")]
    pub action: Action,

    /// Configuration file.
    #[arg(short = 'f', long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// git tag/branch/commit hash to migrate to.
    #[arg(long)]
    pub git_hash: Option<String>,

    /// Only show what would have been done, don't actually do anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Re-initialize a database that is already managed.
    #[arg(long)]
    pub force: bool,

    /// Distribution center whose migrations run alongside the common ones.
    #[arg(long)]
    pub dc: Option<String>,

    /// Id of the migration generated by generate-template-migration.
    #[arg(long)]
    pub name: Option<String>,

    /// Descriptor written into a generated migration.
    #[arg(long, default_value = "")]
    pub info: String,

    /// Output format of the status action.
    #[arg(long, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Override the configured log level.
    #[arg(long)]
    pub loglevel: Option<String>,

    /// Print the full error chain on failure.
    #[arg(short, long)]
    pub verbose: bool,
}
