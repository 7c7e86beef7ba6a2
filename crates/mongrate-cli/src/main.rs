//! mongrate - git-based migration tool for MongoDB.

mod actions;
mod config;
mod error;
mod formatter;

use clap::Parser;
use config::{Args, MongrateConfig, DEFAULT_CONFIG_PATH};
use error::CliError;
use std::error::Error as _;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config.with_overrides(&args),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_tracing(&config) {
        eprintln!("Error: cannot set up logging: {}", e);
        std::process::exit(1);
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        action = %args.action,
        dry_run = args.dry_run,
        "mongrate initialized"
    );
    tracing::debug!(config = ?config, "configuration loaded");

    if let Err(e) = actions::dispatch(args.action, &args, &config) {
        report(&e, config.verbose);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<MongrateConfig, CliError> {
    // A missing default file means "use defaults"; an explicit one must exist.
    if args.config == Path::new(DEFAULT_CONFIG_PATH) && !args.config.exists() {
        return Ok(MongrateConfig::default());
    }
    Ok(MongrateConfig::load(&args.config)?)
}

fn init_tracing(config: &MongrateConfig) -> Result<(), CliError> {
    let level = config.loglevel.to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mongrate={level},mongrate_core={level}").into());

    match &config.logfile {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }
    Ok(())
}

fn report(error: &CliError, verbose: bool) {
    tracing::error!(error = %error, "action failed");
    eprintln!("Error: {}", error);
    if verbose {
        let mut source = error.source();
        while let Some(cause) = source {
            eprintln!("  caused by: {}", cause);
            source = cause.source();
        }
    }
}
