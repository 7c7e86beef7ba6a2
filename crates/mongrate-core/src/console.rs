//! Invocations of the database console.
//!
//! Both the migration runner and the status collection reach the target
//! database by running `<shell> <database> --quiet <args> --eval <script>`.

use std::process::Command;
use thiserror::Error;

/// Default console binary.
pub const DEFAULT_SHELL: &str = "mongo";

/// Console errors.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// The console could not be started.
    #[error("failed to start console: {0}")]
    Io(#[from] std::io::Error),

    /// The script raised or the console exited unsuccessfully.
    #[error("console exited with status {status:?}: {stderr}")]
    Failed {
        status: Option<i32>,
        stderr: String,
    },

    /// The script ran but printed something unexpected.
    #[error("unexpected console output: {0}")]
    Malformed(String),
}

/// A database console binary and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Console {
    shell: String,
    extra_args: Vec<String>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl Console {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            extra_args: Vec::new(),
        }
    }

    /// Add an argument placed before `--eval`.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Evaluate a script against a database and return its stdout.
    pub fn eval(&self, database: &str, script: &str) -> Result<String, ConsoleError> {
        tracing::debug!(shell = %self.shell, database, script, "invoking console");
        let output = Command::new(&self.shell)
            .arg(database)
            .arg("--quiet")
            .args(&self.extra_args)
            .arg("--eval")
            .arg(script)
            .output()?;

        if !output.status.success() {
            return Err(ConsoleError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Payload of the first stdout line starting with `marker`.
pub fn marked_line<'a>(stdout: &'a str, marker: &str) -> Option<&'a str> {
    stdout
        .lines()
        .find_map(|line| line.trim().strip_prefix(marker))
}
