//! Runner that evaluates migration files in the database console.

use super::{ApplyError, ApplyRequest, LoadError, LoadRequest, MigrationRunner};
use crate::console::{marked_line, Console, ConsoleError};
use crate::definition::{Direction, MigrationDefinition};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Prefix of the line a load script prints the definition on.
const DEFINITION_MARKER: &str = "MONGRATE_DEFINITION ";

/// Console exit code a load script uses for a file without an id.
const MISSING_ID_EXIT: i32 = 3;

/// Loads and applies migrations through a [`Console`].
///
/// Scripts are written to a private scratch directory before the console
/// loads them, so the content evaluated is the one taken from the repository
/// at the run's source commit, whatever the working tree holds.
pub struct ShellRunner {
    console: Console,
    scratch: tempfile::TempDir,
}

impl ShellRunner {
    pub fn new(console: Console) -> std::io::Result<Self> {
        let scratch = tempfile::Builder::new().prefix("mongrate-").tempdir()?;
        Ok(Self { console, scratch })
    }

    /// Write a script under the scratch directory, mirroring its repository path.
    fn materialize(&self, source: &Path, script: &str) -> std::io::Result<PathBuf> {
        let path = self.scratch.path().join(source);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, script)?;
        Ok(path)
    }
}

impl MigrationRunner for ShellRunner {
    fn load(&self, request: &LoadRequest<'_>) -> Result<MigrationDefinition, LoadError> {
        let path = self.materialize(request.path, request.script)?;
        let stdout = match self
            .console
            .eval(&request.context.database, &load_script(&path))
        {
            Ok(stdout) => stdout,
            Err(ConsoleError::Failed {
                status: Some(MISSING_ID_EXIT),
                ..
            }) => return Err(LoadError::MissingId),
            Err(e) => return Err(e.into()),
        };
        parse_definition(&stdout)
    }

    fn apply(&self, request: &ApplyRequest<'_>) -> Result<(), ApplyError> {
        let migration = request.migration;
        let path = self.materialize(&migration.source, &migration.script)?;
        let stdout = self.console.eval(
            &request.context.database,
            &apply_script(&path, request.direction),
        )?;
        tracing::debug!(migration = %migration.id, output = %stdout.trim(), "console output");
        Ok(())
    }
}

fn js_string(path: &Path) -> String {
    Value::String(path.to_string_lossy().into_owned()).to_string()
}

fn load_script(path: &Path) -> String {
    format!(
        "var mongrate = {{}};\
         load({path});\
         var m = mongrate.exports;\
         if (!m || !m.id) {{ quit({missing}); }}\
         if (typeof m.onLoad === 'function') {{ m.onLoad(db); }}\
         print('{marker}' + JSON.stringify({{\
         id: String(m.id),\
         runAfter: m.runAfter || [],\
         info: typeof m.info === 'string' ? m.info : null,\
         hasOnLoad: typeof m.onLoad === 'function'}}));",
        path = js_string(path),
        missing = MISSING_ID_EXIT,
        marker = DEFINITION_MARKER,
    )
}

fn apply_script(path: &Path, direction: Direction) -> String {
    format!(
        "var mongrate = {{}};load({path});mongrate.exports.{action}();",
        path = js_string(path),
        action = direction.as_str(),
    )
}

fn parse_definition(stdout: &str) -> Result<MigrationDefinition, LoadError> {
    let payload = marked_line(stdout, DEFINITION_MARKER)
        .ok_or_else(|| LoadError::Malformed("no migration description printed".to_string()))?;

    let definition: MigrationDefinition =
        serde_json::from_str(payload).map_err(|e| LoadError::Malformed(e.to_string()))?;
    if definition.id.trim().is_empty() {
        return Err(LoadError::MissingId);
    }
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::RunContext;

    fn context() -> RunContext {
        RunContext {
            target: "c1".to_string(),
            from: "0".to_string(),
            direction: Direction::Up,
            database: "mongodb://localhost/test".to_string(),
            dry_run: false,
        }
    }

    #[test]
    fn test_apply_script_escapes_path() {
        let script = apply_script(Path::new("/repo/it's \"here\".js"), Direction::Down);
        assert!(script.contains(r#"load("/repo/it's \"here\".js");"#));
        assert!(script.ends_with("mongrate.exports.down();"));
    }

    #[test]
    fn test_load_script_runs_hook_and_prints_marker() {
        let script = load_script(Path::new("/repo/migrations/common/a.js"));
        assert!(script.contains("m.onLoad(db)"));
        assert!(script.contains(DEFINITION_MARKER));
        assert!(script.contains("quit(3)"));
    }

    #[test]
    fn test_parse_definition() {
        let stdout = "Whoo hoo this is onLoad\nMONGRATE_DEFINITION {\"id\":\"CS-1\",\"runAfter\":[\"CS-0\"],\"info\":null,\"hasOnLoad\":true}\n";
        let def = parse_definition(stdout).unwrap();
        assert_eq!(def.id, "CS-1");
        assert_eq!(def.run_after, vec!["CS-0".to_string()]);
        assert!(def.has_on_load);
    }

    #[test]
    fn test_parse_definition_errors() {
        assert!(matches!(
            parse_definition("nothing here"),
            Err(LoadError::Malformed(_))
        ));
        assert!(matches!(
            parse_definition("MONGRATE_DEFINITION {\"id\":\" \"}"),
            Err(LoadError::MissingId)
        ));
    }

    #[test]
    fn test_materialize_mirrors_repository_path() {
        let runner = ShellRunner::new(Console::default()).unwrap();
        let common = runner
            .materialize(Path::new("migrations/common/a.js"), "// common")
            .unwrap();
        let east = runner
            .materialize(Path::new("migrations/east/a.js"), "// east")
            .unwrap();

        assert_ne!(common, east);
        assert!(common.starts_with(runner.scratch.path()));
        assert_eq!(std::fs::read_to_string(&common).unwrap(), "// common");
        assert_eq!(std::fs::read_to_string(&east).unwrap(), "// east");
    }

    #[test]
    fn test_missing_binary_is_io_error() {
        let runner = ShellRunner::new(Console::new("mongrate-no-such-console")).unwrap();
        let context = context();
        let mut migration = MigrationDefinition::new("a", "migrations/common/a.js");
        migration.script = "mongrate.exports = { id: 'a' };".to_string();

        let result = runner.apply(&ApplyRequest {
            migration: &migration,
            direction: Direction::Up,
            context: &context,
        });
        assert!(matches!(result, Err(ApplyError::Io(_))));

        let result = runner.load(&LoadRequest {
            path: Path::new("migrations/common/a.js"),
            script: &migration.script,
            context: &context,
        });
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
