//! Migration definitions and the per-run context.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Recorded commit value meaning "no commit applied yet".
pub const NO_COMMIT: &str = "0";

/// Which action of a migration to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward action.
    Up,
    /// Reverse action.
    Down,
}

impl Direction {
    /// The action that undoes this one.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// Name of the exported function carrying this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A migration as exported by its file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDefinition {
    /// Globally unique id.
    pub id: String,
    /// Ids this migration must run after.
    #[serde(default)]
    pub run_after: Vec<String>,
    /// Human-readable descriptor.
    #[serde(default)]
    pub info: Option<String>,
    /// Whether the file exported an onLoad hook.
    #[serde(default)]
    pub has_on_load: bool,
    /// Repository-relative file the definition was loaded from.
    #[serde(skip)]
    pub source: PathBuf,
    /// File content at the commit the run reads migrations from.
    #[serde(skip)]
    pub script: String,
}

impl MigrationDefinition {
    /// Create a definition with no dependencies.
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            run_after: Vec::new(),
            info: None,
            has_on_load: false,
            source: source.into(),
            script: String::new(),
        }
    }

    /// Add a dependency.
    pub fn with_run_after(mut self, id: impl Into<String>) -> Self {
        self.run_after.push(id.into());
        self
    }

    /// Set the descriptor.
    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    /// Placeholder named after the file stem.
    pub fn placeholder(source: &Path) -> Self {
        let id = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        Self::new(id, source)
    }

    /// Definition read from the file text without evaluating it.
    ///
    /// Dry runs never ask the runner to load a file, so they take `id` and
    /// `runAfter` from literal declarations. A file that computes either falls
    /// back to its stem and to no dependencies.
    pub fn sketch(source: &Path, script: &str) -> Result<Self, regex::Error> {
        let id_pattern = Regex::new(r#"\bid\s*:\s*["']([^"'\n]+)["']"#)?;
        let run_after_pattern = Regex::new(r"\brunAfter\s*:\s*\[([^\]]*)\]")?;
        let literal = Regex::new(r#"["']([^"'\n]+)["']"#)?;

        let mut definition = Self::placeholder(source);
        if let Some(id) = id_pattern.captures(script).and_then(|c| c.get(1)) {
            definition.id = id.as_str().to_string();
        }
        if let Some(list) = run_after_pattern.captures(script).and_then(|c| c.get(1)) {
            definition.run_after = literal
                .captures_iter(list.as_str())
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .collect();
        }
        definition.script = script.to_string();
        Ok(definition)
    }
}

/// Immutable context shared by every component call in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Commit the run migrates to.
    pub target: String,
    /// Commit recorded before the run.
    pub from: String,
    /// Up for forward runs, down for rollbacks.
    pub direction: Direction,
    /// Handle of the target database (connection string).
    pub database: String,
    /// Replace every mutation with a log line.
    pub dry_run: bool,
}

impl RunContext {
    /// True if the run undoes migrations.
    pub fn is_rollback(&self) -> bool {
        self.direction == Direction::Down
    }

    /// Commit migration files are read at: the target of a forward run, the
    /// recorded commit of a rollback.
    pub fn source_commit(&self) -> &str {
        if self.is_rollback() {
            &self.from
        } else {
            &self.target
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite(), Direction::Up);
        assert_eq!(Direction::Down.to_string(), "down");
    }

    #[test]
    fn test_definition_from_exports() {
        let json = r#"{"id":"CS-12345","runAfter":["CS-12332"],"info":"adds index","hasOnLoad":true}"#;
        let def: MigrationDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.id, "CS-12345");
        assert_eq!(def.run_after, vec!["CS-12332".to_string()]);
        assert!(def.has_on_load);

        let bare: MigrationDefinition = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(bare.run_after.is_empty());
        assert!(bare.info.is_none());

        assert!(serde_json::from_str::<MigrationDefinition>(r#"{"runAfter":[]}"#).is_err());
    }

    #[test]
    fn test_placeholder_uses_file_stem() {
        let def = MigrationDefinition::placeholder(Path::new("migrations/common/CS-1.js"));
        assert_eq!(def.id, "CS-1");
        assert_eq!(def.source, PathBuf::from("migrations/common/CS-1.js"));
    }

    #[test]
    fn test_sketch_reads_literal_declarations() {
        let script = r#"
// CS-2: ids of predecessors go in runAfter
var migration = {
    id : "CS-2",
    runAfter : [ "CS-1", 'CS-0' ],
    up : function() { db.orders.createIndex({ _id: 1 }); },
    info : "orders index"
};
mongrate.exports = migration;
"#;
        let def = MigrationDefinition::sketch(Path::new("m/file-name.js"), script).unwrap();
        assert_eq!(def.id, "CS-2");
        assert_eq!(def.run_after, vec!["CS-1".to_string(), "CS-0".to_string()]);
        assert_eq!(def.source, PathBuf::from("m/file-name.js"));
        assert_eq!(def.script, script);
    }

    #[test]
    fn test_sketch_falls_back_to_stem() {
        let script = "var id = compute(); mongrate.exports = { id: id, runAfter: deps() };";
        let def = MigrationDefinition::sketch(Path::new("m/CS-3.js"), script).unwrap();
        assert_eq!(def.id, "CS-3");
        assert!(def.run_after.is_empty());
    }

    #[test]
    fn test_source_commit() {
        let mut context = RunContext {
            target: "c1".to_string(),
            from: "c2".to_string(),
            direction: Direction::Down,
            database: "mongodb://localhost/test".to_string(),
            dry_run: false,
        };
        assert_eq!(context.source_commit(), "c2");
        context.direction = Direction::Up;
        assert_eq!(context.source_commit(), "c1");
    }
}
