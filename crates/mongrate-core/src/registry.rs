//! Staging of the migrations discovered for one run.

use crate::definition::{MigrationDefinition, RunContext};
use crate::error::MongrateError;
use crate::repository::{ChangeAction, FileChange, Repository};
use crate::runner::{LoadRequest, MigrationRunner};
use std::collections::BTreeMap;
use std::path::Path;

/// Definitions registered for one run, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingSet {
    migrations: BTreeMap<String, MigrationDefinition>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a definition; an id may only be registered once.
    pub fn insert(&mut self, definition: MigrationDefinition) -> Result<(), MongrateError> {
        if let Some(existing) = self.migrations.get(&definition.id) {
            return Err(MongrateError::DuplicateMigration {
                id: definition.id,
                first: existing.source.clone(),
                second: definition.source,
            });
        }
        self.migrations.insert(definition.id.clone(), definition);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&MigrationDefinition> {
        self.migrations.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.migrations.contains_key(id)
    }

    /// Definitions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &MigrationDefinition> {
        self.migrations.values()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Extension of migration files; anything else under the migration
/// directories is ignored.
pub const MIGRATION_EXTENSION: &str = "js";

/// Loads the files of a change set into a fresh working set.
pub struct MigrationRegistry<'a, R: Repository + ?Sized, M: MigrationRunner + ?Sized> {
    repo: &'a R,
    runner: &'a M,
    context: &'a RunContext,
    working: WorkingSet,
    failures: Vec<MongrateError>,
}

impl<'a, R: Repository + ?Sized, M: MigrationRunner + ?Sized> MigrationRegistry<'a, R, M> {
    /// Start a registry pass with an empty working set.
    pub fn new(repo: &'a R, runner: &'a M, context: &'a RunContext) -> Self {
        Self {
            repo,
            runner,
            context,
            working: WorkingSet::new(),
            failures: Vec::new(),
        }
    }

    /// Load one changed file. Failures are recorded, not returned.
    pub fn register(&mut self, change: &FileChange) {
        let path = change.path.as_path();
        if path.extension().and_then(|e| e.to_str()) != Some(MIGRATION_EXTENSION) {
            tracing::debug!(path = %path.display(), "skipping non-migration file");
            return;
        }
        if change.action == ChangeAction::Deleted {
            tracing::warn!(path = %path.display(), "migration file was deleted, nothing to load");
            return;
        }

        match self.definition(path) {
            Ok(definition) => {
                let id = definition.id.clone();
                match self.working.insert(definition) {
                    Ok(()) => {
                        tracing::info!(migration = %id, path = %path.display(), "registered migration")
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to register migration");
                        self.failures.push(e);
                    }
                }
            }
            Err(reason) => {
                tracing::error!(path = %path.display(), error = %reason, "failed to load migration");
                self.failures.push(MongrateError::InvalidMigration {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }

    fn definition(&self, path: &Path) -> Result<MigrationDefinition, String> {
        let commit = self.context.source_commit();
        let bytes = self.repo.read(commit, path).map_err(|e| e.to_string())?;
        let script = String::from_utf8(bytes).map_err(|e| e.to_string())?;

        if self.context.dry_run {
            let definition = MigrationDefinition::sketch(path, &script).map_err(|e| e.to_string())?;
            tracing::info!(
                path = %path.display(),
                migration = %definition.id,
                run_after = ?definition.run_after,
                "dry-run: would load migration"
            );
            return Ok(definition);
        }

        tracing::debug!(path = %path.display(), commit, "loading migration");
        let mut definition = self
            .runner
            .load(&LoadRequest {
                path,
                script: &script,
                context: self.context,
            })
            .map_err(|e| e.to_string())?;
        definition.source = path.to_path_buf();
        definition.script = script;
        Ok(definition)
    }

    /// Load every change.
    pub fn register_all<'c>(&mut self, changes: impl IntoIterator<Item = &'c FileChange>) {
        for change in changes {
            self.register(change);
        }
    }

    /// Failures recorded so far.
    pub fn failures(&self) -> &[MongrateError] {
        &self.failures
    }

    /// Release the working set, or the first failure if any file failed.
    pub fn finish(self) -> Result<WorkingSet, MongrateError> {
        let failed = self.failures.len();
        match self.failures.into_iter().next() {
            Some(first) => {
                tracing::error!(failed, "migration load gate closed");
                Err(first)
            }
            None => Ok(self.working),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Direction;
    use crate::repository::{Commit, RepositoryError};
    use crate::runner::{ApplyError, ApplyRequest, LoadError};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Repository holding file contents per commit.
    #[derive(Default)]
    struct StubRepo {
        files: HashMap<(String, String), String>,
        reads: RefCell<Vec<String>>,
    }

    impl StubRepo {
        fn with(mut self, commit: &str, path: &str, content: &str) -> Self {
            self.files
                .insert((commit.to_string(), path.to_string()), content.to_string());
            self
        }
    }

    impl Repository for StubRepo {
        fn resolve(&self, rev: &str) -> Result<String, RepositoryError> {
            Ok(rev.to_string())
        }

        fn commits(&self) -> Result<Vec<Commit>, RepositoryError> {
            Ok(Vec::new())
        }

        fn diff(&self, _from: Option<&str>, _to: &str) -> Result<Vec<FileChange>, RepositoryError> {
            Ok(Vec::new())
        }

        fn show(&self, _commit: &str) -> Result<Vec<FileChange>, RepositoryError> {
            Ok(Vec::new())
        }

        fn read(&self, commit: &str, path: &Path) -> Result<Vec<u8>, RepositoryError> {
            let path = path.display().to_string();
            self.reads.borrow_mut().push(format!("{} {}", commit, path));
            self.files
                .get(&(commit.to_string(), path.clone()))
                .map(|content| content.clone().into_bytes())
                .ok_or_else(|| RepositoryError::MissingFile {
                    commit: commit.to_string(),
                    path: path.into(),
                })
        }
    }

    #[derive(Default)]
    struct StubRunner {
        loads: RefCell<Vec<(String, String)>>,
    }

    impl MigrationRunner for StubRunner {
        fn load(&self, request: &LoadRequest<'_>) -> Result<MigrationDefinition, LoadError> {
            let path = request.path;
            self.loads
                .borrow_mut()
                .push((path.display().to_string(), request.script.to_string()));
            let stem = path.file_stem().unwrap().to_string_lossy().to_string();
            if stem.starts_with("bad") {
                return Err(LoadError::MissingId);
            }
            // dup-*.js files all export the same id
            let id = if stem.starts_with("dup") { "dup".to_string() } else { stem };
            Ok(MigrationDefinition::new(id, "ignored.js"))
        }

        fn apply(&self, _request: &ApplyRequest<'_>) -> Result<(), ApplyError> {
            unreachable!("registry never applies")
        }
    }

    fn context(dry_run: bool) -> RunContext {
        RunContext {
            target: "c1".to_string(),
            from: "0".to_string(),
            direction: Direction::Up,
            database: "mongodb://localhost/test".to_string(),
            dry_run,
        }
    }

    fn added(path: &str) -> FileChange {
        FileChange::new(ChangeAction::Added, path)
    }

    fn repo_at(commit: &str, paths: &[&str]) -> StubRepo {
        paths.iter().fold(StubRepo::default(), |repo, path| {
            repo.with(commit, path, &format!("// {} at {}", path, commit))
        })
    }

    #[test]
    fn test_register_all() {
        let repo = repo_at("c1", &["m/a.js", "m/b.js"]);
        let runner = StubRunner::default();
        let ctx = context(false);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[
            added("m/b.js"),
            added("m/a.js"),
            FileChange::new(ChangeAction::Deleted, "m/gone.js"),
        ]);

        let set = registry.finish().unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a") && set.contains("b"));
        let a = set.get("a").unwrap();
        assert_eq!(a.source, Path::new("m/a.js"));
        assert_eq!(a.script, "// m/a.js at c1");
        assert_eq!(runner.loads.borrow().len(), 2);
        assert_eq!(runner.loads.borrow()[0].1, "// m/b.js at c1");
    }

    #[test]
    fn test_only_js_files_are_loaded() {
        let repo = repo_at("c1", &["m/a.js", "m/README.md", "m/notes"]);
        let runner = StubRunner::default();
        let ctx = context(false);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[added("m/README.md"), added("m/a.js"), added("m/notes")]);

        let set = registry.finish().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(repo.reads.borrow().as_slice(), ["c1 m/a.js"]);
    }

    #[test]
    fn test_rollback_reads_recorded_commit() {
        let repo = repo_at("c2", &["m/a.js"]);
        let runner = StubRunner::default();
        let ctx = RunContext {
            target: "c1".to_string(),
            from: "c2".to_string(),
            direction: Direction::Down,
            database: "mongodb://localhost/test".to_string(),
            dry_run: false,
        };
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register(&added("m/a.js"));

        let set = registry.finish().unwrap();
        assert_eq!(set.get("a").unwrap().script, "// m/a.js at c2");
        assert_eq!(repo.reads.borrow().as_slice(), ["c2 m/a.js"]);
    }

    #[test]
    fn test_unreadable_file_closes_gate() {
        let repo = repo_at("c1", &["m/a.js"]);
        let runner = StubRunner::default();
        let ctx = context(false);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[added("m/a.js"), added("m/missing.js")]);

        match registry.finish() {
            Err(MongrateError::InvalidMigration { path, reason }) => {
                assert_eq!(path, Path::new("m/missing.js"));
                assert!(reason.contains("does not exist"));
            }
            other => panic!("expected InvalidMigration, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_file_closes_gate() {
        let repo = repo_at("c1", &["m/a.js", "m/bad.js", "m/c.js"]);
        let runner = StubRunner::default();
        let ctx = context(false);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[added("m/a.js"), added("m/bad.js"), added("m/c.js")]);

        // Every file is still attempted.
        assert_eq!(runner.loads.borrow().len(), 3);
        assert_eq!(registry.failures().len(), 1);
        match registry.finish() {
            Err(MongrateError::InvalidMigration { path, .. }) => {
                assert_eq!(path, Path::new("m/bad.js"))
            }
            other => panic!("expected InvalidMigration, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_id() {
        let repo = repo_at("c1", &["m/dup-1.js", "m/dup-2.js"]);
        let runner = StubRunner::default();
        let ctx = context(false);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[added("m/dup-1.js"), added("m/dup-2.js")]);

        match registry.finish() {
            Err(MongrateError::DuplicateMigration { id, first, second }) => {
                assert_eq!(id, "dup");
                assert_eq!(first, Path::new("m/dup-1.js"));
                assert_eq!(second, Path::new("m/dup-2.js"));
            }
            other => panic!("expected DuplicateMigration, got {:?}", other),
        }
    }

    #[test]
    fn test_dry_run_sketches_without_loading() {
        let repo = StubRepo::default()
            .with("c1", "m/x.js", r#"mongrate.exports = { id: "CS-9", runAfter: ["CS-8"] };"#)
            .with("c1", "m/bad.js", "mongrate.exports = {};");
        let runner = StubRunner::default();
        let ctx = context(true);
        let mut registry = MigrationRegistry::new(&repo, &runner, &ctx);
        registry.register_all(&[added("m/x.js"), added("m/bad.js")]);

        let set = registry.finish().unwrap();
        assert!(runner.loads.borrow().is_empty());
        assert_eq!(set.get("CS-9").unwrap().run_after, vec!["CS-8".to_string()]);
        assert!(set.contains("bad"));
    }

    #[test]
    fn test_working_set_insert_is_not_upsert() {
        let mut set = WorkingSet::new();
        set.insert(MigrationDefinition::new("a", "a.js")).unwrap();
        let err = set.insert(MigrationDefinition::new("a", "a2.js")).unwrap_err();
        assert!(matches!(err, MongrateError::DuplicateMigration { .. }));
        assert_eq!(set.get("a").unwrap().source, Path::new("a.js"));
    }
}
