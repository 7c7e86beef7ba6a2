//! Scaffold for new migration files.

use crate::error::MongrateError;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

const MIGRATION_TEMPLATE: &str = r#"// {{ id }}
// Generated by mongrate {{ version }}. Every migration assigns its definition
// to mongrate.exports; id must be unique across the repository.
var migration = {
    id : {{ id_literal }},
    // ids of migrations that must be applied before this one
    runAfter : [ ],
    // called with the target database before the migration is registered
    onLoad : function(db) {
    },
    up : function() {
        print({{ id_literal }} + " up");
    },
    down : function() {
        print({{ id_literal }} + " down");
    },
    info : {{ info_literal }}
};
mongrate.exports = migration;
"#;

/// Default id for a new migration.
pub fn default_migration_id() -> String {
    format!("M-{}", crate::status::current_timestamp() / 1_000_000)
}

/// Render the scaffold for a migration id.
///
/// `id` and `info` land in JS string literals, so they are rendered as JSON
/// strings.
pub fn render(id: &str, info: &str) -> Result<String, MongrateError> {
    let mut context = Context::new();
    context.insert("id", id);
    context.insert("id_literal", &serde_json::to_string(id)?);
    context.insert("info_literal", &serde_json::to_string(info)?);
    context.insert("version", env!("CARGO_PKG_VERSION"));
    Ok(Tera::one_off(MIGRATION_TEMPLATE, &context, false)?)
}

/// Write a new migration file `<dir>/<id>.js`, refusing to overwrite.
///
/// With `dry_run` the path is returned without touching the filesystem.
pub fn generate(dir: &Path, id: &str, info: &str, dry_run: bool) -> Result<PathBuf, MongrateError> {
    let path = dir.join(format!("{}.js", id));
    if path.exists() {
        return Err(MongrateError::TemplateExists { path });
    }
    let content = render(id, info)?;

    if dry_run {
        tracing::info!(path = %path.display(), "dry-run: would write migration template");
        return Ok(path);
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, content)?;
    tracing::info!(path = %path.display(), "wrote migration template");
    Ok(path)
}
