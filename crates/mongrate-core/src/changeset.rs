//! Change-set resolution between the recorded commit and a target commit.

use crate::definition::NO_COMMIT;
use crate::error::MongrateError;
use crate::repository::{Commit, FileChange, Repository};
use std::path::{Path, PathBuf};

/// Directories migrations are discovered in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPaths {
    /// Mandatory directory shared by every deployment.
    pub common: PathBuf,
    /// Optional distribution-center directory.
    pub distribution_center: Option<PathBuf>,
}

impl MigrationPaths {
    pub fn new(common: impl Into<PathBuf>) -> Self {
        Self {
            common: common.into(),
            distribution_center: None,
        }
    }

    pub fn with_distribution_center(mut self, dir: impl Into<PathBuf>) -> Self {
        self.distribution_center = Some(dir.into());
        self
    }

    /// True if a repository-relative path lies under one of the directories.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.common)
            || self
                .distribution_center
                .as_ref()
                .is_some_and(|dc| path.starts_with(dc))
    }
}

/// Direction and candidate files of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub rollback: bool,
    /// Filtered changes; the order only drives discovery.
    pub changes: Vec<FileChange>,
}

/// Index of a commit in most-recent-first history. The `"0"` commit sits
/// after the oldest entry.
fn position(commits: &[Commit], commit: &str) -> Option<usize> {
    if commit == NO_COMMIT {
        return Some(commits.len());
    }
    commits.iter().position(|c| c.id == commit)
}

/// Indices of `recorded` and `target` in most-recent-first history.
fn positions(
    commits: &[Commit],
    recorded: &str,
    target: &str,
) -> Result<(usize, usize), MongrateError> {
    let target_idx = position(commits, target).ok_or_else(|| MongrateError::UnknownCommit {
        commit: target.to_string(),
    })?;
    let recorded_idx = position(commits, recorded).ok_or_else(|| MongrateError::UnknownCommit {
        commit: recorded.to_string(),
    })?;
    Ok((recorded_idx, target_idx))
}

/// True if moving from `recorded` to `target` undoes history.
pub fn is_rollback(
    commits: &[Commit],
    recorded: &str,
    target: &str,
) -> Result<bool, MongrateError> {
    let (recorded_idx, target_idx) = positions(commits, recorded, target)?;
    Ok(target_idx > recorded_idx)
}

/// Resolve the change set needed to move from `recorded` to `target`.
///
/// `target` must already be a full commit id. A target equal to the recorded
/// commit has nothing left to do and yields an empty set. When the target is
/// the checked out commit and the recorded commit its parent, the target's
/// own changes are used. Otherwise diffs are taken from the older commit to
/// the newer one so that added files are the ones the span introduced,
/// whichever direction the run goes.
pub fn resolve<R: Repository + ?Sized>(
    repo: &R,
    recorded: &str,
    target: &str,
    paths: &MigrationPaths,
) -> Result<ChangeSet, MongrateError> {
    let commits = repo.commits()?;
    let (recorded_idx, target_idx) = positions(&commits, recorded, target)?;
    let rollback = target_idx > recorded_idx;

    if target_idx == recorded_idx {
        tracing::info!(recorded, target, "database is already at target commit");
        return Ok(ChangeSet {
            rollback: false,
            changes: Vec::new(),
        });
    }

    let raw = if target_idx == 0 && recorded_idx == 1 {
        repo.show(target)?
    } else if rollback {
        repo.diff(Some(target), recorded)?
    } else {
        let from = (recorded != NO_COMMIT).then_some(recorded);
        repo.diff(from, target)?
    };

    let mut changes = Vec::with_capacity(raw.len());
    for change in raw {
        if paths.contains(&change.path) {
            changes.push(change);
        } else {
            tracing::debug!(path = %change.path.display(), "skipping file outside migration directories");
        }
    }

    tracing::info!(
        recorded,
        target,
        rollback,
        changes = changes.len(),
        "resolved change set"
    );
    Ok(ChangeSet { rollback, changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{ChangeAction, RepositoryError};
    use std::cell::RefCell;

    fn history() -> Vec<Commit> {
        ["C3", "C2", "C1", "C0"]
            .iter()
            .map(|id| Commit::new(*id, ""))
            .collect()
    }

    #[derive(Default)]
    struct FakeRepo {
        calls: RefCell<Vec<String>>,
    }

    impl Repository for FakeRepo {
        fn resolve(&self, rev: &str) -> Result<String, RepositoryError> {
            Ok(rev.to_string())
        }

        fn commits(&self) -> Result<Vec<Commit>, RepositoryError> {
            Ok(history())
        }

        fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<FileChange>, RepositoryError> {
            self.calls
                .borrow_mut()
                .push(format!("diff {} {}", from.unwrap_or("-"), to));
            Ok(vec![
                FileChange::new(ChangeAction::Added, "migrations/common/a.js"),
                FileChange::new(ChangeAction::Modified, "migrations/east/b.js"),
                FileChange::new(ChangeAction::Added, "migrations/west/c.js"),
                FileChange::new(ChangeAction::Added, "src/app.js"),
            ])
        }

        fn show(&self, commit: &str) -> Result<Vec<FileChange>, RepositoryError> {
            self.calls.borrow_mut().push(format!("show {}", commit));
            Ok(vec![FileChange::new(
                ChangeAction::Added,
                "migrations/common/z.js",
            )])
        }

        fn read(&self, _commit: &str, _path: &Path) -> Result<Vec<u8>, RepositoryError> {
            unreachable!("change sets never read file content")
        }
    }

    #[test]
    fn test_direction() {
        let commits = history();
        assert!(is_rollback(&commits, "C2", "C1").unwrap());
        assert!(!is_rollback(&commits, "C2", "C3").unwrap());
        assert!(!is_rollback(&commits, "C2", "C2").unwrap());
        assert!(!is_rollback(&commits, NO_COMMIT, "C0").unwrap());
    }

    #[test]
    fn test_unknown_commits() {
        let commits = history();
        match is_rollback(&commits, "C2", "C9") {
            Err(MongrateError::UnknownCommit { commit }) => assert_eq!(commit, "C9"),
            other => panic!("expected UnknownCommit, got {:?}", other),
        }
        assert!(matches!(
            is_rollback(&commits, "gone", "C1"),
            Err(MongrateError::UnknownCommit { .. })
        ));
    }

    #[test]
    fn test_forward_filters_to_common() {
        let repo = FakeRepo::default();
        let set = resolve(&repo, "C1", "C3", &MigrationPaths::new("migrations/common")).unwrap();
        assert!(!set.rollback);
        assert_eq!(
            set.changes,
            vec![FileChange::new(ChangeAction::Added, "migrations/common/a.js")]
        );
        assert_eq!(repo.calls.borrow().as_slice(), ["diff C1 C3"]);
    }

    #[test]
    fn test_distribution_center_included() {
        let repo = FakeRepo::default();
        let paths = MigrationPaths::new("migrations/common").with_distribution_center("migrations/east");
        let set = resolve(&repo, NO_COMMIT, "C3", &paths).unwrap();
        let found: Vec<&Path> = set.changes.iter().map(|c| c.path.as_path()).collect();
        assert_eq!(
            found,
            vec![Path::new("migrations/common/a.js"), Path::new("migrations/east/b.js")]
        );
        assert_eq!(repo.calls.borrow().as_slice(), ["diff - C3"]);
    }

    #[test]
    fn test_rollback_diffs_older_to_newer() {
        let repo = FakeRepo::default();
        let set = resolve(&repo, "C2", "C1", &MigrationPaths::new("migrations/common")).unwrap();
        assert!(set.rollback);
        assert_eq!(repo.calls.borrow().as_slice(), ["diff C1 C2"]);
    }

    #[test]
    fn test_same_commit_is_empty() {
        let repo = FakeRepo::default();
        for commit in ["C3", "C2", NO_COMMIT] {
            let set =
                resolve(&repo, commit, commit, &MigrationPaths::new("migrations/common")).unwrap();
            assert!(!set.rollback);
            assert!(set.changes.is_empty());
        }
        assert!(repo.calls.borrow().is_empty());
    }

    #[test]
    fn test_head_after_its_parent_uses_show() {
        let repo = FakeRepo::default();
        let set = resolve(&repo, "C2", "C3", &MigrationPaths::new("migrations/common")).unwrap();
        assert!(!set.rollback);
        assert_eq!(
            set.changes,
            vec![FileChange::new(ChangeAction::Added, "migrations/common/z.js")]
        );
        assert_eq!(repo.calls.borrow().as_slice(), ["show C3"]);

        // Rolling back from HEAD to its parent still diffs.
        let repo = FakeRepo::default();
        resolve(&repo, "C3", "C2", &MigrationPaths::new("migrations/common")).unwrap();
        assert_eq!(repo.calls.borrow().as_slice(), ["diff C2 C3"]);
    }

    #[test]
    fn test_prefix_is_component_wise() {
        let paths = MigrationPaths::new("migrations/common");
        assert!(paths.contains(Path::new("migrations/common/x.js")));
        assert!(!paths.contains(Path::new("migrations/common-old/x.js")));
    }
}
