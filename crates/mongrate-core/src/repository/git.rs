//! git2-backed repository.

use super::{ChangeAction, Commit, FileChange, Repository, RepositoryError};
use git2::{Delta, DiffOptions, Oid, Sort, Tree};
use std::path::Path;

/// A git checkout.
pub struct GitRepository {
    repo: git2::Repository,
}

impl GitRepository {
    /// Open the repository containing `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let repo = git2::Repository::discover(path.as_ref())?;
        tracing::debug!(path = %path.as_ref().display(), "opened git repository");
        Ok(Self { repo })
    }

    /// Id of the checked out commit.
    pub fn head(&self) -> Result<String, RepositoryError> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    fn tree(&self, commit: &str) -> Result<Tree<'_>, RepositoryError> {
        let oid = Oid::from_str(commit)?;
        Ok(self.repo.find_commit(oid)?.tree()?)
    }

    fn diff_trees(
        &self,
        old: Option<&Tree<'_>>,
        new: &Tree<'_>,
    ) -> Result<Vec<FileChange>, RepositoryError> {
        let mut opts = DiffOptions::new();
        opts.include_typechange(false);
        let diff = self.repo.diff_tree_to_tree(old, Some(new), Some(&mut opts))?;

        let mut changes = Vec::new();
        for delta in diff.deltas() {
            let (action, file) = match delta.status() {
                Delta::Added | Delta::Copied => (ChangeAction::Added, delta.new_file()),
                Delta::Deleted => (ChangeAction::Deleted, delta.old_file()),
                Delta::Modified | Delta::Renamed | Delta::Typechange => {
                    (ChangeAction::Modified, delta.new_file())
                }
                other => {
                    tracing::debug!(status = ?other, "ignoring diff delta");
                    continue;
                }
            };
            if let Some(path) = file.path() {
                changes.push(FileChange::new(action, path));
            }
        }
        Ok(changes)
    }
}

impl Repository for GitRepository {
    fn resolve(&self, rev: &str) -> Result<String, RepositoryError> {
        let object = self
            .repo
            .revparse_single(rev)
            .map_err(|_| RepositoryError::UnknownRevision(rev.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| RepositoryError::UnknownRevision(rev.to_string()))?;
        Ok(commit.id().to_string())
    }

    fn commits(&self) -> Result<Vec<Commit>, RepositoryError> {
        let mut walk = self.repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        walk.push_head()?;

        let mut commits = Vec::new();
        for oid in walk {
            let commit = self.repo.find_commit(oid?)?;
            commits.push(Commit::new(
                commit.id().to_string(),
                commit.summary().unwrap_or_default(),
            ));
        }
        Ok(commits)
    }

    fn diff(&self, from: Option<&str>, to: &str) -> Result<Vec<FileChange>, RepositoryError> {
        let old = from.map(|id| self.tree(id)).transpose()?;
        let new = self.tree(to)?;
        self.diff_trees(old.as_ref(), &new)
    }

    fn show(&self, commit: &str) -> Result<Vec<FileChange>, RepositoryError> {
        let commit = self.repo.find_commit(Oid::from_str(commit)?)?;
        let parent = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };
        self.diff_trees(parent.as_ref(), &commit.tree()?)
    }

    fn read(&self, commit: &str, path: &Path) -> Result<Vec<u8>, RepositoryError> {
        let missing = || RepositoryError::MissingFile {
            commit: commit.to_string(),
            path: path.to_path_buf(),
        };
        let entry = self.tree(commit)?.get_path(path).map_err(|_| missing())?;
        let blob = entry
            .to_object(&self.repo)?
            .into_blob()
            .map_err(|_| missing())?;
        Ok(blob.content().to_vec())
    }
}
