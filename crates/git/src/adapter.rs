use std::path::Path;

use git2::Repository;

use crate::{
    cli::{GitCli, WorktreeEntry},
    error::GitAdapterError,
};

/// Thin shell over git plumbing (spec §4.2). Never caches; every call is a
/// fresh inspection, since worktrees are mutated by other processes (the
/// user's own shell, editors) outside of Vibeman's control.
#[derive(Clone, Default)]
pub struct GitWorktreeAdapter {
    cli: GitCli,
}

impl GitWorktreeAdapter {
    pub fn new() -> Self {
        Self { cli: GitCli::new() }
    }

    /// If `branch` doesn't exist, create it from the repository's default
    /// branch; add a git worktree at `dest_path` tracking it. Fails with
    /// `AlreadyExists` if `dest_path` is a non-empty directory.
    pub fn create_worktree(
        &self,
        repo_path: &Path,
        branch: &str,
        dest_path: &Path,
    ) -> Result<(), GitAdapterError> {
        if dest_path.exists() {
            let non_empty = dest_path
                .read_dir()
                .map(|mut it| it.next().is_some())
                .unwrap_or(false);
            if non_empty {
                return Err(GitAdapterError::AlreadyExists(
                    dest_path.display().to_string(),
                ));
            }
        }

        let branch_exists = self.branch_exists(repo_path, branch)?;
        self.cli
            .worktree_add(repo_path, dest_path, branch, !branch_exists)?;
        tracing::info!(repo = %repo_path.display(), %branch, dest = %dest_path.display(), "created git worktree");
        Ok(())
    }

    /// Detach and delete; tolerant of paths already removed.
    pub fn remove_worktree(&self, repo_path: &Path, path: &Path) -> Result<(), GitAdapterError> {
        self.cli.worktree_remove(repo_path, path, false)?;
        self.cli.worktree_prune(repo_path)?;
        Ok(())
    }

    pub fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<WorktreeEntry>, GitAdapterError> {
        Ok(self.cli.list_worktrees(repo_path)?)
    }

    pub fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, GitAdapterError> {
        Ok(self.cli.has_changes(path)?)
    }

    pub fn has_unpushed_commits(&self, path: &Path) -> Result<bool, GitAdapterError> {
        Ok(self.cli.unpushed_commit_count(path)?.unwrap_or(0) > 0)
    }

    pub fn current_branch(&self, path: &Path) -> Result<String, GitAdapterError> {
        Ok(self.cli.current_branch(path)?)
    }

    /// True if `branch` is merged into the repository's default branch.
    pub fn is_branch_merged(&self, repo_path: &Path, branch: &str) -> Result<bool, GitAdapterError> {
        let default_branch = self.default_branch(repo_path)?;
        if branch == default_branch {
            return Ok(true);
        }
        Ok(self.cli.is_branch_merged(repo_path, branch, &default_branch)?)
    }

    fn branch_exists(&self, repo_path: &Path, branch: &str) -> Result<bool, GitAdapterError> {
        let repo = Repository::open(repo_path)?;
        Ok(repo.find_branch(branch, git2::BranchType::Local).is_ok())
    }

    /// The branch `HEAD` points at in the repository's primary checkout.
    pub fn default_branch(&self, repo_path: &Path) -> Result<String, GitAdapterError> {
        let repo = Repository::open(repo_path)?;
        let head = repo.head()?;
        head.shorthand()
            .map(str::to_string)
            .ok_or_else(|| GitAdapterError::BranchNotFound("HEAD".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let run = |args: &[&str]| {
            let status = Command::new("git")
                .arg("-C")
                .arg(dir.path())
                .args(args)
                .status()
                .unwrap();
            assert!(status.success());
        };
        run(&["init", "-b", "main"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.path().join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-m", "init"]);
        dir
    }

    #[test]
    fn create_worktree_creates_new_branch() {
        let repo = init_repo();
        let adapter = GitWorktreeAdapter::new();
        let dest = std::fs::canonicalize(repo.path())
            .unwrap()
            .parent()
            .unwrap()
            .join("wt-feat-test-create");

        adapter
            .create_worktree(repo.path(), "feat", &dest)
            .unwrap();
        assert!(dest.join("README.md").exists());
        assert_eq!(adapter.current_branch(&dest).unwrap(), "feat");

        adapter.remove_worktree(repo.path(), &dest).unwrap();
        let _ = std::fs::remove_dir_all(&dest);
    }

    #[test]
    fn remove_worktree_is_idempotent() {
        let repo = init_repo();
        let adapter = GitWorktreeAdapter::new();
        let dest = repo.path().parent().unwrap().join("wt-feat-test-remove");
        adapter
            .create_worktree(repo.path(), "feat2", &dest)
            .unwrap();
        adapter.remove_worktree(repo.path(), &dest).unwrap();
        // second removal must not fail
        adapter.remove_worktree(repo.path(), &dest).unwrap();
    }

    #[test]
    fn uncommitted_changes_detected() {
        let repo = init_repo();
        let adapter = GitWorktreeAdapter::new();
        assert!(!adapter.has_uncommitted_changes(repo.path()).unwrap());
        std::fs::write(repo.path().join("dirty.txt"), "x").unwrap();
        assert!(adapter.has_uncommitted_changes(repo.path()).unwrap());
    }
}
