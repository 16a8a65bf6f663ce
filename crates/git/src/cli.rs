//! Why we shell out to the `git` CLI for worktree mutations
//!
//! `git worktree add`/`remove` and working-tree dirty/ahead checks are safer
//! and more portable through the CLI than by re-implementing them against
//! libgit2: the CLI refuses to clobber a non-empty destination, understands
//! sparse-checkout, and its `--porcelain` output is a stable contract we can
//! parse without re-deriving working-tree semantics ourselves. Read-only
//! branch/commit queries stay on `git2` in `adapter.rs`, where a library call
//! is cheaper than spawning a process.
use std::{
    ffi::OsStr,
    path::Path,
    process::Command,
};

use thiserror::Error;
use vibeman_utils::shell::resolve_executable_path;

#[derive(Debug, Error)]
pub enum GitCliError {
    #[error("git executable not found or not runnable")]
    NotAvailable,
    #[error("git command failed: {0}")]
    CommandFailed(String),
}

/// Parsed worktree entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: String,
    pub head_sha: String,
    pub branch: Option<String>,
    pub is_main: bool,
    pub is_bare: bool,
    pub is_locked: bool,
}

#[derive(Clone, Default)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    /// `git -C <repo> worktree add [-b <branch>] <path> <branch>`
    pub fn worktree_add(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        branch: &str,
        create_branch: bool,
    ) -> Result<(), GitCliError> {
        let mut args: Vec<std::ffi::OsString> = vec!["worktree".into(), "add".into()];
        if create_branch {
            args.push("-b".into());
            args.push(branch.into());
        }
        args.push(worktree_path.as_os_str().into());
        if !create_branch {
            args.push(branch.into());
        }
        self.git(repo_path, args)?;
        Ok(())
    }

    /// `git -C <repo> worktree remove [--force] <path>`. Tolerates a path
    /// git no longer tracks (spec §4.2 "idempotent").
    pub fn worktree_remove(
        &self,
        repo_path: &Path,
        worktree_path: &Path,
        force: bool,
    ) -> Result<(), GitCliError> {
        let mut args: Vec<std::ffi::OsString> = vec!["worktree".into(), "remove".into()];
        if force {
            args.push("--force".into());
        }
        args.push(worktree_path.as_os_str().into());

        match self.git(repo_path, args) {
            Ok(_) => Ok(()),
            Err(GitCliError::CommandFailed(msg))
                if msg.contains("is not a working tree") || msg.contains("No such file") =>
            {
                tracing::debug!(path = %worktree_path.display(), "worktree already removed");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub fn worktree_prune(&self, repo_path: &Path) -> Result<(), GitCliError> {
        self.git(repo_path, ["worktree", "prune"])?;
        Ok(())
    }

    pub fn list_worktrees(&self, repo_path: &Path) -> Result<Vec<WorktreeEntry>, GitCliError> {
        let out = self.git(repo_path, ["worktree", "list", "--porcelain"])?;
        let mut entries = Vec::new();
        let mut path = None;
        let mut head = None;
        let mut branch = None;
        let mut is_main = true;
        let mut is_bare = false;
        let mut is_locked = false;

        let flush = |entries: &mut Vec<WorktreeEntry>,
                     path: &mut Option<String>,
                     head: &mut Option<String>,
                     branch: &mut Option<String>,
                     is_main: &mut bool,
                     is_bare: &mut bool,
                     is_locked: &mut bool| {
            if let (Some(p), Some(h)) = (path.take(), head.take()) {
                entries.push(WorktreeEntry {
                    path: p,
                    head_sha: h,
                    branch: branch.take(),
                    is_main: *is_main,
                    is_bare: *is_bare,
                    is_locked: *is_locked,
                });
            }
            *is_main = false;
            *is_bare = false;
            *is_locked = false;
        };

        for line in out.lines() {
            let line = line.trim();
            if line.is_empty() {
                flush(
                    &mut entries,
                    &mut path,
                    &mut head,
                    &mut branch,
                    &mut is_main,
                    &mut is_bare,
                    &mut is_locked,
                );
            } else if let Some(p) = line.strip_prefix("worktree ") {
                path = Some(p.to_string());
            } else if let Some(h) = line.strip_prefix("HEAD ") {
                head = Some(h.to_string());
            } else if let Some(b) = line.strip_prefix("branch ") {
                branch = b.strip_prefix("refs/heads/").map(str::to_string);
            } else if line == "bare" {
                is_bare = true;
            } else if line.starts_with("locked") {
                is_locked = true;
            }
        }
        flush(
            &mut entries,
            &mut path,
            &mut head,
            &mut branch,
            &mut is_main,
            &mut is_bare,
            &mut is_locked,
        );

        Ok(entries)
    }

    /// True if there are staged, unstaged, or untracked changes.
    pub fn has_changes(&self, worktree_path: &Path) -> Result<bool, GitCliError> {
        let out = self.git(worktree_path, ["status", "--porcelain"])?;
        Ok(!out.trim().is_empty())
    }

    /// Number of commits on HEAD not present on its upstream. `None` if no
    /// upstream is configured.
    pub fn unpushed_commit_count(&self, worktree_path: &Path) -> Result<Option<usize>, GitCliError> {
        let upstream = match self.git(
            worktree_path,
            ["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
        ) {
            Ok(out) => out.trim().to_string(),
            Err(_) => return Ok(None),
        };
        let out = self.git(worktree_path, ["rev-list", "--count", &format!("{upstream}..HEAD")])?;
        Ok(Some(out.trim().parse().unwrap_or(0)))
    }

    pub fn current_branch(&self, worktree_path: &Path) -> Result<String, GitCliError> {
        let out = self.git(worktree_path, ["rev-parse", "--abbrev-ref", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// True if `branch` is an ancestor of `base_branch` (i.e. merged).
    pub fn is_branch_merged(
        &self,
        repo_path: &Path,
        branch: &str,
        base_branch: &str,
    ) -> Result<bool, GitCliError> {
        let merged = self.git(repo_path, ["branch", "--merged", base_branch])?;
        Ok(merged
            .lines()
            .map(|l| l.trim().trim_start_matches("* ").trim())
            .any(|l| l == branch))
    }

    fn ensure_available(&self) -> Result<(), GitCliError> {
        let git = resolve_executable_path("git").ok_or(GitCliError::NotAvailable)?;
        let out = Command::new(&git)
            .arg("--version")
            .output()
            .map_err(|_| GitCliError::NotAvailable)?;
        if out.status.success() {
            Ok(())
        } else {
            Err(GitCliError::NotAvailable)
        }
    }

    /// Run `git -C <repo_path> <args...>`, returning stdout on success.
    pub fn git<I, S>(&self, repo_path: &Path, args: I) -> Result<String, GitCliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.ensure_available()?;
        let git = resolve_executable_path("git").ok_or(GitCliError::NotAvailable)?;
        let mut cmd = Command::new(&git);
        cmd.arg("-C").arg(repo_path);
        for a in args {
            cmd.arg(a);
        }
        let out = cmd
            .output()
            .map_err(|e| GitCliError::CommandFailed(e.to_string()))?;
        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(GitCliError::CommandFailed(stderr));
        }
        Ok(String::from_utf8_lossy(&out.stdout).to_string())
    }
}
