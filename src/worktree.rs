//! Git worktree management.

use crate::error::{Error, Result};
use crate::process::{run_capture, run_checked};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Creates and removes the working copies slots are attached to.
#[async_trait]
pub trait WorktreeProvider: Send + Sync {
    /// Check out `branch` in a new worktree under `base_path`, returning its path.
    async fn create(&self, base_path: &Path, branch: &str) -> Result<PathBuf>;

    async fn remove(&self, path: &Path) -> Result<()>;

    async fn current_branch(&self, path: &Path) -> Result<String>;
}

/// `git worktree` against the repository at `repo_root`.
pub struct GitWorktrees {
    repo_root: PathBuf,
    force_remove: bool,
}

impl GitWorktrees {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            force_remove: false,
        }
    }

    /// Remove worktrees even when they have uncommitted changes.
    pub fn with_force_remove(mut self, force: bool) -> Self {
        self.force_remove = force;
        self
    }

    async fn local_branch_exists(&self, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{}", branch);
        let output = run_capture(
            "git",
            &["show-ref", "--verify", "--quiet", &reference],
            Some(&self.repo_root),
        )
        .await?;
        Ok(output.status.success())
    }
}

/// Directory name for a branch: `feature/login` -> `feature-login`.
pub fn worktree_dir_name(branch: &str) -> String {
    branch
        .chars()
        .map(|c| match c {
            c if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' => c,
            _ => '-',
        })
        .collect::<String>()
        .trim_matches(|c| c == '-' || c == '.')
        .to_string()
}

#[async_trait]
impl WorktreeProvider for GitWorktrees {
    async fn create(&self, base_path: &Path, branch: &str) -> Result<PathBuf> {
        let dir_name = worktree_dir_name(branch);
        if dir_name.is_empty() {
            return Err(Error::Validation(format!(
                "branch name '{}' cannot be used as a directory name",
                branch
            )));
        }

        let target = base_path.join(dir_name);
        if target.exists() {
            return Err(Error::Conflict(format!(
                "worktree directory already exists: {}",
                target.display()
            )));
        }
        std::fs::create_dir_all(base_path)?;

        let target_str = target.to_str().ok_or_else(|| {
            Error::Validation(format!(
                "worktree path {} is not valid UTF-8",
                target.display()
            ))
        })?;

        let args = if self.local_branch_exists(branch).await? {
            vec!["worktree", "add", target_str, branch]
        } else {
            vec!["worktree", "add", "-b", branch, target_str]
        };
        run_checked("git", &args, Some(&self.repo_root)).await?;

        tracing::info!("Created worktree {} for branch {}", target.display(), branch);
        Ok(target)
    }

    async fn remove(&self, path: &Path) -> Result<()> {
        let path_str = path.to_string_lossy();
        let mut args = vec!["worktree", "remove"];
        if self.force_remove {
            args.push("--force");
        }
        args.push(path_str.as_ref());
        run_checked("git", &args, Some(&self.repo_root)).await?;

        tracing::info!("Removed worktree {}", path.display());
        Ok(())
    }

    async fn current_branch(&self, path: &Path) -> Result<String> {
        let branch = run_checked("git", &["rev-parse", "--abbrev-ref", "HEAD"], Some(path)).await?;
        if branch.is_empty() {
            return Err(Error::NotFound(format!(
                "no branch checked out in {}",
                path.display()
            )));
        }
        Ok(branch)
    }
}
