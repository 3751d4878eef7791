//! Allocation and release of slots.
//!
//! [`Workspace`] drives the core in a fixed order: lock, read the registry,
//! pick a slot, create the worktree and database, patch env files, persist.
//! Each step fails fast. A failure after the worktree exists leaves it in
//! place; running `setup` on that path again picks up where it stopped,
//! since every step is deterministic for a slot.

use crate::allocator::{patch_context, resolve_slot};
use crate::config::Config;
use crate::database::{slot_database_pattern, slot_of_database, DatabaseAdmin};
use crate::env_patch::{copy_and_patch_all_env_files, read_env_value};
use crate::error::{Error, Result};
use crate::lock::RegistryLock;
use crate::process::run_shell;
use crate::registry::{
    add_allocation, canonical, find_by_path, read_registry, remove_allocation, write_registry,
    Allocation, Slot,
};
use crate::worktree::WorktreeProvider;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Where the worktree for a new allocation comes from.
#[derive(Debug, Clone)]
pub enum WorktreeTarget {
    /// Create a worktree for this branch under the configured base path.
    New { branch: String },
    /// Use a worktree that already exists.
    Existing { path: PathBuf },
}

/// Resolved origin of the worktree for one allocation.
enum WorktreeSource {
    Create(String),
    /// Canonical path of an unallocated worktree.
    Existing(PathBuf),
    /// Canonical path of a worktree that already holds the slot.
    Reused(PathBuf),
}

#[derive(Debug, Clone)]
pub struct AllocateRequest {
    pub target: WorktreeTarget,
    /// Explicit slot; `None` takes the lowest free one.
    pub slot: Option<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStep {
    Created,
    AlreadyExists,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationOutcome {
    pub slot: Slot,
    pub allocation: Allocation,
    pub env_files: Vec<PathBuf>,
    pub database: DatabaseStep,
    /// The worktree already had this slot; its allocation was replaced.
    pub reused: bool,
}

#[derive(Debug, Clone)]
pub enum ReleaseTarget {
    Slot(Slot),
    Path(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropStep {
    Dropped,
    /// `keep_database` was set.
    Kept,
    /// No connection URL was configured.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveStep {
    Removed,
    /// `keep_worktree` was set.
    Kept,
    AlreadyGone,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    pub slot: Slot,
    pub allocation: Allocation,
    pub database: DropStep,
    pub worktree: RemoveStep,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    pub keep_database: bool,
    pub keep_worktree: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneReport {
    /// Allocations whose worktree directory no longer exists.
    pub stale: Vec<(Slot, Allocation)>,
    /// Slot databases on the server with no allocation.
    pub orphan_databases: Vec<String>,
    pub dropped_databases: Vec<String>,
}

/// A repository plus the collaborators needed to act on it.
pub struct Workspace<'a> {
    pub config: &'a Config,
    pub repo_root: &'a Path,
    pub worktrees: &'a dyn WorktreeProvider,
    pub databases: &'a dyn DatabaseAdmin,
}

impl<'a> Workspace<'a> {
    pub async fn allocate(&self, request: AllocateRequest) -> Result<AllocationOutcome> {
        let _lock = RegistryLock::acquire(self.repo_root)?;
        let registry = read_registry(self.repo_root)?;

        let (slot, source) = match request.target {
            WorktreeTarget::Existing { path } => {
                let path = self.existing_worktree(&path)?;
                match find_by_path(&registry, &path) {
                    Some((slot, _)) => {
                        if let Some(requested) = request.slot.filter(|r| *r != slot) {
                            return Err(Error::Conflict(format!(
                                "{} already holds slot {}; release it before requesting slot {}",
                                path.display(),
                                slot,
                                requested
                            )));
                        }
                        (slot, WorktreeSource::Reused(path))
                    }
                    None => (
                        resolve_slot(&registry, request.slot, self.config.max_slots)?,
                        WorktreeSource::Existing(path),
                    ),
                }
            }
            WorktreeTarget::New { branch } => (
                resolve_slot(&registry, request.slot, self.config.max_slots)?,
                WorktreeSource::Create(branch),
            ),
        };
        let reused = matches!(source, WorktreeSource::Reused(_));

        let context = patch_context(slot, self.config)?;

        let (worktree_path, branch_name) = match source {
            WorktreeSource::Existing(path) | WorktreeSource::Reused(path) => {
                let branch = self.worktrees.current_branch(&path).await?;
                (path, branch)
            }
            WorktreeSource::Create(branch) => {
                let base = self.config.worktree_base(self.repo_root);
                let path = self.worktrees.create(&base, &branch).await?;
                (canonical(&path), branch)
            }
        };

        let database = self.ensure_database(&context.db_name).await?;

        let env_files = copy_and_patch_all_env_files(
            &self.config.env_files,
            self.repo_root,
            &worktree_path,
            &context,
        )?;

        let allocation = Allocation {
            worktree_path,
            branch_name,
            db_name: context.db_name,
            redis_db: context.redis_db,
            ports: context.ports,
            created_at: Utc::now(),
        };
        let registry = add_allocation(&registry, slot, allocation.clone());
        write_registry(self.repo_root, &registry)?;

        tracing::info!(
            "Allocated slot {} to {} ({})",
            slot,
            allocation.worktree_path.display(),
            allocation.branch_name
        );

        Ok(AllocationOutcome {
            slot,
            allocation,
            env_files,
            database,
            reused,
        })
    }

    /// Drop the slot's database, remove its worktree, and forget the allocation.
    pub async fn release(
        &self,
        target: ReleaseTarget,
        options: ReleaseOptions,
    ) -> Result<ReleaseOutcome> {
        let _lock = RegistryLock::acquire(self.repo_root)?;
        let registry = read_registry(self.repo_root)?;

        let (slot, allocation) = match &target {
            ReleaseTarget::Slot(slot) => registry
                .get(*slot)
                .map(|allocation| (*slot, allocation.clone()))
                .ok_or_else(|| Error::NotFound(format!("slot {} is not allocated", slot)))?,
            ReleaseTarget::Path(path) => find_by_path(&registry, path)
                .map(|(slot, allocation)| (slot, allocation.clone()))
                .ok_or_else(|| {
                    Error::NotFound(format!("no allocation for {}", path.display()))
                })?,
        };

        let database = if options.keep_database {
            DropStep::Kept
        } else {
            match self.database_url()? {
                Some(url) => {
                    self.databases
                        .drop(&url, &allocation.db_name, &self.config.base_database_name)
                        .await?;
                    DropStep::Dropped
                }
                None => {
                    tracing::warn!(
                        "No database connection configured; leaving {} in place",
                        allocation.db_name
                    );
                    DropStep::Skipped
                }
            }
        };

        let worktree = if options.keep_worktree {
            RemoveStep::Kept
        } else if allocation.worktree_path.exists() {
            self.worktrees.remove(&allocation.worktree_path).await?;
            RemoveStep::Removed
        } else {
            tracing::debug!(
                "Worktree {} is already gone",
                allocation.worktree_path.display()
            );
            RemoveStep::AlreadyGone
        };

        write_registry(self.repo_root, &remove_allocation(&registry, slot))?;
        tracing::info!("Released slot {}", slot);

        Ok(ReleaseOutcome {
            slot,
            allocation,
            database,
            worktree,
        })
    }

    /// Forget allocations whose worktree is gone and report (optionally drop)
    /// slot databases nothing refers to.
    pub async fn prune(&self, drop_orphans: bool) -> Result<PruneReport> {
        let _lock = RegistryLock::acquire(self.repo_root)?;
        let mut registry = read_registry(self.repo_root)?;
        let mut report = PruneReport::default();

        for (slot, allocation) in &registry.allocations {
            if !allocation.worktree_path.exists() {
                report.stale.push((*slot, allocation.clone()));
            }
        }
        if !report.stale.is_empty() {
            for (slot, _) in &report.stale {
                registry = remove_allocation(&registry, *slot);
            }
            write_registry(self.repo_root, &registry)?;
        }

        let Some(url) = self.database_url()? else {
            tracing::warn!("No database connection configured; skipping orphan database check");
            return Ok(report);
        };

        let base = &self.config.base_database_name;
        let known: HashSet<&str> = registry
            .allocations
            .values()
            .map(|allocation| allocation.db_name.as_str())
            .collect();
        report.orphan_databases = self
            .databases
            .list_by_pattern(&url, &slot_database_pattern(base))
            .await?
            .into_iter()
            .filter(|name| slot_of_database(name, base).is_some())
            .filter(|name| !known.contains(name.as_str()))
            .collect();

        if drop_orphans {
            for name in &report.orphan_databases {
                self.databases.drop(&url, name, base).await?;
                report.dropped_databases.push(name.clone());
            }
        }

        Ok(report)
    }

    /// Run the configured `postSetup` commands inside `worktree_path`, in order.
    pub async fn run_post_setup(&self, worktree_path: &Path) -> Result<()> {
        for command in &self.config.post_setup {
            tracing::info!("Running `{}`", command);
            run_shell(command, worktree_path).await?;
        }
        Ok(())
    }

    /// Connection URL for database administration.
    ///
    /// The configured `databaseUrl`, else the value of the first `database`
    /// patch found in the repository's own env files.
    pub fn database_url(&self) -> Result<Option<String>> {
        if let Some(url) = &self.config.database_url {
            return Ok(Some(url.clone()));
        }

        for (source, var) in self.config.database_patch_sources() {
            let path = self.repo_root.join(source);
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(Error::Io(e)),
            };
            if let Some(url) = read_env_value(&content, var) {
                tracing::debug!("Using {} from {} as the database URL", var, path.display());
                return Ok(Some(url));
            }
        }

        Ok(None)
    }

    async fn ensure_database(&self, db_name: &str) -> Result<DatabaseStep> {
        let Some(url) = self.database_url()? else {
            tracing::warn!(
                "No database connection configured; skipping creation of {}",
                db_name
            );
            return Ok(DatabaseStep::Skipped);
        };

        if self.databases.exists(&url, db_name).await? {
            tracing::info!("Database {} already exists, reusing it", db_name);
            return Ok(DatabaseStep::AlreadyExists);
        }

        self.databases
            .create(&url, &self.config.base_database_name, db_name)
            .await?;
        Ok(DatabaseStep::Created)
    }

    fn existing_worktree(&self, path: &Path) -> Result<PathBuf> {
        if !path.is_dir() {
            return Err(Error::NotFound(format!(
                "worktree {} does not exist",
                path.display()
            )));
        }
        let path = canonical(path);
        if path == canonical(self.repo_root) {
            return Err(Error::Validation(format!(
                "{} is the primary checkout (slot 0) and cannot be allocated",
                path.display()
            )));
        }
        Ok(path)
    }
}
