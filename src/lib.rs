//! # worktree-env
//!
//! Gives every git worktree of a project its own database, redis index, and
//! port range, all derived from a small integer *slot*.
//!
//! ## Pieces
//!
//! - [`registry`] - the persisted slot -> allocation map (`.wtenv/registry.json`)
//! - [`allocator`] - pure slot selection and port / database-name derivation
//! - [`env_patch`] - line-faithful rewriting of `.env` files for a slot
//! - [`workflow`] - the allocate / release sequence over git and PostgreSQL
//!
//! ## Quick Start
//!
//! ```no_run
//! use worktree_env::{Parser, PsqlAdmin, GitWorktrees, Workspace};
//! use worktree_env::workflow::{AllocateRequest, WorktreeTarget};
//!
//! # async fn example() -> Result<(), worktree_env::Error> {
//! let config_path = Parser::new().find_config_file()?;
//! let config = Parser::new().load_validated(&config_path)?;
//! let repo_root = config_path.parent().unwrap();
//!
//! let worktrees = GitWorktrees::new(repo_root);
//! let databases = PsqlAdmin::new();
//! let workspace = Workspace {
//!     config: &config,
//!     repo_root,
//!     worktrees: &worktrees,
//!     databases: &databases,
//! };
//!
//! let outcome = workspace
//!     .allocate(AllocateRequest {
//!         target: WorktreeTarget::New { branch: "feature/login".into() },
//!         slot: None,
//!     })
//!     .await?;
//! println!("slot {} -> {}", outcome.slot, outcome.allocation.db_name);
//! # Ok(())
//! # }
//! ```

pub mod allocator;
pub mod atomic;
pub mod config;
pub mod database;
pub mod env_patch;
pub mod error;
pub mod lock;
pub mod process;
pub mod registry;
pub mod workflow;
pub mod worktree;

// Re-export commonly used types
pub use allocator::{calculate_db_name, calculate_ports, find_available_slot, resolve_slot};
pub use config::{Config, EnvFileConfig, Parser, PatchConfig, PatchKind, ServiceConfig};
pub use database::{DatabaseAdmin, PsqlAdmin};
pub use env_patch::{copy_and_patch_all_env_files, patch_env_content, PatchContext};
pub use error::{Error, Result};
pub use registry::{
    add_allocation, find_by_path, read_registry, remove_allocation, write_registry, Allocation,
    Registry, Slot,
};
pub use workflow::Workspace;
pub use worktree::{GitWorktrees, WorktreeProvider};
