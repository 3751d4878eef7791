use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wtenv", version)]
#[command(about = "Worktree Env - isolated databases, redis indexes, and ports per git worktree")]
pub struct Cli {
    /// Config file path (defaults to the nearest wtenv.yaml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Working directory
    #[arg(short, long, global = true)]
    pub workdir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter wtenv.yaml
    Init {
        /// Output path
        #[arg(short, long, default_value = "wtenv.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
    /// Create a worktree for a branch and allocate a slot for it
    New {
        /// Branch to check out (created if it does not exist)
        branch: String,

        #[command(flatten)]
        allocate: AllocateArgs,
    },
    /// Allocate a slot for an existing worktree
    Setup {
        /// Worktree path (defaults to the working directory)
        path: Option<PathBuf>,

        #[command(flatten)]
        allocate: AllocateArgs,
    },
    /// Release a slot: drop its database and remove its worktree
    #[command(alias = "remove")]
    Rm {
        /// Slot number or worktree path
        target: String,

        /// Keep the slot's database
        #[arg(long)]
        keep_db: bool,

        /// Keep the worktree directory
        #[arg(long)]
        keep_worktree: bool,

        /// Remove the worktree even if it has uncommitted changes
        #[arg(short, long)]
        force: bool,
    },
    /// List allocated slots
    #[command(alias = "ls")]
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the allocation of a worktree
    Status {
        /// Worktree path (defaults to the working directory)
        path: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forget allocations whose worktree is gone and find orphaned databases
    Prune {
        /// Drop slot databases that no allocation refers to
        #[arg(long)]
        drop_orphans: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the configuration file
    Validate,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[derive(clap::Args, Clone, Debug)]
pub struct AllocateArgs {
    /// Use this slot instead of the lowest free one
    #[arg(short, long)]
    pub slot: Option<u32>,

    /// Do not run postSetup commands even if autoInstall is set
    #[arg(long)]
    pub no_install: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
