mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use worktree_env::{Error as WtError, Parser as ConfigParser};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(wt_error) = e.downcast_ref::<WtError>() {
            eprintln!("Error: {}", wt_error);
            if let Some(suggestion) = wt_error.suggestion() {
                eprintln!("\nHint: {}", suggestion);
            }
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(exit_code(&e));
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let workdir = match cli.workdir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    // ── Tier 1: Commands that need NO config ──────────────────────────
    match &cli.command {
        Commands::Init { output, force } => {
            return commands::run_init(&workdir.join(output), *force, &output::CliOutput);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
            return Ok(());
        }
        _ => {} // fall through to config-loading path
    }

    // ── Load config ─────────────────────────────────────────────────
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => ConfigParser::find_config_in_dir(&workdir)?,
    };

    if let Commands::Validate = cli.command {
        return commands::run_validate(&config_path, &output::CliOutput);
    }

    let config = ConfigParser::new().load_validated(&config_path)?;
    let ctx = commands::CommandContext {
        repo_root: resolve_repo_root(&config_path)?,
        config,
        workdir,
    };

    let out = &output::CliOutput;
    match cli.command {
        Commands::New { branch, allocate } => commands::run_new(&ctx, branch, &allocate, out).await,
        Commands::Setup { path, allocate } => {
            commands::run_setup(&ctx, path, &allocate, out).await
        }
        Commands::Rm {
            target,
            keep_db,
            keep_worktree,
            force,
        } => {
            let options = worktree_env::workflow::ReleaseOptions {
                keep_database: keep_db,
                keep_worktree,
            };
            commands::run_rm(&ctx, &target, options, force, out).await
        }
        Commands::List { json } => commands::run_list(&ctx, json, out),
        Commands::Status { path, json } => commands::run_status(&ctx, path, json, out),
        Commands::Prune { drop_orphans, json } => {
            commands::run_prune(&ctx, drop_orphans, json, out).await
        }
        // Handled before the config was loaded
        Commands::Init { .. } | Commands::Completions { .. } | Commands::Validate => {
            unreachable!("handled in earlier dispatch tiers");
        }
    }
}

/// The repository root is the directory holding the config file.
fn resolve_repo_root(config_path: &Path) -> anyhow::Result<PathBuf> {
    let root = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    Ok(root.canonicalize()?)
}

fn exit_code(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<WtError>() {
        Some(WtError::Config(_) | WtError::Validation(_)) => 2,
        Some(WtError::NotFound(_)) => 3,
        Some(WtError::Conflict(_)) => 4,
        Some(WtError::Patch { .. }) => 5,
        _ => 1,
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
