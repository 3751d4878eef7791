use super::CommandContext;
use crate::cli::AllocateArgs;
use crate::output::{to_json, UserOutput};
use std::path::PathBuf;
use worktree_env::workflow::{AllocateRequest, AllocationOutcome, DatabaseStep, WorktreeTarget};
use worktree_env::{GitWorktrees, PsqlAdmin, Workspace};

pub async fn run_new(
    ctx: &CommandContext,
    branch: String,
    args: &AllocateArgs,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    allocate(ctx, WorktreeTarget::New { branch }, args, out).await
}

pub async fn run_setup(
    ctx: &CommandContext,
    path: Option<PathBuf>,
    args: &AllocateArgs,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => ctx.resolve(&path),
        None => ctx.workdir.clone(),
    };
    allocate(ctx, WorktreeTarget::Existing { path }, args, out).await
}

async fn allocate(
    ctx: &CommandContext,
    target: WorktreeTarget,
    args: &AllocateArgs,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let worktrees = GitWorktrees::new(&ctx.repo_root);
    let databases = PsqlAdmin::new();
    let workspace = Workspace {
        config: &ctx.config,
        repo_root: &ctx.repo_root,
        worktrees: &worktrees,
        databases: &databases,
    };

    let outcome = workspace
        .allocate(AllocateRequest {
            target,
            slot: args.slot,
        })
        .await?;

    let install = ctx.config.auto_install && !args.no_install;

    if args.json {
        out.json(&to_json(&outcome)?);
        if install {
            workspace.run_post_setup(&outcome.allocation.worktree_path).await?;
        }
        return Ok(());
    }

    report(&outcome, out);

    if ctx.config.post_setup.is_empty() {
        return Ok(());
    }

    out.blank();
    if install {
        out.status("Running postSetup:");
        workspace.run_post_setup(&outcome.allocation.worktree_path).await?;
        out.success("postSetup finished");
    } else {
        out.status("Next steps:");
        out.status(&format!(
            "  cd {}",
            outcome.allocation.worktree_path.display()
        ));
        for command in &ctx.config.post_setup {
            out.status(&format!("  {}", command));
        }
    }

    Ok(())
}

fn report(outcome: &AllocationOutcome, out: &dyn UserOutput) {
    let allocation = &outcome.allocation;
    if outcome.reused {
        out.success(&format!(
            "Refreshed slot {} for {}",
            outcome.slot,
            allocation.worktree_path.display()
        ));
    } else {
        out.success(&format!(
            "Allocated slot {} to {}",
            outcome.slot,
            allocation.worktree_path.display()
        ));
    }

    out.status(&format!("  Branch:   {}", allocation.branch_name));
    let db_note = match outcome.database {
        DatabaseStep::Created => "created",
        DatabaseStep::AlreadyExists => "already existed",
        DatabaseStep::Skipped => "not created, no database connection",
    };
    out.status(&format!("  Database: {} ({})", allocation.db_name, db_note));
    out.status(&format!("  Redis DB: {}", allocation.redis_db));
    for (service, port) in &allocation.ports {
        out.status(&format!("  {:<10}{}", format!("{}:", service), port));
    }

    if outcome.env_files.is_empty() {
        out.warning("No env files were copied");
    } else {
        for file in &outcome.env_files {
            out.status(&format!("  Patched   {}", file.display()));
        }
    }
}
