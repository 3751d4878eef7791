use super::CommandContext;
use crate::output::{to_json, UserOutput};
use worktree_env::{GitWorktrees, PsqlAdmin, Workspace};

pub async fn run_prune(
    ctx: &CommandContext,
    drop_orphans: bool,
    json: bool,
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

    let report = workspace.prune(drop_orphans).await?;

    if json {
        out.json(&to_json(&report)?);
        return Ok(());
    }

    if report.stale.is_empty() {
        out.status("No stale allocations");
    } else {
        out.success(&format!("Forgot {} stale allocation(s):", report.stale.len()));
        for (slot, allocation) in &report.stale {
            out.status(&format!(
                "  {:>2}  {}  (database {} kept)",
                slot,
                allocation.worktree_path.display(),
                allocation.db_name
            ));
        }
    }

    if !report.dropped_databases.is_empty() {
        out.success(&format!(
            "Dropped {} orphaned database(s):",
            report.dropped_databases.len()
        ));
        for name in &report.dropped_databases {
            out.status(&format!("  {}", name));
        }
    } else if !report.orphan_databases.is_empty() {
        out.warning(&format!(
            "{} orphaned database(s) with no allocation:",
            report.orphan_databases.len()
        ));
        for name in &report.orphan_databases {
            out.warning(&format!("  {}", name));
        }
        out.warning("Run `wtenv prune --drop-orphans` to drop them");
    }

    Ok(())
}
