use super::CommandContext;
use crate::output::{to_json, UserOutput};
use std::path::PathBuf;
use worktree_env::registry::find_containing;
use worktree_env::{read_registry, Allocation, Slot};

pub fn run_list(ctx: &CommandContext, json: bool, out: &dyn UserOutput) -> anyhow::Result<()> {
    let registry = read_registry(&ctx.repo_root)?;

    if json {
        out.json(&to_json(&registry)?);
        return Ok(());
    }

    out.status(&format!(
        "Slots ({}/{} used):",
        registry.allocations.len(),
        ctx.config.max_slots
    ));
    out.status(&format!("{:-<60}", ""));

    if registry.is_empty() {
        out.status("  No worktrees allocated");
        return Ok(());
    }

    for (slot, allocation) in &registry.allocations {
        let marker = if allocation.worktree_path.exists() {
            "+"
        } else {
            "x"
        };
        out.status(&format!(
            "  {} {:>2}  {:<30} {}",
            marker,
            slot,
            allocation.branch_name,
            allocation.worktree_path.display()
        ));
    }

    if registry
        .allocations
        .values()
        .any(|allocation| !allocation.worktree_path.exists())
    {
        out.blank();
        out.warning("Entries marked x point at missing worktrees; run `wtenv prune`");
    }

    Ok(())
}

pub fn run_status(
    ctx: &CommandContext,
    path: Option<PathBuf>,
    json: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let path = match path {
        Some(path) => ctx.resolve(&path),
        None => ctx.workdir.clone(),
    };
    let registry = read_registry(&ctx.repo_root)?;

    let Some((slot, allocation)) = find_containing(&registry, &path) else {
        if json {
            out.json(&serde_json::json!({ "slot": 0 }));
        } else {
            out.status(&format!(
                "{} is not an allocated worktree (slot 0)",
                path.display()
            ));
        }
        return Ok(());
    };

    if json {
        out.json(&serde_json::json!({
            "slot": slot,
            "allocation": to_json(allocation)?,
        }));
    } else {
        print_allocation(slot, allocation, out);
    }

    Ok(())
}

fn print_allocation(slot: Slot, allocation: &Allocation, out: &dyn UserOutput) {
    out.status(&format!("Slot {}", slot));
    out.status(&format!("{:-<40}", ""));
    out.status(&format!("  Worktree: {}", allocation.worktree_path.display()));
    out.status(&format!("  Branch:   {}", allocation.branch_name));
    out.status(&format!("  Database: {}", allocation.db_name));
    out.status(&format!("  Redis DB: {}", allocation.redis_db));
    out.status(&format!(
        "  Created:  {}",
        allocation.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.status("  Ports:");
    for (service, port) in &allocation.ports {
        out.status(&format!("    {:<20} {}", service, port));
    }
}
