use super::CommandContext;
use crate::output::UserOutput;
use worktree_env::workflow::{DropStep, ReleaseOptions, ReleaseOutcome, ReleaseTarget, RemoveStep};
use worktree_env::{GitWorktrees, PsqlAdmin, Workspace};

pub async fn run_rm(
    ctx: &CommandContext,
    target: &str,
    options: ReleaseOptions,
    force: bool,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let target = parse_target(ctx, target);

    let worktrees = GitWorktrees::new(&ctx.repo_root).with_force_remove(force);
    let databases = PsqlAdmin::new();
    let workspace = Workspace {
        config: &ctx.config,
        repo_root: &ctx.repo_root,
        worktrees: &worktrees,
        databases: &databases,
    };

    let outcome = workspace.release(target, options).await?;
    report(&outcome, out);

    Ok(())
}

fn report(outcome: &ReleaseOutcome, out: &dyn UserOutput) {
    let allocation = &outcome.allocation;
    out.success(&format!("Released slot {}", outcome.slot));

    match outcome.database {
        DropStep::Dropped => out.status(&format!("  Dropped database {}", allocation.db_name)),
        DropStep::Kept => out.status(&format!("  Kept database {}", allocation.db_name)),
        DropStep::Skipped => out.warning(&format!(
            "  Database {} was not dropped: no database connection configured",
            allocation.db_name
        )),
    }

    let path = allocation.worktree_path.display();
    match outcome.worktree {
        RemoveStep::Removed => out.status(&format!("  Removed worktree {}", path)),
        RemoveStep::Kept => out.status(&format!("  Kept worktree {}", path)),
        RemoveStep::AlreadyGone => out.status(&format!("  Worktree {} was already gone", path)),
    }
}

/// A bare number is a slot; anything else is a worktree path.
fn parse_target(ctx: &CommandContext, target: &str) -> ReleaseTarget {
    match target.parse::<u32>() {
        Ok(slot) => ReleaseTarget::Slot(slot),
        Err(_) => ReleaseTarget::Path(ctx.resolve(std::path::Path::new(target))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use worktree_env::{Allocation, Config, ServiceConfig};

    #[derive(Default)]
    struct Recorded {
        lines: Mutex<Vec<String>>,
    }

    impl Recorded {
        fn push(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        fn text(&self) -> String {
            self.lines.lock().unwrap().join("\n")
        }
    }

    impl UserOutput for Recorded {
        fn status(&self, message: &str) {
            self.push(message);
        }
        fn success(&self, message: &str) {
            self.push(message);
        }
        fn warning(&self, message: &str) {
            self.push(message);
        }
        fn blank(&self) {}
        fn json(&self, value: &serde_json::Value) {
            self.push(&value.to_string());
        }
    }

    fn outcome(database: DropStep, worktree: RemoveStep) -> ReleaseOutcome {
        ReleaseOutcome {
            slot: 2,
            allocation: Allocation {
                worktree_path: PathBuf::from("/wt/two"),
                branch_name: "two".into(),
                db_name: "app_wt2".into(),
                redis_db: 2,
                ports: BTreeMap::new(),
                created_at: Utc::now(),
            },
            database,
            worktree,
        }
    }

    #[test]
    fn skipped_drop_is_not_reported_as_dropped() {
        let out = Recorded::default();
        report(&outcome(DropStep::Skipped, RemoveStep::AlreadyGone), &out);

        let text = out.text();
        assert!(!text.contains("Dropped database"));
        assert!(text.contains("app_wt2 was not dropped"));
        assert!(text.contains("already gone"));
    }

    #[test]
    fn dropped_and_removed_are_reported() {
        let out = Recorded::default();
        report(&outcome(DropStep::Dropped, RemoveStep::Removed), &out);

        let text = out.text();
        assert!(text.contains("Dropped database app_wt2"));
        assert!(text.contains("Removed worktree /wt/two"));
    }

    fn ctx() -> CommandContext {
        CommandContext {
            config: Config::new(
                "app",
                vec![ServiceConfig {
                    name: "web".into(),
                    default_port: 3000,
                }],
            ),
            repo_root: PathBuf::from("/repo"),
            workdir: PathBuf::from("/work"),
        }
    }

    #[test]
    fn numeric_target_is_a_slot() {
        assert!(matches!(parse_target(&ctx(), "3"), ReleaseTarget::Slot(3)));
    }

    #[test]
    fn other_targets_are_paths_relative_to_workdir() {
        match parse_target(&ctx(), "wt-3") {
            ReleaseTarget::Path(path) => assert_eq!(path, PathBuf::from("/work/wt-3")),
            other => panic!("expected a path, got {:?}", other),
        }
        match parse_target(&ctx(), "/abs/wt") {
            ReleaseTarget::Path(path) => assert_eq!(path, PathBuf::from("/abs/wt")),
            other => panic!("expected a path, got {:?}", other),
        }
    }
}
