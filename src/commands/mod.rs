mod allocate;
mod init;
mod list;
mod prune;
mod rm;
mod validate;

pub use allocate::{run_new, run_setup};
pub use init::run_init;
pub use list::{run_list, run_status};
pub use prune::run_prune;
pub use rm::run_rm;
pub use validate::run_validate;

use std::path::{Path, PathBuf};
use worktree_env::Config;

/// Everything a config-backed command needs.
pub struct CommandContext {
    pub config: Config,
    /// Directory holding the config file.
    pub repo_root: PathBuf,
    pub workdir: PathBuf,
}

impl CommandContext {
    /// Resolve a user-supplied path against the working directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workdir.join(path)
        }
    }
}
