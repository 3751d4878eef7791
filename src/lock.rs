use crate::error::{Error, Result};
use crate::registry::STATE_DIR;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "registry.lock";

/// Advisory lock held across a registry read-modify-write.
///
/// A non-blocking exclusive lock on `.wtenv/registry.lock`: a second holder
/// fails instead of waiting. The OS releases the lock when the guard's file
/// handle is closed, including when the process dies, so there is no stale
/// lock to clean up. The file itself stays behind and records the last
/// holder's PID.
#[derive(Debug)]
pub struct RegistryLock {
    path: PathBuf,
    _file: File,
}

impl RegistryLock {
    pub fn acquire(root: &Path) -> Result<Self> {
        let dir = root.join(STATE_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(LOCK_FILE);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            tracing::debug!("Lock acquisition failed: {} (kind: {:?})", e, e.kind());
            let holder = fs::read_to_string(&path).unwrap_or_default();
            return Err(Error::Conflict(format!(
                "registry lock {} is held{}",
                path.display(),
                match holder.trim() {
                    "" => String::new(),
                    pid => format!(" by PID {}", pid),
                }
            )));
        }

        // Record our PID for the error above
        let _ = file.set_len(0);
        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            tracing::debug!("Failed to record PID in {}: {}", path.display(), e);
        }

        tracing::debug!("Acquired {}", path.display());
        Ok(Self { path, _file: file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
