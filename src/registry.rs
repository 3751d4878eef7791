//! Persisted slot allocations.
//!
//! The registry is a single JSON document under `<repo>/.wtenv/registry.json`
//! mapping each occupied slot to the resources it owns. Reads validate the
//! whole document; writes go through [`atomic_write`] so a reader never sees
//! a torn file. The update functions are pure and return new values.

use crate::atomic::atomic_write;
use crate::config::MAX_SLOTS_LIMIT;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const REGISTRY_VERSION: u32 = 1;
pub const STATE_DIR: &str = ".wtenv";
const REGISTRY_FILE: &str = "registry.json";

/// A positive slot number. Slot 0 is the primary checkout and is never allocated.
pub type Slot = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    pub version: u32,
    /// Serialized with decimal string keys (`"3": {...}`).
    pub allocations: BTreeMap<Slot, Allocation>,
}

/// Resources bound to one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Allocation {
    pub worktree_path: PathBuf,
    pub branch_name: String,
    pub db_name: String,
    pub redis_db: u32,
    pub ports: BTreeMap<String, u16>,
    pub created_at: DateTime<Utc>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: REGISTRY_VERSION,
            allocations: BTreeMap::new(),
        }
    }
}

impl Registry {
    pub fn get(&self, slot: Slot) -> Option<&Allocation> {
        self.allocations.get(&slot)
    }

    pub fn is_empty(&self) -> bool {
        self.allocations.is_empty()
    }

    fn validate(&self) -> Result<()> {
        if self.version != REGISTRY_VERSION {
            return Err(Error::Validation(format!(
                "unsupported registry version {} (expected {})",
                self.version, REGISTRY_VERSION
            )));
        }

        for (slot, allocation) in &self.allocations {
            if *slot == 0 || *slot > MAX_SLOTS_LIMIT {
                return Err(Error::Validation(format!(
                    "slot {} is outside 1..={}",
                    slot, MAX_SLOTS_LIMIT
                )));
            }
            allocation
                .validate()
                .map_err(|reason| Error::Validation(format!("slot {}: {}", slot, reason)))?;
        }

        Ok(())
    }
}

impl Allocation {
    fn validate(&self) -> std::result::Result<(), String> {
        if !self.worktree_path.is_absolute() {
            return Err(format!(
                "worktreePath '{}' is not absolute",
                self.worktree_path.display()
            ));
        }
        if self.db_name.is_empty() {
            return Err("dbName is empty".to_string());
        }
        if self.redis_db == 0 {
            return Err("redisDb must be at least 1".to_string());
        }
        if let Some((service, _)) = self.ports.iter().find(|(_, port)| **port == 0) {
            return Err(format!("port for '{}' must be positive", service));
        }
        Ok(())
    }
}

/// Location of the registry file for a repository root.
pub fn registry_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(REGISTRY_FILE)
}

/// Load the registry, or an empty one if none has been written yet.
pub fn read_registry(root: &Path) -> Result<Registry> {
    let path = registry_path(root);

    // Directly try to read the file - avoid TOCTOU race
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Registry::default()),
        Err(e) => return Err(Error::Io(e)),
    };

    let registry: Registry = serde_json::from_str(&contents).map_err(|e| {
        Error::Validation(format!("malformed registry {}: {}", path.display(), e))
    })?;
    registry.validate()?;

    Ok(registry)
}

/// Persist the registry via write-then-rename.
pub fn write_registry(root: &Path, registry: &Registry) -> Result<()> {
    let path = registry_path(root);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut contents = serde_json::to_string_pretty(registry)?;
    contents.push('\n');
    atomic_write(&path, &contents)?;

    tracing::debug!(
        "Wrote registry with {} allocation(s) to {}",
        registry.allocations.len(),
        path.display()
    );
    Ok(())
}

/// Copy of `registry` with `slot` bound to `allocation`, replacing any previous binding.
pub fn add_allocation(registry: &Registry, slot: Slot, allocation: Allocation) -> Registry {
    let mut next = registry.clone();
    next.allocations.insert(slot, allocation);
    next
}

/// Copy of `registry` without `slot`. Removing a free slot changes nothing.
pub fn remove_allocation(registry: &Registry, slot: Slot) -> Registry {
    let mut next = registry.clone();
    next.allocations.remove(&slot);
    next
}

/// Find the allocation whose worktree is exactly `path`.
///
/// Both sides are canonicalized first, so `./wt`, `/abs/wt` and symlinked
/// spellings of the same directory all match.
pub fn find_by_path<'a>(registry: &'a Registry, path: &Path) -> Option<(Slot, &'a Allocation)> {
    let target = canonical(path);
    registry
        .allocations
        .iter()
        .find(|(_, allocation)| canonical(&allocation.worktree_path) == target)
        .map(|(slot, allocation)| (*slot, allocation))
}

/// Find the allocation whose worktree contains `path` (itself or any subdirectory).
pub fn find_containing<'a>(
    registry: &'a Registry,
    path: &Path,
) -> Option<(Slot, &'a Allocation)> {
    let target = canonical(path);
    registry
        .allocations
        .iter()
        .find(|(_, allocation)| target.starts_with(canonical(&allocation.worktree_path)))
        .map(|(slot, allocation)| (*slot, allocation))
}

/// Canonical form when the path exists, lexical absolute form otherwise
/// (removed worktrees still have to match their registry entry).
pub(crate) fn canonical(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
