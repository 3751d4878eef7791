//! Core configuration types.
//!
//! This module contains the root [`Config`] struct and related types
//! for the `wtenv.yaml` configuration file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_PORT_STRIDE: u16 = 100;
pub const DEFAULT_MAX_SLOTS: u32 = 15;
/// Upper bound for `maxSlots`. Redis ships with 16 logical databases and
/// index 0 belongs to the primary checkout.
pub const MAX_SLOTS_LIMIT: u32 = 15;

/// Root configuration structure for wtenv.yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Template database cloned for every slot; slot databases are named
    /// `{baseDatabaseName}_wt{slot}`.
    pub base_database_name: String,

    /// Directory new worktrees are created under. Relative paths resolve
    /// against the repository root. Defaults to `../<repo-dir>-worktrees`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_worktree_path: Option<PathBuf>,

    /// Connection URL used for database administration. When absent the
    /// value of the first `database` patch found in the env files is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_port_stride")]
    pub port_stride: u16,

    #[serde(default = "default_max_slots")]
    pub max_slots: u32,

    pub services: Vec<ServiceConfig>,

    #[serde(default)]
    pub env_files: Vec<EnvFileConfig>,

    /// Shell commands run inside a freshly set-up worktree.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_setup: Vec<String>,

    /// Run `postSetup` automatically instead of printing it as next steps.
    #[serde(default)]
    pub auto_install: bool,
}

fn default_port_stride() -> u16 {
    DEFAULT_PORT_STRIDE
}

fn default_max_slots() -> u32 {
    DEFAULT_MAX_SLOTS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceConfig {
    pub name: String,
    pub default_port: u16,
}

/// One env file copied from the main checkout into each worktree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnvFileConfig {
    /// Path relative to the repository root, reused verbatim under the worktree.
    pub source: PathBuf,
    #[serde(default)]
    pub patches: Vec<PatchConfig>,
}

/// A rule rewriting one variable of an env file.
///
/// Read through [`RawPatch`] so that unknown keys, and a `service` on a rule
/// type that takes none, are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPatch", into = "RawPatch")]
pub struct PatchConfig {
    pub var: String,
    pub kind: PatchKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchKind {
    /// Replace the database segment of a connection URL.
    Database,
    /// Point a redis URL at the slot's logical database.
    Redis,
    /// Replace the whole value with the service's port.
    Port { service: String },
    /// Replace the first `:<port>` inside a URL.
    Url { service: String },
}

/// On-disk shape of a patch rule: `{ var, type, service? }`.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPatch {
    var: String,
    #[serde(rename = "type")]
    kind: PatchType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    service: Option<String>,
}

#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PatchType {
    Database,
    Redis,
    Port,
    Url,
}

impl TryFrom<RawPatch> for PatchConfig {
    type Error = String;

    fn try_from(raw: RawPatch) -> Result<Self, Self::Error> {
        let kind = match (raw.kind, raw.service) {
            (PatchType::Database, None) => PatchKind::Database,
            (PatchType::Redis, None) => PatchKind::Redis,
            (PatchType::Port, Some(service)) => PatchKind::Port { service },
            (PatchType::Url, Some(service)) => PatchKind::Url { service },
            (PatchType::Database | PatchType::Redis, Some(_)) => {
                return Err(format!(
                    "patch for '{}': `service` is only allowed on port and url rules",
                    raw.var
                ))
            }
            (PatchType::Port | PatchType::Url, None) => {
                return Err(format!(
                    "patch for '{}': port and url rules need a `service`",
                    raw.var
                ))
            }
        };
        Ok(Self { var: raw.var, kind })
    }
}

impl From<PatchConfig> for RawPatch {
    fn from(patch: PatchConfig) -> Self {
        let (kind, service) = match patch.kind {
            PatchKind::Database => (PatchType::Database, None),
            PatchKind::Redis => (PatchType::Redis, None),
            PatchKind::Port { service } => (PatchType::Port, Some(service)),
            PatchKind::Url { service } => (PatchType::Url, Some(service)),
        };
        Self {
            var: patch.var,
            kind,
            service,
        }
    }
}

impl PatchConfig {
    pub fn database(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            kind: PatchKind::Database,
        }
    }

    pub fn redis(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            kind: PatchKind::Redis,
        }
    }

    pub fn port(var: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            kind: PatchKind::Port {
                service: service.into(),
            },
        }
    }

    pub fn url(var: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            kind: PatchKind::Url {
                service: service.into(),
            },
        }
    }

    /// The service this rule reads a port from, for `port` and `url` rules.
    pub fn service(&self) -> Option<&str> {
        match &self.kind {
            PatchKind::Port { service } | PatchKind::Url { service } => Some(service),
            PatchKind::Database | PatchKind::Redis => None,
        }
    }
}

impl Config {
    /// Minimal configuration with one service and no env files.
    pub fn new(base_database_name: impl Into<String>, services: Vec<ServiceConfig>) -> Self {
        Self {
            base_database_name: base_database_name.into(),
            base_worktree_path: None,
            database_url: None,
            port_stride: DEFAULT_PORT_STRIDE,
            max_slots: DEFAULT_MAX_SLOTS,
            services,
            env_files: Vec::new(),
            post_setup: Vec::new(),
            auto_install: false,
        }
    }

    /// Directory worktrees are created under, resolved against `repo_root`.
    pub fn worktree_base(&self, repo_root: &Path) -> PathBuf {
        match &self.base_worktree_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => repo_root.join(path),
            None => {
                let repo_name = repo_root
                    .file_name()
                    .unwrap_or_default()
                    .to_string_lossy();
                let parent = repo_root.parent().unwrap_or(repo_root);
                parent.join(format!("{}-worktrees", repo_name))
            }
        }
    }

    /// Every `(env file, variable)` pair carrying a `database` patch, in config order.
    pub fn database_patch_sources(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.env_files.iter().flat_map(|file| {
            file.patches
                .iter()
                .filter(|patch| patch.kind == PatchKind::Database)
                .map(move |patch| (file.source.as_path(), patch.var.as_str()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_base_defaults_next_to_repo() {
        let config = Config::new("app", vec![]);
        assert_eq!(
            config.worktree_base(Path::new("/src/app")),
            PathBuf::from("/src/app-worktrees")
        );
    }

    #[test]
    fn worktree_base_relative_resolves_against_repo() {
        let mut config = Config::new("app", vec![]);
        config.base_worktree_path = Some(PathBuf::from("../trees"));
        assert_eq!(
            config.worktree_base(Path::new("/src/app")),
            PathBuf::from("/src/app/../trees")
        );
    }

    #[test]
    fn service_is_only_set_for_port_and_url() {
        assert_eq!(PatchConfig::port("PORT", "web").service(), Some("web"));
        assert_eq!(PatchConfig::url("API_URL", "api").service(), Some("api"));
        assert_eq!(PatchConfig::database("DATABASE_URL").service(), None);
        assert_eq!(PatchConfig::redis("REDIS_URL").service(), None);
    }
}
