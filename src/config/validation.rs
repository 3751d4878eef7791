use super::{Config, MAX_SLOTS_LIMIT};
use crate::env_patch::is_env_var_name;
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Component, Path};

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.base_database_name) {
            return Err(Error::Validation(format!(
                "baseDatabaseName '{}' must start with a letter or underscore and contain only letters, digits, and underscores",
                self.base_database_name
            )));
        }

        if self.port_stride == 0 {
            return Err(Error::Validation(
                "portStride must be a positive integer".to_string(),
            ));
        }

        if self.max_slots == 0 || self.max_slots > MAX_SLOTS_LIMIT {
            return Err(Error::Validation(format!(
                "maxSlots must be between 1 and {}, got {}",
                MAX_SLOTS_LIMIT, self.max_slots
            )));
        }

        self.validate_services()?;

        for file in &self.env_files {
            validate_env_source(&file.source)?;
            self.validate_patches(file)?;
        }

        for command in &self.post_setup {
            if command.trim().is_empty() {
                return Err(Error::Validation(
                    "postSetup commands must not be empty".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn validate_services(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(Error::Validation(
                "At least one service must be configured".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                return Err(Error::Validation(
                    "Service names must not be empty".to_string(),
                ));
            }
            if !seen.insert(service.name.as_str()) {
                return Err(Error::Validation(format!(
                    "Service '{}' is defined more than once",
                    service.name
                )));
            }
            if service.default_port == 0 {
                return Err(Error::Validation(format!(
                    "Service '{}' needs a positive defaultPort",
                    service.name
                )));
            }

            // The highest slot must still land on a valid port
            let highest = u32::from(service.default_port)
                + self.max_slots * u32::from(self.port_stride);
            if highest > u32::from(u16::MAX) {
                return Err(Error::Validation(format!(
                    "Service '{}' would use port {} in slot {}; lower portStride or maxSlots",
                    service.name, highest, self.max_slots
                )));
            }
        }

        Ok(())
    }

    fn validate_patches(&self, file: &super::EnvFileConfig) -> Result<()> {
        let mut vars = HashSet::new();
        for patch in &file.patches {
            if !is_env_var_name(&patch.var) {
                return Err(Error::Validation(format!(
                    "Patch variable '{}' in {} must be UPPER_SNAKE_CASE",
                    patch.var,
                    file.source.display()
                )));
            }
            if !vars.insert(patch.var.as_str()) {
                return Err(Error::Validation(format!(
                    "Variable '{}' is patched more than once in {}",
                    patch.var,
                    file.source.display()
                )));
            }
            if let Some(service) = patch.service() {
                if !self.services.iter().any(|s| s.name == service) {
                    return Err(Error::Validation(format!(
                        "Patch for '{}' in {} references unknown service '{}'",
                        patch.var,
                        file.source.display(),
                        service
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Env file sources are reused as paths under each worktree, so they must
/// stay inside it.
fn validate_env_source(source: &Path) -> Result<()> {
    if source.as_os_str().is_empty() {
        return Err(Error::Validation(
            "envFiles source must not be empty".to_string(),
        ));
    }
    let escapes = source
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(Error::Validation(format!(
            "envFiles source '{}' must be a relative path without '..'",
            source.display()
        )));
    }
    Ok(())
}

pub(crate) fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
