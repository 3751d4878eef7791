//! Slot selection and the resources derived from a slot.
//!
//! Everything here is a pure function of the configuration and the
//! registry: a slot always maps to the same ports, database name, and redis
//! index.

use crate::config::{Config, ServiceConfig};
use crate::env_patch::PatchContext;
use crate::error::{Error, Result};
use crate::registry::{Registry, Slot};
use std::collections::BTreeMap;

/// `slot * stride + defaultPort` for every service.
pub fn calculate_ports(
    slot: Slot,
    services: &[ServiceConfig],
    stride: u16,
) -> Result<BTreeMap<String, u16>> {
    services
        .iter()
        .map(|service| {
            let port = u64::from(slot) * u64::from(stride) + u64::from(service.default_port);
            let port = u16::try_from(port).map_err(|_| {
                Error::Validation(format!(
                    "port {} for service '{}' in slot {} is above 65535",
                    port, service.name, slot
                ))
            })?;
            Ok((service.name.clone(), port))
        })
        .collect()
}

pub fn calculate_db_name(slot: Slot, base_name: &str) -> String {
    format!("{}_wt{}", base_name, slot)
}

/// Lowest slot in `1..=max_slots` with no allocation.
pub fn find_available_slot(registry: &Registry, max_slots: u32) -> Option<Slot> {
    (1..=max_slots).find(|slot| !registry.allocations.contains_key(slot))
}

/// Pick the slot for a new allocation.
///
/// An explicit request is honored exactly or rejected; it is never swapped
/// for another free slot.
pub fn resolve_slot(registry: &Registry, requested: Option<Slot>, max_slots: u32) -> Result<Slot> {
    match requested {
        Some(slot) => {
            if slot == 0 || slot > max_slots {
                return Err(Error::Validation(format!(
                    "slot {} is outside the allowed range 1..={}",
                    slot, max_slots
                )));
            }
            if let Some(existing) = registry.get(slot) {
                return Err(Error::Conflict(format!(
                    "slot {} is already allocated to {} ({})",
                    slot,
                    existing.worktree_path.display(),
                    existing.branch_name
                )));
            }
            Ok(slot)
        }
        None => find_available_slot(registry, max_slots).ok_or_else(|| {
            Error::Conflict(format!(
                "No free slot: all {} slots are allocated",
                max_slots
            ))
        }),
    }
}

/// Resolved values the env patcher needs for `slot`.
pub fn patch_context(slot: Slot, config: &Config) -> Result<PatchContext> {
    Ok(PatchContext {
        db_name: calculate_db_name(slot, &config.base_database_name),
        redis_db: slot,
        ports: calculate_ports(slot, &config.services, config.port_stride)?,
    })
}
