/// Property-based tests for slot allocation
///
/// These tests generate random service sets and registries and verify:
/// - Different slots never share a port when the stride covers the port spread
/// - Slot selection always returns the lowest free slot
/// - Adding then removing an allocation restores the registry
/// - Patching with the same context is idempotent
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::PathBuf;
use worktree_env::{
    add_allocation, calculate_db_name, calculate_ports, find_available_slot, patch_env_content,
    remove_allocation, Allocation, PatchConfig, PatchContext, Registry, ServiceConfig,
};

const MAX_SLOTS: u32 = 15;

fn allocation(slot: u32) -> Allocation {
    Allocation {
        worktree_path: PathBuf::from(format!("/tmp/wt-{}", slot)),
        branch_name: format!("branch-{}", slot),
        db_name: calculate_db_name(slot, "app"),
        redis_db: slot,
        ports: BTreeMap::new(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn registry_with(slots: &BTreeSet<u32>) -> Registry {
    slots
        .iter()
        .fold(Registry::default(), |registry, slot| {
            add_allocation(&registry, *slot, allocation(*slot))
        })
}

/// Strategy for services whose default ports span less than `stride`
fn services_strategy() -> impl Strategy<Value = (Vec<ServiceConfig>, u16)> {
    (3000u16..4000, prop::collection::vec(0u16..50, 1..6), 50u16..200).prop_map(
        |(base, offsets, stride)| {
            let unique: BTreeSet<u16> = offsets.into_iter().collect();
            let services = unique
                .into_iter()
                .enumerate()
                .map(|(i, offset)| ServiceConfig {
                    name: format!("svc{}", i),
                    default_port: base + offset,
                })
                .collect();
            (services, stride)
        },
    )
}

proptest! {
    #[test]
    fn prop_ports_are_disjoint_across_slots(
        (services, stride) in services_strategy(),
        a in 1u32..=MAX_SLOTS,
        b in 1u32..=MAX_SLOTS,
    ) {
        prop_assume!(a != b);

        let ports_a: HashSet<u16> = calculate_ports(a, &services, stride).unwrap().into_values().collect();
        let ports_b: HashSet<u16> = calculate_ports(b, &services, stride).unwrap().into_values().collect();

        prop_assert!(ports_a.is_disjoint(&ports_b));
    }

    #[test]
    fn prop_ports_are_deterministic(
        (services, stride) in services_strategy(),
        slot in 1u32..=MAX_SLOTS,
    ) {
        let first = calculate_ports(slot, &services, stride).unwrap();
        let _ = calculate_ports(slot % MAX_SLOTS + 1, &services, stride).unwrap();
        let second = calculate_ports(slot, &services, stride).unwrap();

        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_find_available_slot_is_lowest_free(
        occupied in prop::collection::btree_set(1u32..=MAX_SLOTS, 0..=MAX_SLOTS as usize),
    ) {
        let registry = registry_with(&occupied);
        let expected = (1..=MAX_SLOTS).find(|slot| !occupied.contains(slot));

        prop_assert_eq!(find_available_slot(&registry, MAX_SLOTS), expected);
    }

    #[test]
    fn prop_add_then_remove_restores_registry(
        occupied in prop::collection::btree_set(1u32..=MAX_SLOTS, 0..10),
        slot in 1u32..=MAX_SLOTS,
    ) {
        prop_assume!(!occupied.contains(&slot));
        let original = registry_with(&occupied);
        let snapshot = original.clone();

        let added = add_allocation(&original, slot, allocation(slot));
        prop_assert!(added.allocations.contains_key(&slot));
        prop_assert_eq!(&original, &snapshot);

        let removed = remove_allocation(&added, slot);
        prop_assert_eq!(removed, snapshot);
    }

    #[test]
    fn prop_port_patch_is_idempotent(
        initial in 1u16..=65535,
        port in 1u16..=65535,
        comment in "# [a-z0-9 ]{0,12}",
    ) {
        let context = PatchContext {
            db_name: "app_wt1".to_string(),
            redis_db: 1,
            ports: BTreeMap::from([("server".to_string(), port)]),
        };
        let rules = vec![PatchConfig::port("PORT", "server"), PatchConfig::redis("REDIS_URL")];
        let input = format!("{}\nPORT={}\nREDIS_URL=redis://localhost:6379\n", comment, initial);

        let once = patch_env_content(&input, &rules, &context).unwrap();
        let twice = patch_env_content(&once, &rules, &context).unwrap();

        prop_assert_eq!(&once, &twice);
        let expected_prefix = format!("{}\n", comment);
        prop_assert!(once.starts_with(&expected_prefix));
    }
}

#[test]
fn test_find_available_slot_example() {
    let registry = registry_with(&BTreeSet::from([1, 2, 4]));
    assert_eq!(find_available_slot(&registry, MAX_SLOTS), Some(3));

    let full = registry_with(&(1..=MAX_SLOTS).collect());
    assert_eq!(find_available_slot(&full, MAX_SLOTS), None);
}
