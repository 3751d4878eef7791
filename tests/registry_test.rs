use chrono::{TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;
use worktree_env::lock::RegistryLock;
use worktree_env::registry::{find_containing, registry_path};
use worktree_env::{
    add_allocation, find_by_path, read_registry, write_registry, Allocation, Error, Registry,
};

fn allocation(root: &std::path::Path, slot: u32) -> Allocation {
    let worktree_path = root.join(format!("wt-{}", slot));
    fs::create_dir_all(&worktree_path).unwrap();
    Allocation {
        worktree_path: worktree_path.canonicalize().unwrap(),
        branch_name: format!("feature-{}", slot),
        db_name: format!("app_wt{}", slot),
        redis_db: slot,
        ports: BTreeMap::from([("web".to_string(), 3000 + slot as u16 * 100)]),
        created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
    }
}

#[test]
fn test_missing_registry_reads_as_empty() {
    let temp = TempDir::new().unwrap();

    let registry = read_registry(temp.path()).unwrap();

    assert!(registry.is_empty());
    assert!(!registry_path(temp.path()).exists());
}

#[test]
fn test_write_then_read_round_trip() {
    let temp = TempDir::new().unwrap();
    let registry = add_allocation(&Registry::default(), 2, allocation(temp.path(), 2));
    let registry = add_allocation(&registry, 5, allocation(temp.path(), 5));

    write_registry(temp.path(), &registry).unwrap();
    let loaded = read_registry(temp.path()).unwrap();

    assert_eq!(loaded, registry);
}

#[test]
fn test_registry_file_format() {
    let temp = TempDir::new().unwrap();
    let registry = add_allocation(&Registry::default(), 3, allocation(temp.path(), 3));

    write_registry(temp.path(), &registry).unwrap();

    let text = fs::read_to_string(registry_path(temp.path())).unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(json["version"], 1);
    let entry = &json["allocations"]["3"];
    assert_eq!(entry["dbName"], "app_wt3");
    assert_eq!(entry["redisDb"], 3);
    assert_eq!(entry["branchName"], "feature-3");
    assert_eq!(entry["ports"]["web"], 3300);
    assert!(entry["createdAt"].as_str().unwrap().starts_with("2024-05-01T12:30:00"));
}

#[test]
fn test_corrupt_registry_is_an_error() {
    let temp = TempDir::new().unwrap();
    let path = registry_path(temp.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ not json").unwrap();

    let err = read_registry(temp.path()).unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_lookup_by_path_and_subdirectory() {
    let temp = TempDir::new().unwrap();
    let registry = add_allocation(&Registry::default(), 4, allocation(temp.path(), 4));
    let worktree = temp.path().join("wt-4");
    fs::create_dir_all(worktree.join("src/deep")).unwrap();

    assert_eq!(find_by_path(&registry, &worktree).map(|(slot, _)| slot), Some(4));
    assert!(find_by_path(&registry, &worktree.join("src")).is_none());
    assert_eq!(
        find_containing(&registry, &worktree.join("src/deep")).map(|(slot, _)| slot),
        Some(4)
    );
    assert!(find_containing(&registry, temp.path()).is_none());
}

#[test]
fn test_lock_refuses_second_holder_until_dropped() {
    let temp = TempDir::new().unwrap();

    let lock = RegistryLock::acquire(temp.path()).unwrap();
    assert!(lock.path().exists());

    let err = RegistryLock::acquire(temp.path()).unwrap_err();
    assert!(matches!(err, Error::Conflict(ref msg) if msg.contains("registry lock")));
    assert!(err.suggestion().is_some());

    drop(lock);
    assert!(RegistryLock::acquire(temp.path()).is_ok());
}
