//! Env file patching: line fidelity, rule semantics, and file copying.

use std::collections::BTreeMap;
use std::fs;
use tempfile::TempDir;
use worktree_env::{
    copy_and_patch_all_env_files, patch_env_content, EnvFileConfig, Error, PatchConfig,
    PatchContext,
};

fn context() -> PatchContext {
    let mut ports = BTreeMap::new();
    ports.insert("server".to_string(), 3301);
    ports.insert("web".to_string(), 3300);
    PatchContext {
        db_name: "app_wt3".to_string(),
        redis_db: 3,
        ports,
    }
}

#[test]
fn test_port_rule_is_idempotent() {
    let rules = vec![PatchConfig::port("PORT", "server")];

    let once = patch_env_content("PORT=3001\n", &rules, &context()).unwrap();
    assert_eq!(once, "PORT=3301\n");

    let twice = patch_env_content(&once, &rules, &context()).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn test_database_rule_keeps_quotes_and_query() {
    let rules = vec![PatchConfig::database("DATABASE_URL")];
    let input = "DATABASE_URL=\"postgresql://u:p@h:5432/app?schema=public\"\n";

    let output = patch_env_content(input, &rules, &context()).unwrap();

    assert_eq!(
        output,
        "DATABASE_URL=\"postgresql://u:p@h:5432/app_wt3?schema=public\"\n"
    );
}

#[test]
fn test_redis_rule_appends_missing_index() {
    let rules = vec![PatchConfig::redis("REDIS_URL")];

    let output = patch_env_content("REDIS_URL=redis://h:6379\n", &rules, &context()).unwrap();
    assert_eq!(output, "REDIS_URL=redis://h:6379/3\n");

    let again = patch_env_content(&output, &rules, &context()).unwrap();
    assert_eq!(again, output);
}

#[test]
fn test_redis_rule_replaces_existing_index() {
    let rules = vec![PatchConfig::redis("REDIS_URL")];

    let output = patch_env_content("REDIS_URL=redis://h:6379/0\n", &rules, &context()).unwrap();

    assert_eq!(output, "REDIS_URL=redis://h:6379/3\n");
}

#[test]
fn test_url_rule_is_idempotent() {
    let rules = vec![PatchConfig::url("API_URL", "server")];

    let once =
        patch_env_content("API_URL=http://localhost:3001/api\n", &rules, &context()).unwrap();
    assert_eq!(once, "API_URL=http://localhost:3301/api\n");

    let twice = patch_env_content(&once, &rules, &context()).unwrap();
    assert_eq!(twice, once);
}

#[test]
fn test_unmatched_lines_preserved_in_order() {
    let rules = vec![
        PatchConfig::port("PORT", "server"),
        PatchConfig::database("DATABASE_URL"),
    ];
    let input = "\
# Local settings
export SHELL_ONLY=1

lower_case=untouched
PORT=3001
  # indented comment
DATABASE_URL=postgres://localhost/app
SECRET='keep me'
";

    let output = patch_env_content(input, &rules, &context()).unwrap();

    let expected = "\
# Local settings
export SHELL_ONLY=1

lower_case=untouched
PORT=3301
  # indented comment
DATABASE_URL=postgres://localhost/app_wt3
SECRET='keep me'
";
    assert_eq!(output, expected);
}

#[test]
fn test_missing_port_variables_are_appended() {
    let rules = vec![
        PatchConfig::port("PORT", "server"),
        PatchConfig::port("WEB_PORT", "web"),
        PatchConfig::database("DATABASE_URL"),
    ];

    let output = patch_env_content("NODE_ENV=development", &rules, &context()).unwrap();

    assert_eq!(output, "NODE_ENV=development\nPORT=3301\nWEB_PORT=3300\n");
}

#[test]
fn test_crlf_line_endings_survive() {
    let rules = vec![PatchConfig::port("PORT", "server")];

    let output = patch_env_content("A=1\r\nPORT=3001\r\n", &rules, &context()).unwrap();

    assert_eq!(output, "A=1\r\nPORT=3301\r\n");
}

#[test]
fn test_unknown_service_is_patch_error() {
    let rules = vec![PatchConfig::port("PORT", "unknownsvc")];

    let err = patch_env_content("PORT=3001\n", &rules, &context()).unwrap_err();

    assert!(matches!(err, Error::Patch { ref var, .. } if var == "PORT"));
}

#[test]
fn test_copy_skips_missing_sources_and_creates_directories() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    fs::create_dir_all(source.path().join("apps/api")).unwrap();
    fs::write(source.path().join("apps/api/.env"), "PORT=3001\n").unwrap();

    let files = vec![
        EnvFileConfig {
            source: "apps/api/.env".into(),
            patches: vec![PatchConfig::port("PORT", "server")],
        },
        EnvFileConfig {
            source: ".env.missing".into(),
            patches: vec![],
        },
    ];

    let written =
        copy_and_patch_all_env_files(&files, source.path(), dest.path(), &context()).unwrap();

    assert_eq!(written, vec![dest.path().join("apps/api/.env")]);
    assert_eq!(
        fs::read_to_string(dest.path().join("apps/api/.env")).unwrap(),
        "PORT=3301\n"
    );
    assert!(!dest.path().join(".env.missing").exists());
    // The source is never modified
    assert_eq!(
        fs::read_to_string(source.path().join("apps/api/.env")).unwrap(),
        "PORT=3001\n"
    );
}

#[test]
fn test_patch_error_writes_no_file() {
    let source = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    fs::write(source.path().join(".env"), "PORT=3001\n").unwrap();

    let files = vec![EnvFileConfig {
        source: ".env".into(),
        patches: vec![PatchConfig::port("PORT", "unknownsvc")],
    }];

    let result = copy_and_patch_all_env_files(&files, source.path(), dest.path(), &context());

    assert!(matches!(result, Err(Error::Patch { .. })));
    assert!(!dest.path().join(".env").exists());
}
