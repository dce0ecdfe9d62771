use std::env;
use std::path::PathBuf;

use mini_tests::{Config, GraderConfig};

const SERVER_VARS: &[&str] = &[
    "APP__ADMIN__USERNAME",
    "APP__ADMIN__PASSWORD",
    "APP__SERVER__BIND_ADDR",
    "ADMIN_USERNAME",
    "ADMIN_PASSWORD",
    "BIND_ADDR",
];

const GRADER_VARS: &[&str] = &[
    "GRADER__COLLECTOR_URL",
    "GRADER__STORAGE_PATH",
    "GRADER__STEP_BUDGET",
    "GRADER__CATALOG_PATH",
];

fn clear(vars: &[&str]) {
    for var in vars {
        env::remove_var(var);
    }
}

#[test]
#[serial_test::serial]
fn test_server_config_from_prefixed_env() {
    clear(SERVER_VARS);
    env::set_var("APP__ADMIN__USERNAME", "instructor");
    env::set_var("APP__ADMIN__PASSWORD", "s3cret");
    env::set_var("APP__SERVER__BIND_ADDR", "127.0.0.1:4000");

    let config = Config::load().unwrap();
    assert_eq!(config.admin_username, "instructor");
    assert_eq!(config.admin_password, "s3cret");
    assert_eq!(config.bind_addr, "127.0.0.1:4000");
    clear(SERVER_VARS);
}

#[test]
#[serial_test::serial]
fn test_server_config_falls_back_to_plain_env() {
    clear(SERVER_VARS);
    env::set_var("ADMIN_USERNAME", "admin");
    env::set_var("ADMIN_PASSWORD", "pw");

    let config = Config::load().unwrap();
    assert_eq!(config.admin_username, "admin");
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    clear(SERVER_VARS);
}

#[test]
#[serial_test::serial]
fn test_server_config_requires_credentials() {
    clear(SERVER_VARS);
    env::set_var("ADMIN_USERNAME", "admin");
    let err = Config::load().unwrap_err();
    assert!(err.to_string().contains("admin.password"));
    clear(SERVER_VARS);
}

#[test]
#[serial_test::serial]
fn test_grader_config_defaults_and_overrides() {
    clear(GRADER_VARS);
    let defaults = GraderConfig::load().unwrap();
    assert_eq!(defaults.collector_url, "http://localhost:3000/api/submissions");
    assert_eq!(defaults.storage_path, PathBuf::from(".mini-tests/storage.json"));
    assert_eq!(defaults.step_budget, 5_000_000);
    assert_eq!(defaults.catalog_path, None);

    env::set_var("GRADER__STEP_BUDGET", "1000");
    env::set_var("GRADER__CATALOG_PATH", "/tmp/catalog.json");
    let config = GraderConfig::load().unwrap();
    assert_eq!(config.step_budget, 1000);
    assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/catalog.json")));
    clear(GRADER_VARS);
}
