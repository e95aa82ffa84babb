mod common;

use common::memory_pool;
use rtimeguard::config::Config;
use rtimeguard::config::migrate::{migrate_config_file, missing_keys, run_config_migration};
use rtimeguard::db::log::load_log;
use rtimeguard::db::migrate::{pending_migrations, run_pending_migrations};
use std::fs;

#[test]
fn schema_migrations_are_recorded_and_idempotent() {
    let pool = memory_pool();
    assert!(pending_migrations(&pool.conn).unwrap().is_empty());

    run_pending_migrations(&pool.conn).unwrap();

    let applied: Vec<String> = load_log(&pool.conn)
        .unwrap()
        .into_iter()
        .filter(|(_, op, _, _)| op == "migration_applied")
        .map(|(_, _, target, _)| target)
        .collect();
    assert_eq!(applied.len(), 4);
    assert!(applied.iter().any(|v| v == "20250301_0001_create_breaks"));
    assert!(applied.iter().any(|v| v == "20250301_0004_create_daily_activity"));
}

#[test]
fn old_config_gains_new_keys_and_keeps_its_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rtimeguard.conf");
    fs::write(&path, "database: /srv/guard.sqlite\ndefault_user: bob\n").unwrap();

    let missing = missing_keys(&path).unwrap();
    assert!(missing.contains(&"audit_source".to_string()));
    assert!(missing.contains(&"session_store".to_string()));
    assert!(!missing.contains(&"database".to_string()));

    let added = migrate_config_file(&path).unwrap();
    assert_eq!(added, missing);
    assert!(missing_keys(&path).unwrap().is_empty());

    let cfg = Config::load_from(&path).unwrap();
    assert_eq!(cfg.database, "/srv/guard.sqlite");
    assert_eq!(cfg.default_user, "bob");
    assert_eq!(cfg.audit_source, "rtimeguard-cli");
}

#[test]
fn config_migration_is_logged_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rtimeguard.conf");
    fs::write(&path, "database: /srv/guard.sqlite\n").unwrap();
    let pool = memory_pool();

    run_config_migration(&pool.conn, &path).unwrap();
    run_config_migration(&pool.conn, &path).unwrap();

    let entries: Vec<_> = load_log(&pool.conn)
        .unwrap()
        .into_iter()
        .filter(|(_, _, target, _)| target == "20250301_0005_config_compliance_keys")
        .collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn missing_config_file_means_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.conf");
    assert!(missing_keys(&path).unwrap().is_empty());

    let cfg = Config::load_from(&path).unwrap();
    assert_eq!(cfg.log_level, "warn");
    assert!(cfg.question_bank.is_none());
}
