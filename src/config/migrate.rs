//! Upgrade of older configuration files: keys introduced after the file
//! was written are added with their defaults, existing values are kept.

use super::Config;
use crate::db::log::ttlog;
use crate::errors::{AppError, AppResult};
use crate::ui::messages::{info, success};
use rusqlite::{Connection, OptionalExtension};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

const VERSION: &str = "20250301_0005_config_compliance_keys";

fn read_mapping(path: &Path) -> AppResult<Mapping> {
    let content = fs::read_to_string(path).map_err(|_| AppError::ConfigLoad)?;
    match serde_yaml::from_str::<Value>(&content)? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(AppError::Config(format!(
            "{} is not a YAML mapping",
            path.display()
        ))),
    }
}

fn default_mapping() -> AppResult<Mapping> {
    match serde_yaml::to_value(Config::default())? {
        Value::Mapping(map) => Ok(map),
        _ => Err(AppError::Other("default configuration is not a mapping".into())),
    }
}

/// Keys present in the current configuration model but absent from the
/// file. An absent file has nothing to migrate.
pub fn missing_keys(path: &Path) -> AppResult<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let current = read_mapping(path)?;
    let defaults = default_mapping()?;

    Ok(defaults
        .keys()
        .filter(|k| !current.contains_key(*k))
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect())
}

/// Insert missing keys with their defaults. Returns the keys added.
pub fn migrate_config_file(path: &Path) -> AppResult<Vec<String>> {
    let missing = missing_keys(path)?;
    if missing.is_empty() {
        return Ok(missing);
    }

    let mut current = read_mapping(path)?;
    let defaults = default_mapping()?;

    for key in &missing {
        let k = Value::String(key.clone());
        if let Some(v) = defaults.get(&k) {
            current.insert(k, v.clone());
        }
    }

    let serialized = serde_yaml::to_string(&Value::Mapping(current))?;
    fs::write(path, serialized).map_err(|_| AppError::ConfigSave)?;

    Ok(missing)
}

/// Run the config migration and record it once in the `log` table.
pub fn run_config_migration(conn: &Connection, path: &Path) -> AppResult<()> {
    let added = migrate_config_file(path)?;

    if added.is_empty() {
        info("Configuration is up to date.");
        return Ok(());
    }

    let already: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM log WHERE operation = 'migration_applied' AND target = ?1 LIMIT 1",
            [VERSION],
            |row| row.get(0),
        )
        .optional()?;

    let message = format!("Added config keys: {}", added.join(", "));
    if already.is_none() {
        ttlog(conn, "migration_applied", VERSION, &message)?;
    }

    success(format!("Migration applied: {VERSION} → {message}"));
    Ok(())
}
