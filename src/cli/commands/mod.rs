pub mod audit;
pub mod breaks;
pub mod config;
pub mod db;
pub mod export;
pub mod init;
pub mod log;
pub mod sessions;
pub mod study;

use crate::authority::SqliteAuthority;
use crate::cli::parser::Cli;
use crate::config::Config;
use crate::core::comprehension::ComprehensionHooks;
use crate::core::engine::ComplianceEngine;
use crate::db::initialize::init_db;
use crate::db::pool::DbPool;
use crate::errors::AppResult;
use crate::store::JsonFileStore;
use crate::utils::time::SystemTimeSource;

/// Who is acting: `--user` wins over the configured default.
pub(crate) fn resolve_user(cli: &Cli, cfg: &Config) -> String {
    cli.user
        .clone()
        .unwrap_or_else(|| cfg.default_user.clone())
}

/// Client store path: `--store` wins over the configured one.
pub(crate) fn resolve_store(cli: &Cli, cfg: &Config) -> String {
    cli.store
        .clone()
        .unwrap_or_else(|| cfg.session_store.clone())
}

/// Open the server-of-record database with its schema in place.
pub(crate) fn open_pool(cfg: &Config) -> AppResult<DbPool> {
    let pool = DbPool::new(&cfg.database)?;
    init_db(&pool.conn)?;
    Ok(pool)
}

/// Wire an engine the way the CLI runs it: JSON file store on this
/// machine, SQLite authority with the system clock.
pub(crate) fn build_engine(
    cli: &Cli,
    cfg: &Config,
    session_id: &str,
    hooks: Box<dyn ComprehensionHooks>,
) -> AppResult<ComplianceEngine> {
    let user = resolve_user(cli, cfg);
    let store = JsonFileStore::open(resolve_store(cli, cfg))?;
    let authority = SqliteAuthority::new(
        open_pool(cfg)?,
        &user,
        Box::new(SystemTimeSource),
        &cfg.audit_source,
    );

    Ok(ComplianceEngine::new(
        session_id,
        Box::new(store),
        Box::new(authority),
        hooks,
        Box::new(SystemTimeSource),
    ))
}
