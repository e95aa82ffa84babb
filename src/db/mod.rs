pub mod audit;
pub mod breaks;
pub mod initialize;
pub mod log;
pub mod migrate;
pub mod models;
pub mod pool;
pub mod sessions;
pub mod stats;

use crate::errors::AppError;
use rusqlite::ErrorCode;

/// Map a SQLite failure to the application error, surfacing vetoes of the
/// storage rules (CHECK constraints, `compliance:` triggers, unique keys)
/// as `InvariantViolation`.
pub fn storage_error(e: rusqlite::Error) -> AppError {
    if let rusqlite::Error::SqliteFailure(err, msg) = &e
        && err.code == ErrorCode::ConstraintViolation
    {
        return AppError::InvariantViolation(msg.clone().unwrap_or_else(|| err.to_string()));
    }
    AppError::Db(e)
}
