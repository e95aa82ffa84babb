//! Closed session records and the per-day study ledger.

use crate::db::models::StoredSession;
use crate::db::storage_error;
use crate::errors::{AppError, AppResult};
use crate::models::SessionRecord;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(AppError::Other(format!("Invalid timestamp: {s}"))),
            )
        })
}

fn json_err(col: usize, e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
}

fn map_row(row: &Row) -> rusqlite::Result<StoredSession> {
    let start: String = row.get("start_time")?;
    let end: Option<String> = row.get("end_time")?;
    let lessons: String = row.get("lessons")?;
    let metadata: String = row.get("metadata")?;

    Ok(StoredSession {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        record: SessionRecord {
            session_id: row.get("session_id")?,
            start_time: parse_ts(&start, 3)?,
            end_time: end.as_deref().map(|e| parse_ts(e, 4)).transpose()?,
            lessons_accessed: serde_json::from_str(&lessons).map_err(|e| json_err(5, e))?,
            metadata: serde_json::from_str(&metadata).map_err(|e| json_err(6, e))?,
        },
    })
}

pub fn save_session_record(conn: &Connection, user_id: &str, record: &SessionRecord) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO session_records (session_id, user_id, start_time, end_time, lessons, metadata, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.session_id,
            user_id,
            record.start_time.to_rfc3339(),
            record.end_time.map(|t| t.to_rfc3339()),
            serde_json::to_string(&record.lessons_accessed)?,
            serde_json::to_string(&record.metadata)?,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(storage_error)?;

    Ok(conn.last_insert_rowid())
}

/// All records, oldest first; optionally only one user's.
pub fn list_session_records(conn: &Connection, user_id: Option<&str>) -> AppResult<Vec<StoredSession>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, session_id, start_time, end_time, lessons, metadata
         FROM session_records
         WHERE (?1 IS NULL OR user_id = ?1)
         ORDER BY start_time ASC, id ASC",
    )?;

    let rows = stmt.query_map([user_id], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM session_records", [], |row| row.get(0))?)
}

// ---------------------------
// Daily activity
// ---------------------------

/// Seconds of study already counted for `user_id` on `day`.
pub fn load_daily_seconds(conn: &Connection, user_id: &str, day: NaiveDate) -> AppResult<u64> {
    let secs: Option<i64> = conn
        .query_row(
            "SELECT seconds FROM daily_activity WHERE user_id = ?1 AND day = ?2",
            params![user_id, day.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )
        .optional()?;

    Ok(secs.unwrap_or(0).max(0) as u64)
}

/// Add study time to the day total and return the new total. The total
/// can only grow.
pub fn add_daily_seconds(conn: &Connection, user_id: &str, day: NaiveDate, delta: u64) -> AppResult<u64> {
    let day_str = day.format("%Y-%m-%d").to_string();

    conn.execute(
        "INSERT INTO daily_activity (user_id, day, seconds, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(user_id, day) DO UPDATE
            SET seconds = seconds + excluded.seconds,
                updated_at = excluded.updated_at",
        params![user_id, day_str, delta as i64, Utc::now().to_rfc3339()],
    )
    .map_err(storage_error)?;

    load_daily_seconds(conn, user_id, day)
}
