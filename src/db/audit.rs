//! Append-only audit sink. There is intentionally no update or delete here;
//! the schema refuses both anyway.

use crate::db::storage_error;
use crate::errors::{AppError, AppResult};
use crate::models::{AuditEventType, AuditLogEntry};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};

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

pub fn map_row(row: &Row) -> rusqlite::Result<AuditLogEntry> {
    let kind: String = row.get("event_type")?;
    let event_type = AuditEventType::from_db_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            Box::new(AppError::Other(format!("Invalid event type: {kind}"))),
        )
    })?;

    let timestamp: String = row.get("timestamp")?;
    let retention: String = row.get("retention_expires_at")?;

    Ok(AuditLogEntry {
        id: row.get("id")?,
        event_type,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        break_id: row.get("break_id")?,
        computed_duration_seconds: row
            .get::<_, Option<i64>>("computed_duration_seconds")?
            .map(|v| v.max(0) as u64),
        timestamp: parse_ts(&timestamp, 6)?,
        source: row.get("source")?,
        detail: row.get("detail")?,
        retention_expires_at: parse_ts(&retention, 9)?,
    })
}

/// Append one entry and return its id.
pub fn append(conn: &Connection, entry: &AuditLogEntry) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO audit_log (event_type, user_id, session_id, break_id,
                                computed_duration_seconds, timestamp, source, detail,
                                retention_expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            entry.event_type.as_str(),
            entry.user_id,
            entry.session_id,
            entry.break_id,
            entry.computed_duration_seconds.map(|v| v as i64),
            entry.timestamp.to_rfc3339(),
            entry.source,
            entry.detail,
            entry.retention_expires_at.to_rfc3339(),
        ],
    )
    .map_err(storage_error)?;

    Ok(conn.last_insert_rowid())
}

#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub session_id: Option<String>,
    pub event_type: Option<AuditEventType>,
    /// Newest `limit` entries, still returned oldest first.
    pub limit: Option<usize>,
}

/// Entries in insertion order.
pub fn list(conn: &Connection, filter: &AuditFilter) -> AppResult<Vec<AuditLogEntry>> {
    let mut sql = String::from(
        "SELECT * FROM (
            SELECT id, event_type, user_id, session_id, break_id, computed_duration_seconds,
                   timestamp, source, detail, retention_expires_at
            FROM audit_log
            WHERE (?1 IS NULL OR session_id = ?1)
              AND (?2 IS NULL OR event_type = ?2)
            ORDER BY id DESC",
    );
    if let Some(n) = filter.limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    sql.push_str(") ORDER BY id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(
        params![filter.session_id, filter.event_type.map(|e| e.as_str())],
        map_row,
    )?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

pub fn count(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?)
}
