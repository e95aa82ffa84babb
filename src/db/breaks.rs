//! Queries on the `breaks` table. The authority is the only legitimate
//! caller of the writers; the schema rejects anything else that tries to
//! complete, reopen or delete a break.

use crate::db::storage_error;
use crate::errors::{AppError, AppResult};
use crate::models::{Break, BreakReason, BreakStatus};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

const COLUMNS: &str = "id, user_id, session_id, reason, client_observed_start, \
     server_trusted_start, client_claimed_duration, server_validated_duration, \
     validated_by_server, validated_at, status";

fn epoch_to_utc(secs: i64, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            col,
            rusqlite::types::Type::Integer,
            Box::new(AppError::Other(format!("Invalid epoch seconds: {secs}"))),
        )
    })
}

fn text_err(col: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        col,
        rusqlite::types::Type::Text,
        Box::new(AppError::Other(msg)),
    )
}

pub fn map_row(row: &Row) -> rusqlite::Result<Break> {
    let reason_str: String = row.get("reason")?;
    let reason = BreakReason::from_db_str(&reason_str)
        .ok_or_else(|| text_err(3, format!("Invalid reason: {reason_str}")))?;

    let status_str: String = row.get("status")?;
    let status = BreakStatus::from_db_str(&status_str)
        .ok_or_else(|| text_err(10, format!("Invalid status: {status_str}")))?;

    let client_observed_start = match row.get::<_, Option<String>>("client_observed_start")? {
        Some(s) => Some(
            DateTime::parse_from_rfc3339(&s)
                .map_err(|_| text_err(4, format!("Invalid timestamp: {s}")))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    let validated_at = match row.get::<_, Option<i64>>("validated_at")? {
        Some(secs) => Some(epoch_to_utc(secs, 9)?),
        None => None,
    };

    Ok(Break {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        session_id: row.get("session_id")?,
        reason,
        client_observed_start,
        server_trusted_start: epoch_to_utc(row.get("server_trusted_start")?, 5)?,
        client_claimed_duration: row.get::<_, Option<i64>>("client_claimed_duration")?.map(|v| v.max(0) as u64),
        server_validated_duration: row
            .get::<_, Option<i64>>("server_validated_duration")?
            .map(|v| v.max(0) as u64),
        validated_by_server: row.get::<_, i32>("validated_by_server")? == 1,
        validated_at,
        status,
    })
}

/// Insert a freshly opened break. Only `active`, unvalidated rows pass the
/// schema.
pub fn insert_break(conn: &Connection, b: &Break) -> AppResult<()> {
    conn.execute(
        "INSERT INTO breaks (id, user_id, session_id, reason, client_observed_start,
                             server_trusted_start, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            b.id,
            b.user_id,
            b.session_id,
            b.reason.to_db_str(),
            b.client_observed_start.map(|t| t.to_rfc3339()),
            b.server_trusted_start.timestamp(),
            b.status.to_db_str(),
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(storage_error)?;
    Ok(())
}

pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<Break>> {
    let sql = format!("SELECT {COLUMNS} FROM breaks WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], map_row).optional()?)
}

/// Most recent break of a session, whatever its status.
pub fn latest_for_session(conn: &Connection, session_id: &str) -> AppResult<Option<Break>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM breaks
         WHERE session_id = ?1
         ORDER BY server_trusted_start DESC, rowid DESC
         LIMIT 1"
    );
    Ok(conn.query_row(&sql, [session_id], map_row).optional()?)
}

pub fn active_for_session(conn: &Connection, session_id: &str) -> AppResult<Option<Break>> {
    let sql = format!("SELECT {COLUMNS} FROM breaks WHERE session_id = ?1 AND status = 'active'");
    Ok(conn.query_row(&sql, [session_id], map_row).optional()?)
}

pub fn list_for_session(conn: &Connection, session_id: &str) -> AppResult<Vec<Break>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM breaks
         WHERE session_id = ?1
         ORDER BY server_trusted_start ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([session_id], map_row)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Mark a break completed with the duration the server computed.
pub fn complete_break(
    conn: &Connection,
    id: &str,
    validated_duration: u64,
    validated_at: DateTime<Utc>,
) -> AppResult<()> {
    let n = conn
        .execute(
            "UPDATE breaks
             SET status = 'completed',
                 validated_by_server = 1,
                 server_validated_duration = ?2,
                 validated_at = ?3
             WHERE id = ?1",
            params![id, validated_duration as i64, validated_at.timestamp()],
        )
        .map_err(storage_error)?;

    if n == 0 {
        return Err(AppError::NotFound(format!("break {id}")));
    }
    Ok(())
}

/// Close an active break without validation (session stopped).
pub fn reject_break(conn: &Connection, id: &str) -> AppResult<()> {
    let n = conn
        .execute(
            "UPDATE breaks SET status = 'rejected' WHERE id = ?1 AND status = 'active'",
            [id],
        )
        .map_err(storage_error)?;

    if n == 0 {
        return Err(AppError::InvalidState(format!("break {id} is not active")));
    }
    Ok(())
}

/// Store what the client says the duration was. Reporting only.
pub fn record_client_claim(conn: &Connection, id: &str, claimed_seconds: u64) -> AppResult<()> {
    conn.execute(
        "UPDATE breaks SET client_claimed_duration = ?2 WHERE id = ?1",
        params![id, claimed_seconds as i64],
    )
    .map_err(storage_error)?;
    Ok(())
}

pub fn count_by_status(conn: &Connection) -> AppResult<Vec<(BreakStatus, i64)>> {
    let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM breaks GROUP BY status ORDER BY status")?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;

    let mut out = Vec::new();
    for r in rows {
        let (status, n) = r?;
        if let Some(s) = BreakStatus::from_db_str(&status) {
            out.push((s, n));
        }
    }
    Ok(out)
}
