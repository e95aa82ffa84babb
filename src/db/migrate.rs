//! Schema of the server of record, applied as idempotent migrations.
//!
//! The storage rules on `breaks`, `audit_log` and `daily_activity` live in
//! the schema itself (CHECK constraints and triggers), so they hold for any
//! connection and any code path that writes to the file. Every veto message
//! starts with `compliance:`. The 600-second minimum is repeated literally
//! from `core::constants::MIN_BREAK_SECONDS`.

use crate::ui::messages::success;
use rusqlite::{Connection, OptionalExtension, Result};

/// Ensure that the `log` table exists. Migration markers are stored in it.
fn ensure_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS log (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            date      TEXT NOT NULL,
            operation TEXT NOT NULL,
            target    TEXT DEFAULT '',
            message   TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn is_applied(conn: &Connection, version: &str) -> Result<bool> {
    let mut chk = conn.prepare(
        "SELECT 1 FROM log
         WHERE operation = 'migration_applied' AND target = ?1
         LIMIT 1",
    )?;
    Ok(chk.query_row([version], |_| Ok(())).optional()?.is_some())
}

fn mark_applied(conn: &Connection, version: &str, message: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO log (date, operation, target, message)
         VALUES (datetime('now'), 'migration_applied', ?1, ?2)",
        [version, message],
    )?;
    Ok(())
}

const BREAKS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS breaks (
    id                        TEXT PRIMARY KEY,
    user_id                   TEXT NOT NULL,
    session_id                TEXT NOT NULL,
    reason                    TEXT NOT NULL CHECK(reason IN ('mandatory','voluntary')),
    client_observed_start     TEXT,
    server_trusted_start      INTEGER NOT NULL,
    client_claimed_duration   INTEGER,
    server_validated_duration INTEGER,
    validated_by_server       INTEGER NOT NULL DEFAULT 0 CHECK(validated_by_server IN (0,1)),
    validated_at              INTEGER,
    status                    TEXT NOT NULL DEFAULT 'active'
                              CHECK(status IN ('active','completed','rejected')),
    created_at                TEXT NOT NULL,
    CHECK (status <> 'completed'
           OR (validated_by_server = 1 AND server_validated_duration >= 600))
);

CREATE INDEX IF NOT EXISTS idx_breaks_session ON breaks(session_id, server_trusted_start);
CREATE UNIQUE INDEX IF NOT EXISTS idx_breaks_one_active
    ON breaks(session_id) WHERE status = 'active';

CREATE TRIGGER IF NOT EXISTS breaks_insert_guard
BEFORE INSERT ON breaks
WHEN NEW.status <> 'active'
  OR NEW.validated_by_server <> 0
  OR NEW.server_validated_duration IS NOT NULL
  OR NEW.validated_at IS NOT NULL
BEGIN
    SELECT RAISE(ABORT, 'compliance: a break must be inserted active and unvalidated');
END;

CREATE TRIGGER IF NOT EXISTS breaks_identity_immutable
BEFORE UPDATE ON breaks
WHEN NEW.server_trusted_start IS NOT OLD.server_trusted_start
  OR NEW.user_id IS NOT OLD.user_id
  OR NEW.session_id IS NOT OLD.session_id
  OR NEW.reason IS NOT OLD.reason
BEGIN
    SELECT RAISE(ABORT, 'compliance: server start and ownership of a break are immutable');
END;

CREATE TRIGGER IF NOT EXISTS breaks_completed_final
BEFORE UPDATE ON breaks
WHEN OLD.status = 'completed'
BEGIN
    SELECT RAISE(ABORT, 'compliance: a completed break is final');
END;

CREATE TRIGGER IF NOT EXISTS breaks_rejected_final
BEFORE UPDATE ON breaks
WHEN OLD.status = 'rejected' AND NEW.status <> 'rejected'
BEGIN
    SELECT RAISE(ABORT, 'compliance: an abandoned break cannot be reopened');
END;

CREATE TRIGGER IF NOT EXISTS breaks_completion_guard
BEFORE UPDATE ON breaks
WHEN NEW.status = 'completed' AND (
       NEW.validated_by_server IS NOT 1
    OR NEW.server_validated_duration IS NULL
    OR NEW.server_validated_duration < 600
    OR NEW.validated_at IS NULL
    OR NEW.server_validated_duration > NEW.validated_at - OLD.server_trusted_start)
BEGIN
    SELECT RAISE(ABORT, 'compliance: completion requires a server-validated duration of at least 600 seconds');
END;

CREATE TRIGGER IF NOT EXISTS breaks_validation_flag
BEFORE UPDATE ON breaks
WHEN NEW.status <> 'completed'
 AND (NEW.validated_by_server = 1 OR NEW.server_validated_duration IS NOT NULL)
BEGIN
    SELECT RAISE(ABORT, 'compliance: only a completed break carries a validated duration');
END;

CREATE TRIGGER IF NOT EXISTS breaks_no_delete
BEFORE DELETE ON breaks
BEGIN
    SELECT RAISE(ABORT, 'compliance: breaks cannot be deleted');
END;
"#;

const AUDIT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS audit_log (
    id                        INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type                TEXT NOT NULL CHECK(event_type IN (
                                  'BREAK_VALIDATION_PASSED',
                                  'BREAK_VALIDATION_REJECTED',
                                  'BREAK_VALIDATION_FAILED')),
    user_id                   TEXT NOT NULL,
    session_id                TEXT NOT NULL,
    break_id                  TEXT,
    computed_duration_seconds INTEGER,
    timestamp                 TEXT NOT NULL,
    source                    TEXT NOT NULL,
    detail                    TEXT NOT NULL DEFAULT '',
    retention_expires_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_session ON audit_log(session_id, id);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'compliance: audit entries are append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'compliance: audit entries are append-only');
END;
"#;

const SESSION_RECORDS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_records (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id  TEXT NOT NULL,
    user_id     TEXT NOT NULL,
    start_time  TEXT NOT NULL,
    end_time    TEXT,
    lessons     TEXT NOT NULL DEFAULT '[]',
    metadata    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_session_records_user ON session_records(user_id, start_time);
"#;

const DAILY_ACTIVITY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS daily_activity (
    user_id    TEXT NOT NULL,
    day        TEXT NOT NULL,
    seconds    INTEGER NOT NULL DEFAULT 0 CHECK(seconds >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, day)
);

CREATE TRIGGER IF NOT EXISTS daily_activity_monotonic
BEFORE UPDATE ON daily_activity
WHEN NEW.seconds < OLD.seconds
BEGIN
    SELECT RAISE(ABORT, 'compliance: daily study time cannot decrease');
END;
"#;

/// Ordered list of schema migrations: `(version, description, sql)`.
const MIGRATIONS: &[(&str, &str, &str)] = &[
    (
        "20250301_0001_create_breaks",
        "Created breaks table with storage rules",
        BREAKS_SCHEMA,
    ),
    (
        "20250301_0002_create_audit_log",
        "Created append-only audit_log table",
        AUDIT_SCHEMA,
    ),
    (
        "20250301_0003_create_session_records",
        "Created session_records table",
        SESSION_RECORDS_SCHEMA,
    ),
    (
        "20250301_0004_create_daily_activity",
        "Created daily_activity table",
        DAILY_ACTIVITY_SCHEMA,
    ),
];

/// Versions not yet recorded in the `log` table.
pub fn pending_migrations(conn: &Connection) -> Result<Vec<&'static str>> {
    ensure_log_table(conn)?;

    let mut out = Vec::new();
    for (version, _, _) in MIGRATIONS {
        if !is_applied(conn, version)? {
            out.push(*version);
        }
    }
    Ok(out)
}

/// Public entry point: run all pending migrations.
///
/// Invoked by `db::initialize::init_db()`.
pub fn run_pending_migrations(conn: &Connection) -> Result<()> {
    ensure_log_table(conn)?;

    for (version, description, sql) in MIGRATIONS {
        if is_applied(conn, version)? {
            continue;
        }

        conn.execute_batch(&format!("BEGIN;\n{sql}\nCOMMIT;"))
            .inspect_err(|_| {
                let _ = conn.execute_batch("ROLLBACK;");
            })?;
        mark_applied(conn, version, description)?;

        success(format!("Migration applied: {version} → {description}"));
    }

    Ok(())
}
