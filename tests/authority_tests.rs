mod common;

use common::{LEARNER, SESSION, authority, memory_pool, t0};
use rtimeguard::authority::{BreakAuthority, ValidationOutcome};
use rtimeguard::db::audit::{self, AuditFilter};
use rtimeguard::db::breaks;
use rtimeguard::errors::AppError;
use rtimeguard::models::{AuditEventType, BreakReason, BreakStatus};
use rtimeguard::utils::time::ManualTimeSource;

fn audit_events(auth: &rtimeguard::authority::SqliteAuthority) -> Vec<AuditEventType> {
    audit::list(&auth.pool().conn, &AuditFilter::default())
        .unwrap()
        .into_iter()
        .map(|e| e.event_type)
        .collect()
}

#[test]
fn open_break_stamps_the_server_clock() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);

    // the client believes it is an hour earlier
    let client_start = t0() - chrono::Duration::hours(1);
    let opened = auth
        .open_break(SESSION, BreakReason::Mandatory, client_start)
        .unwrap();
    assert_eq!(opened.server_trusted_start, t0());

    let row = auth.current_break(SESSION).unwrap().unwrap();
    assert_eq!(row.id, opened.break_id);
    assert_eq!(row.server_trusted_start, t0());
    assert_eq!(row.client_observed_start, Some(client_start));
    assert_eq!(row.status, BreakStatus::Active);
    assert!(!row.validated_by_server);
}

#[test]
fn only_one_active_break_per_session() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Voluntary, t0()).unwrap();

    let err = auth
        .open_break(SESSION, BreakReason::Voluntary, t0())
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // another session is independent
    auth.open_break("other", BreakReason::Voluntary, t0()).unwrap();
}

#[test]
fn short_break_is_rejected_and_stays_active() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();

    server.advance_secs(300);
    let outcome = auth.validate_break_end(SESSION).unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Rejected {
            minutes_remaining: 5,
            current_duration_seconds: 300
        }
    );
    assert_eq!(
        outcome.to_contract_json(),
        serde_json::json!({"accepted": false, "minutesRemaining": 5, "currentDurationSeconds": 300})
    );

    let row = auth.current_break(SESSION).unwrap().unwrap();
    assert_eq!(row.status, BreakStatus::Active);
    assert_eq!(audit_events(&auth), vec![AuditEventType::BreakValidationRejected]);
}

#[test]
fn minutes_remaining_rounds_up() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();

    server.advance_secs(599);
    match auth.validate_break_end(SESSION).unwrap() {
        ValidationOutcome::Rejected {
            minutes_remaining, ..
        } => assert_eq!(minutes_remaining, 1),
        other => panic!("expected a rejection, got {other:?}"),
    }
}

#[test]
fn ten_minute_break_is_accepted_once() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    let opened = auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();

    server.advance_secs(600);
    let outcome = auth.validate_break_end(SESSION).unwrap();
    assert_eq!(
        outcome,
        ValidationOutcome::Accepted {
            validated_duration_seconds: 600
        }
    );

    let row = breaks::find_by_id(&auth.pool().conn, &opened.break_id)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, BreakStatus::Completed);
    assert!(row.validated_by_server);
    assert_eq!(row.server_validated_duration, Some(600));
    assert_eq!(row.validated_at, Some(t0() + chrono::Duration::seconds(600)));
    assert!(auth.current_break(SESSION).unwrap().is_none());

    let passed = audit::list(
        &auth.pool().conn,
        &AuditFilter {
            event_type: Some(AuditEventType::BreakValidationPassed),
            ..AuditFilter::default()
        },
    )
    .unwrap();
    assert_eq!(passed.len(), 1);
    assert_eq!(passed[0].computed_duration_seconds, Some(600));
    assert_eq!(passed[0].break_id.as_deref(), Some(opened.break_id.as_str()));
    assert_eq!(passed[0].source, "test-suite");

    // a second completion is a duplicate and leaves the row untouched
    server.advance_secs(60);
    let err = auth.validate_break_end(SESSION).unwrap_err();
    assert!(matches!(err, AppError::DuplicateSubmission(_)));
    let row = breaks::find_by_id(&auth.pool().conn, &opened.break_id)
        .unwrap()
        .unwrap();
    assert_eq!(row.server_validated_duration, Some(600));
    assert_eq!(
        audit_events(&auth),
        vec![
            AuditEventType::BreakValidationPassed,
            AuditEventType::BreakValidationRejected
        ]
    );
}

#[test]
fn client_claim_never_counts() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();

    auth.record_client_claim(SESSION, 3_600).unwrap();
    server.advance_secs(120);

    let outcome = auth.validate_break_end(SESSION).unwrap();
    assert!(!outcome.is_accepted());

    let row = auth.current_break(SESSION).unwrap().unwrap();
    assert_eq!(row.client_claimed_duration, Some(3_600));
}

#[test]
fn another_user_cannot_end_the_break() {
    let server = ManualTimeSource::new(t0());
    let mut owner = authority(memory_pool(), LEARNER, &server);
    owner.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();
    server.advance_secs(900);

    let mut intruder = authority(owner.into_pool(), "mallory", &server);
    let err = intruder.validate_break_end(SESSION).unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let row = intruder.current_break(SESSION).unwrap().unwrap();
    assert_eq!(row.status, BreakStatus::Active);
    assert_eq!(audit_events(&intruder), vec![AuditEventType::BreakValidationFailed]);

    let err = intruder.abandon_break(SESSION).unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[test]
fn validating_without_a_break_is_not_found() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);

    let err = auth.validate_break_end(SESSION).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(audit_events(&auth), vec![AuditEventType::BreakValidationFailed]);
}

#[test]
fn abandoned_break_cannot_be_completed() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    let opened = auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();

    auth.abandon_break(SESSION).unwrap();
    // nothing left to abandon
    auth.abandon_break(SESSION).unwrap();

    server.advance_secs(900);
    let err = auth.validate_break_end(SESSION).unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let row = breaks::find_by_id(&auth.pool().conn, &opened.break_id)
        .unwrap()
        .unwrap();
    assert_eq!(row.status, BreakStatus::Rejected);
}

#[test]
fn storage_rules_veto_direct_completion() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    let opened = auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();
    let conn = &auth.pool().conn;
    let start = t0().timestamp();

    // claims 600 s after only 60 s of server time
    let err = conn
        .execute(
            "UPDATE breaks SET status = 'completed', validated_by_server = 1,
                               server_validated_duration = 600, validated_at = ?1
             WHERE id = ?2",
            rusqlite::params![start + 60, opened.break_id],
        )
        .unwrap_err();
    assert!(err.to_string().contains("compliance:"));

    // too short, even when consistent
    assert!(
        conn.execute(
            "UPDATE breaks SET status = 'completed', validated_by_server = 1,
                               server_validated_duration = 300, validated_at = ?1
             WHERE id = ?2",
            rusqlite::params![start + 300, opened.break_id],
        )
        .is_err()
    );

    // not flagged as server-validated
    assert!(
        conn.execute(
            "UPDATE breaks SET status = 'completed', server_validated_duration = 900,
                               validated_at = ?1
             WHERE id = ?2",
            rusqlite::params![start + 900, opened.break_id],
        )
        .is_err()
    );

    // the server start cannot be moved back
    assert!(
        conn.execute(
            "UPDATE breaks SET server_trusted_start = ?1 WHERE id = ?2",
            rusqlite::params![start - 3_600, opened.break_id],
        )
        .is_err()
    );

    // nor can the break be deleted, or a completed one inserted
    assert!(conn.execute("DELETE FROM breaks", []).is_err());
    assert!(
        conn.execute(
            "INSERT INTO breaks (id, user_id, session_id, reason, server_trusted_start,
                                 status, validated_by_server, server_validated_duration,
                                 validated_at, created_at)
             VALUES ('forged', 'alice', 'x', 'mandatory', 0, 'completed', 1, 600, 600, 'now')",
            [],
        )
        .is_err()
    );

    let row = auth.current_break(SESSION).unwrap().unwrap();
    assert_eq!(row.status, BreakStatus::Active);
    assert_eq!(row.server_trusted_start, t0());
}

#[test]
fn completed_break_is_final() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    let opened = auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();
    server.advance_secs(700);
    auth.validate_break_end(SESSION).unwrap();

    let conn = &auth.pool().conn;
    assert!(
        conn.execute(
            "UPDATE breaks SET server_validated_duration = 5000 WHERE id = ?1",
            [&opened.break_id],
        )
        .is_err()
    );
    assert!(
        conn.execute(
            "UPDATE breaks SET status = 'active' WHERE id = ?1",
            [&opened.break_id],
        )
        .is_err()
    );
    assert!(matches!(
        breaks::reject_break(conn, &opened.break_id),
        Err(AppError::InvalidState(_))
    ));
}

#[test]
fn audit_log_is_append_only() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();
    server.advance_secs(30);
    auth.validate_break_end(SESSION).unwrap();

    let conn = &auth.pool().conn;
    assert!(conn.execute("UPDATE audit_log SET detail = 'edited'", []).is_err());
    assert!(conn.execute("DELETE FROM audit_log", []).is_err());
    assert_eq!(audit::count(conn).unwrap(), 1);

    let entries = audit::list(conn, &AuditFilter::default()).unwrap();
    let entry = &entries[0];
    assert_eq!(entry.user_id, LEARNER);
    assert_eq!(entry.session_id, SESSION);
    assert_eq!(
        (entry.retention_expires_at - entry.timestamp).num_days(),
        1_095
    );
}

#[test]
fn audit_filter_keeps_the_newest_entries() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    auth.open_break(SESSION, BreakReason::Mandatory, t0()).unwrap();
    for _ in 0..3 {
        server.advance_secs(60);
        auth.validate_break_end(SESSION).unwrap();
    }

    let newest = audit::list(
        &auth.pool().conn,
        &AuditFilter {
            limit: Some(2),
            ..AuditFilter::default()
        },
    )
    .unwrap();
    assert_eq!(newest.len(), 2);
    assert!(newest[0].id < newest[1].id);
    assert_eq!(newest[1].computed_duration_seconds, Some(180));

    let other = audit::list(
        &auth.pool().conn,
        &AuditFilter {
            session_id: Some("nobody".into()),
            ..AuditFilter::default()
        },
    )
    .unwrap();
    assert!(other.is_empty());
}

#[test]
fn latest_break_reports_completed_rows() {
    let server = ManualTimeSource::new(t0());
    let mut auth = authority(memory_pool(), LEARNER, &server);
    assert!(auth.latest_break(SESSION).unwrap().is_none());

    let opened = auth
        .open_break(SESSION, BreakReason::Mandatory, t0())
        .unwrap();
    server.advance_secs(640);
    assert!(auth.validate_break_end(SESSION).unwrap().is_accepted());

    assert!(auth.current_break(SESSION).unwrap().is_none());
    let latest = auth.latest_break(SESSION).unwrap().unwrap();
    assert_eq!(latest.id, opened.break_id);
    assert_eq!(latest.status, BreakStatus::Completed);
    assert_eq!(latest.server_validated_duration, Some(640));
}
