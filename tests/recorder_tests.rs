mod common;

use chrono::{Duration, NaiveDate};
use common::{LEARNER, memory_pool, t0};
use rtimeguard::core::recorder::SessionRecorder;
use rtimeguard::db::sessions::{
    add_daily_seconds, list_session_records, load_daily_seconds, save_session_record,
};
use std::collections::BTreeMap;

#[test]
fn lessons_are_recorded_once_in_order() {
    let mut recorder = SessionRecorder::new();
    assert!(!recorder.record_lesson_access("l1"));

    let mut metadata = BTreeMap::new();
    metadata.insert("course".to_string(), "safety-101".to_string());
    let record = recorder.create_session("s1", metadata, t0());
    assert_eq!(record.session_id, "s1");
    assert!(record.lessons_accessed.is_empty());
    assert!(record.end_time.is_none());

    assert!(recorder.record_lesson_access("l1"));
    assert!(recorder.record_lesson_access("l2"));
    assert!(!recorder.record_lesson_access("l1"));
    assert!(!recorder.record_lesson_access(""));
    assert_eq!(recorder.lessons_accessed(), ["l1", "l2"]);
    assert_eq!(recorder.lesson_count(), 2);
    assert_eq!(recorder.current_session_id(), Some("s1"));
}

#[test]
fn close_moves_the_record_to_history() {
    let mut recorder = SessionRecorder::new();
    recorder.create_session("s1", BTreeMap::new(), t0());
    recorder.record_lesson_access("l1");

    let closed = recorder.close_session(t0() + Duration::minutes(45)).unwrap();
    assert_eq!(closed.end_time, Some(t0() + Duration::minutes(45)));
    assert_eq!(closed.lesson_count(), 1);
    assert!(recorder.current().is_none());
    assert_eq!(recorder.session_count(), 1);
    assert!(recorder.close_session(t0()).is_none());
}

#[test]
fn creating_over_an_open_record_replaces_it() {
    let mut recorder = SessionRecorder::new();
    recorder.create_session("s1", BTreeMap::new(), t0());
    recorder.record_lesson_access("l1");
    recorder.create_session("s2", BTreeMap::new(), t0());

    assert_eq!(recorder.current_session_id(), Some("s2"));
    assert_eq!(recorder.lesson_count(), 0);
    assert_eq!(recorder.session_count(), 0);
}

#[test]
fn closed_records_are_stored_per_user() {
    let pool = memory_pool();
    let mut recorder = SessionRecorder::new();
    recorder.create_session("s1", BTreeMap::new(), t0());
    recorder.record_lesson_access("l1");
    recorder.record_lesson_access("l2");
    let record = recorder.close_session(t0() + Duration::minutes(30)).unwrap();

    save_session_record(&pool.conn, LEARNER, &record).unwrap();
    save_session_record(&pool.conn, "bob", &record).unwrap();

    let mine = list_session_records(&pool.conn, Some(LEARNER)).unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].user_id, LEARNER);
    assert_eq!(mine[0].record, record);

    let all = list_session_records(&pool.conn, None).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn daily_total_only_grows() {
    let pool = memory_pool();
    let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();

    assert_eq!(load_daily_seconds(&pool.conn, LEARNER, day).unwrap(), 0);
    assert_eq!(add_daily_seconds(&pool.conn, LEARNER, day, 600).unwrap(), 600);
    assert_eq!(add_daily_seconds(&pool.conn, LEARNER, day, 60).unwrap(), 660);

    // other days and users are separate
    let next = day.succ_opt().unwrap();
    assert_eq!(load_daily_seconds(&pool.conn, LEARNER, next).unwrap(), 0);
    assert_eq!(load_daily_seconds(&pool.conn, "bob", day).unwrap(), 0);

    let err = pool
        .conn
        .execute("UPDATE daily_activity SET seconds = 10", [])
        .unwrap_err();
    assert!(err.to_string().contains("compliance:"));
    assert_eq!(load_daily_seconds(&pool.conn, LEARNER, day).unwrap(), 660);
}
