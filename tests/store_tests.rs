use rtimeguard::errors::AppError;
use rtimeguard::store::{
    JsonFileStore, KeyValueStore, MemoryStore, PersistedBreakState, break_state_key, get_json,
    pvq_draft_key, session_time_key, set_json,
};
use std::fs;

#[test]
fn keys_follow_the_session_layout() {
    assert_eq!(session_time_key("abc"), "session_time_abc");
    assert_eq!(break_state_key("abc"), "break_state_abc");
    assert_eq!(pvq_draft_key("q7"), "pvq_draft_q7");
}

#[test]
fn file_store_survives_a_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("client.json");

    let mut store = JsonFileStore::open(&path).unwrap();
    store.set("session_time_s1", "42").unwrap();
    store.set("other", "x").unwrap();
    store.remove("other").unwrap();
    // removing a missing key is fine
    store.remove("never-set").unwrap();

    let reopened = JsonFileStore::open(&path).unwrap();
    assert_eq!(
        reopened.get("session_time_s1").unwrap().as_deref(),
        Some("42")
    );
    assert!(reopened.get("other").unwrap().is_none());
}

#[test]
fn corrupt_file_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("client.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(matches!(
        JsonFileStore::open(&path),
        Err(AppError::Persistence(_))
    ));
}

#[test]
fn break_state_round_trips_in_camel_case() {
    let mut store = MemoryStore::new();
    let state = PersistedBreakState {
        is_on_break: true,
        break_start_time: Some(1_740_819_600_000),
        is_break_mandatory: true,
        break_id: Some("b-1".into()),
    };
    set_json(&mut store, &break_state_key("s1"), &state).unwrap();

    let raw = store.get(&break_state_key("s1")).unwrap().unwrap();
    assert!(raw.contains("\"isOnBreak\":true"));
    assert!(raw.contains("\"breakStartTime\":1740819600000"));

    let back: PersistedBreakState = get_json(&store, &break_state_key("s1")).unwrap().unwrap();
    assert_eq!(back, state);
    assert_eq!(back.started_at().unwrap().timestamp(), 1_740_819_600);
}

#[test]
fn failing_store_reports_persistence_errors() {
    let mut store = MemoryStore::failing();
    assert!(matches!(
        store.set("k", "v"),
        Err(AppError::Persistence(_))
    ));
    assert!(store.is_empty());
}
