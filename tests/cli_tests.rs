mod common;

use common::CliEnv;
use predicates::str::contains;
use std::fs;

#[test]
fn init_creates_the_server_of_record() {
    let env = CliEnv::new();
    env.cmd()
        .args(["--test", "init"])
        .assert()
        .success()
        .stdout(contains("Database initialized"));

    assert!(fs::metadata(env.db_path()).is_ok());

    env.cmd()
        .args(["db", "--check"])
        .assert()
        .success()
        .stdout(contains("Integrity check passed"))
        .stdout(contains("Schema is up to date"));
}

#[test]
fn early_break_end_is_rejected_with_minutes_remaining() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["break", "start", "--session", "s-cli"])
        .assert()
        .success()
        .stdout(contains("Break started for session s-cli (mandatory)"));

    env.cmd()
        .args(["break", "status", "--session", "s-cli"])
        .assert()
        .success()
        .stdout(contains("Continuous study : 00:00:00"))
        .stdout(contains("On break         : yes (mandatory)"))
        .stdout(contains("Countdown        : "));

    env.cmd()
        .args(["break", "end", "--session", "s-cli"])
        .assert()
        .failure()
        .stderr(contains("10 minute(s) remaining"));

    // still on break afterwards
    env.cmd()
        .args(["break", "start", "--session", "s-cli"])
        .assert()
        .failure()
        .stderr(contains("already on a break"));

    env.cmd()
        .args(["audit", "--session", "s-cli"])
        .assert()
        .success()
        .stdout(contains("BREAK_VALIDATION_REJECTED"))
        .stdout(contains("1 entry"));

    env.cmd()
        .args(["log", "--print"])
        .assert()
        .success()
        .stdout(contains("break_start"))
        .stdout(contains("break_rejected"));
}

#[test]
fn ending_a_break_that_was_never_started_fails() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["break", "end", "--session", "nothing"])
        .assert()
        .failure()
        .stderr(contains("not on a break"));
}

#[test]
fn break_belongs_to_the_learner_who_started_it() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["break", "start", "--session", "shared", "--voluntary"])
        .assert()
        .success()
        .stdout(contains("(voluntary)"));

    // another learner with a fresh local store
    env.cmd_as("mallory", &env.out_path("mallory.json"))
        .args(["break", "end", "--session", "shared"])
        .assert()
        .failure()
        .stderr(contains("Unauthorized"));

    env.cmd()
        .args(["audit"])
        .assert()
        .success()
        .stdout(contains("BREAK_VALIDATION_FAILED"));
}

#[test]
fn audit_export_writes_csv_and_json() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["break", "start", "--session", "s-exp"])
        .assert()
        .success();
    env.cmd()
        .args(["break", "end", "--session", "s-exp"])
        .assert()
        .failure();

    let csv_path = env.out_path("audit.csv");
    env.cmd()
        .args(["export", "--format", "csv", "--file", &csv_path])
        .assert()
        .success()
        .stdout(contains("export completed"));
    let csv = fs::read_to_string(&csv_path).unwrap();
    assert!(csv.starts_with("id,event_type,user_id,session_id"));
    assert!(csv.contains("BREAK_VALIDATION_REJECTED"));
    assert!(csv.contains("s-exp"));

    let json_path = env.out_path("audit.json");
    env.cmd()
        .args(["export", "--format", "json", "--file", &json_path])
        .assert()
        .success();
    let rows: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(rows.as_array().map(|a| a.len()), Some(1));
    assert_eq!(rows[0]["event_type"], "BREAK_VALIDATION_REJECTED");

    // existing file without --force and nothing on stdin: cancelled
    env.cmd()
        .args(["export", "--format", "csv", "--file", &csv_path])
        .write_stdin("n\n")
        .assert()
        .failure()
        .stderr(contains("export cancelled"));
}

#[test]
fn export_requires_an_absolute_path() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["export", "--file", "relative.csv"])
        .assert()
        .failure()
        .stderr(contains("must be absolute"));
}

#[test]
fn study_run_is_recorded_as_a_session() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args([
            "study",
            "--session",
            "s-study",
            "--minutes",
            "0",
            "--lesson",
            "intro",
            "--lesson",
            "chapter-1",
        ])
        .assert()
        .success()
        .stdout(contains("Lesson opened: intro"))
        .stdout(contains("Session s-study saved"));

    env.cmd()
        .args(["sessions"])
        .assert()
        .success()
        .stdout(contains("s-study"))
        .stdout(contains("intro, chapter-1"));

    let out = env.out_path("sessions.csv");
    env.cmd()
        .args(["export", "--what", "sessions", "--file", &out])
        .assert()
        .success();
    let csv = fs::read_to_string(&out).unwrap();
    assert!(csv.contains("intro;chapter-1"));
}

#[test]
fn study_is_refused_while_on_break() {
    let env = CliEnv::new();
    env.init();

    env.cmd()
        .args(["break", "start", "--session", "s-b"])
        .assert()
        .success();

    env.cmd()
        .args(["study", "--session", "s-b", "--minutes", "0"])
        .assert()
        .success()
        .stdout(contains("is on a break"));
}

#[test]
fn config_print_shows_the_defaults() {
    let env = CliEnv::new();
    env.cmd()
        .args(["config", "--print"])
        .assert()
        .success()
        .stdout(contains("session_store:"))
        .stdout(contains("audit_source: rtimeguard-cli"));
}

#[cfg(unix)]
#[test]
fn interrupted_study_keeps_the_time_counted() {
    use rtimeguard::db::pool::DbPool;
    use rtimeguard::db::sessions::{list_session_records, load_daily_seconds};
    use std::process::{Command, Stdio};
    use std::thread;
    use std::time::Duration;

    let env = CliEnv::new();
    env.init();

    let child = Command::new(env!("CARGO_BIN_EXE_rtimeguard"))
        .env("HOME", env.dir.path())
        .env_remove("RUST_LOG")
        .args([
            "--db",
            &env.db_path(),
            "--store",
            &env.store_path(),
            "--user",
            "alice",
            "study",
            "--session",
            "s-int",
        ])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();

    thread::sleep(Duration::from_millis(2_500));
    let killed = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(killed.success());

    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Session s-int saved (interrupted)"));

    let pool = DbPool::new(&env.db_path()).unwrap();
    let today = chrono::Local::now().date_naive();
    assert!(load_daily_seconds(&pool.conn, "alice", today).unwrap() >= 1);
    let records = list_session_records(&pool.conn, Some("alice")).unwrap();
    assert!(records.iter().any(|r| r.record.session_id == "s-int"));
}
