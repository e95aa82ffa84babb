#![allow(dead_code)]
use assert_cmd::{Command, cargo_bin_cmd};
use chrono::{DateTime, TimeZone, Utc};
use rtimeguard::authority::SqliteAuthority;
use rtimeguard::core::comprehension::ComprehensionHooks;
use rtimeguard::db::initialize::init_db;
use rtimeguard::db::pool::DbPool;
use rtimeguard::errors::{AppError, AppResult};
use rtimeguard::models::{AnswerSubmission, Question};
use rtimeguard::utils::time::ManualTimeSource;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tempfile::TempDir;

pub const SESSION: &str = "sess-1";
pub const LEARNER: &str = "alice";

pub fn rtg() -> Command {
    cargo_bin_cmd!("rtimeguard")
}

/// Fixed reference instant for clock-driven tests.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
}

/// Isolated HOME with its own database and client store.
pub struct CliEnv {
    pub dir: TempDir,
}

impl CliEnv {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn db_path(&self) -> String {
        self.dir.path().join("guard.sqlite").to_string_lossy().to_string()
    }

    pub fn store_path(&self) -> String {
        self.dir.path().join("sessions.json").to_string_lossy().to_string()
    }

    pub fn out_path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().to_string()
    }

    /// `rtimeguard --db <db> --store <store> --user alice ...` with HOME set
    /// to the temp dir so no real config is touched.
    pub fn cmd(&self) -> Command {
        self.cmd_as(LEARNER, &self.store_path())
    }

    /// Same database, another learner with their own client store.
    pub fn cmd_as(&self, user: &str, store: &str) -> Command {
        let mut cmd = rtg();
        cmd.env("HOME", self.dir.path())
            .env("APPDATA", self.dir.path())
            .env_remove("RUST_LOG")
            .args(["--db", &self.db_path(), "--store", store, "--user", user]);
        cmd
    }

    pub fn init(&self) {
        self.cmd().args(["--test", "init"]).assert().success();
    }
}

/// Fresh in-memory server of record.
pub fn memory_pool() -> DbPool {
    let pool = DbPool::in_memory().expect("in-memory db");
    init_db(&pool.conn).expect("schema");
    pool
}

/// File-backed server of record, so a test can look at it from a second
/// connection while an engine owns the first.
pub fn file_pool(path: &Path) -> DbPool {
    let pool = DbPool::new(&path.to_string_lossy()).expect("open db");
    init_db(&pool.conn).expect("schema");
    pool
}

pub fn temp_db(dir: &TempDir) -> PathBuf {
    dir.path().join("server.sqlite")
}

pub fn authority(pool: DbPool, user: &str, clock: &ManualTimeSource) -> SqliteAuthority {
    SqliteAuthority::new(pool, user, Box::new(clock.clone()), "test-suite")
}

pub fn question(id: &str) -> Question {
    Question {
        id: id.to_string(),
        prompt: format!("Question {id}?"),
        options: vec!["yes".to_string(), "no".to_string()],
    }
}

/// Scripted hooks: hands out queued questions and keeps every submission.
#[derive(Clone, Default)]
pub struct ScriptedHooks {
    pub questions: Rc<RefCell<VecDeque<Question>>>,
    pub submitted: Rc<RefCell<Vec<AnswerSubmission>>>,
    pub fail_submit: Rc<RefCell<bool>>,
    pub fail_fetch: Rc<RefCell<bool>>,
}

impl ScriptedHooks {
    pub fn with_questions(ids: &[&str]) -> Self {
        let hooks = Self::default();
        for id in ids {
            hooks.questions.borrow_mut().push_back(question(id));
        }
        hooks
    }
}

impl ComprehensionHooks for ScriptedHooks {
    fn fetch_question(&mut self) -> AppResult<Option<Question>> {
        if *self.fail_fetch.borrow() {
            return Err(AppError::Other("question service down".into()));
        }
        Ok(self.questions.borrow_mut().pop_front())
    }

    fn submit_answer(&mut self, submission: &AnswerSubmission) -> AppResult<()> {
        if *self.fail_submit.borrow() {
            return Err(AppError::Other("submission endpoint down".into()));
        }
        self.submitted.borrow_mut().push(submission.clone());
        Ok(())
    }
}
