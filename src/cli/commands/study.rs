//! `study`: the live one-second loop around a [`ComplianceEngine`].

use crate::cli::commands::{build_engine, open_pool, resolve_user};
use crate::cli::parser::Cli;
use crate::config::Config;
use crate::core::comprehension::{ComprehensionHooks, NoQuestions};
use crate::core::engine::{ComplianceEngine, EngineEvent};
use crate::db::log::ttlog;
use crate::db::pool::DbPool;
use crate::db::sessions::{add_daily_seconds, load_daily_seconds, save_session_record};
use crate::errors::{AppError, AppResult};
use crate::models::{AnswerSubmission, BreakReason, Question};
use crate::ui::messages::{info, success, warning};
use crate::utils::time::{format_hh_mm_ss, format_mm_ss};
use chrono::{Local, NaiveDate, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Questions served in file order, wrapping around. Answers go to the
/// internal log.
pub struct QuestionBank {
    questions: Vec<Question>,
    next: usize,
    log: Option<DbPool>,
    session_id: String,
}

impl QuestionBank {
    pub fn load(path: &str, log: Option<DbPool>, session_id: &str) -> AppResult<Self> {
        let content = fs::read_to_string(path)?;
        let questions: Vec<Question> = serde_json::from_str(&content)?;
        Ok(Self {
            questions,
            next: 0,
            log,
            session_id: session_id.to_string(),
        })
    }
}

impl ComprehensionHooks for QuestionBank {
    fn fetch_question(&mut self) -> AppResult<Option<Question>> {
        if self.questions.is_empty() {
            return Ok(None);
        }
        let q = self.questions[self.next % self.questions.len()].clone();
        self.next += 1;
        Ok(Some(q))
    }

    fn submit_answer(&mut self, submission: &AnswerSubmission) -> AppResult<()> {
        if let Some(pool) = &self.log {
            ttlog(
                &pool.conn,
                "comprehension",
                &self.session_id,
                &format!(
                    "question {} answered '{}' in {} ms",
                    submission.question.id, submission.answer, submission.time_to_answer_ms
                ),
            )?;
        }
        Ok(())
    }
}

fn ask(question: &Question) -> AppResult<String> {
    println!();
    info(format!("Comprehension check: {}", question.prompt));
    for (i, opt) in question.options.iter().enumerate() {
        println!("  {}) {}", i + 1, opt);
    }
    print!("Answer (empty to dismiss): ");
    io::stdout().flush().ok();

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim();

    // a bare option number selects that option
    if let Ok(n) = answer.parse::<usize>()
        && n >= 1
        && n <= question.options.len()
    {
        return Ok(question.options[n - 1].clone());
    }
    Ok(answer.to_string())
}

/// Ask until the answer is recorded or the check dismissed. A failed
/// submission keeps the check open and the answer as a draft.
fn answer_open_check(engine: &mut ComplianceEngine, question: &Question) -> AppResult<()> {
    loop {
        let answer = ask(question)?;
        if answer.is_empty() {
            engine.dismiss_check();
            info("Check dismissed.");
            return Ok(());
        }

        match engine.submit_answer(&answer) {
            Ok(_) => {
                success("Answer recorded.");
                return Ok(());
            }
            Err(e) if e.is_retryable() => {
                engine.save_draft(Some(answer), None)?;
                warning(format!("{e} Your answer was kept."));
            }
            Err(e) => return Err(e),
        }
    }
}

/// The clock paused itself; `true` when the learner is back.
fn confirm_presence(idle_seconds: u64) -> AppResult<bool> {
    println!();
    warning(format!(
        "No activity for {}. The clock is paused.",
        format_hh_mm_ss(idle_seconds)
    ));
    print!("Press Enter to keep studying (Ctrl-D to stop): ");
    io::stdout().flush().ok();

    let mut line = String::new();
    Ok(io::stdin().lock().read_line(&mut line)? > 0)
}

/// Raised on Ctrl-C. The signal is awaited on a helper thread with its own
/// single-threaded runtime; the study loop polls the flag once a second.
fn interrupt_flag() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let raised = Arc::clone(&flag);

    let spawned = thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(error = %e, "Ctrl-C handler unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    raised.store(true, Ordering::SeqCst);
                }
            });
        });

    if let Err(e) = spawned {
        warn!(error = %e, "Ctrl-C handler unavailable");
    }
    flag
}

/// Pushes the study time of the run into the day ledger in increments.
struct DailyLedger<'a> {
    conn: &'a Connection,
    user: String,
    day: NaiveDate,
    flushed_at: u64,
}

impl DailyLedger<'_> {
    fn flush(&mut self, daily_seconds: u64) -> AppResult<()> {
        let delta = daily_seconds.saturating_sub(self.flushed_at);
        if delta > 0 {
            add_daily_seconds(self.conn, &self.user, self.day, delta)?;
            self.flushed_at = daily_seconds;
        }
        Ok(())
    }
}

fn sleep_to_next_second() {
    let ms = Utc::now().timestamp_subsec_millis().min(999);
    thread::sleep(Duration::from_millis(u64::from(1000 - ms)));
}

pub fn handle(
    cli: &Cli,
    cfg: &Config,
    session: &str,
    minutes: Option<u64>,
    lessons: &[String],
) -> AppResult<()> {
    let user = resolve_user(cli, cfg);
    let pool = open_pool(cfg)?;

    let hooks: Box<dyn ComprehensionHooks> = match &cfg.question_bank {
        Some(path) => Box::new(QuestionBank::load(path, Some(open_pool(cfg)?), session)?),
        None => Box::new(NoQuestions),
    };
    let mut engine = build_engine(cli, cfg, session, hooks)?;

    let today = Local::now().date_naive();
    let already = load_daily_seconds(&pool.conn, &user, today)?;
    if engine.load_daily_total(already).is_some() || engine.clock().is_locked_out() {
        return Err(AppError::LockedOut);
    }

    let mut metadata = BTreeMap::new();
    metadata.insert("user".to_string(), user.clone());
    metadata.insert("source".to_string(), cfg.audit_source.clone());
    engine.open_session(metadata);

    engine.start()?;

    if engine.breaks().is_on_break() {
        warning(format!(
            "Session {session} is on a break. Run `rtimeguard break end --session {session}` first."
        ));
        return finish(&mut engine, &pool.conn, &user, "on break");
    }
    if engine.is_content_locked() {
        warning("A mandatory break is due before study can continue.");
        engine.start_break(BreakReason::Mandatory)?;
        return finish(&mut engine, &pool.conn, &user, "break required");
    }

    for lesson in lessons {
        if engine.record_lesson(lesson)? {
            info(format!("Lesson opened: {lesson}"));
        }
    }

    info(format!(
        "Studying session {session}: {} continuous, {} left today.",
        format_hh_mm_ss(engine.clock().continuous_seconds()),
        format_hh_mm_ss(engine.clock().remaining_daily_seconds())
    ));

    let deadline = minutes.map(|m| Instant::now() + Duration::from_secs(m * 60));
    let mut ledger = DailyLedger {
        conn: &pool.conn,
        user: user.clone(),
        day: today,
        flushed_at: engine.clock().daily_seconds(),
    };

    let interrupted = interrupt_flag();
    let outcome = study_loop(&mut engine, &mut ledger, deadline, &interrupted);

    // whatever ended the run, the time counted so far is kept
    engine.pause();
    let flushed = ledger.flush(engine.clock().daily_seconds());
    let reason = match &outcome {
        Ok(reason) => *reason,
        Err(_) => "aborted",
    };
    let finished = finish(&mut engine, &pool.conn, &user, reason);

    outcome?;
    flushed?;
    finished
}

fn study_loop(
    engine: &mut ComplianceEngine,
    ledger: &mut DailyLedger<'_>,
    deadline: Option<Instant>,
    interrupted: &AtomicBool,
) -> AppResult<&'static str> {
    loop {
        sleep_to_next_second();

        if interrupted.load(Ordering::SeqCst) {
            println!();
            warning("Interrupted.");
            return Ok("interrupted");
        }

        let now_day = Local::now().date_naive();
        if now_day != ledger.day {
            ledger.flush(engine.clock().daily_seconds())?;
            engine.roll_over_day();
            ledger.day = now_day;
            ledger.flushed_at = 0;
            debug!(%now_day, "compliance day changed during study");
        }

        for event in engine.advance() {
            match event {
                EngineEvent::BreakRequired { continuous_seconds } => {
                    warning(format!(
                        "{} of continuous study: a {} break is required.",
                        format_hh_mm_ss(continuous_seconds),
                        format_mm_ss(crate::core::constants::MIN_BREAK_SECONDS)
                    ));
                    engine.start_break(BreakReason::Mandatory)?;
                    info(format!(
                        "Break started. Run `rtimeguard break end --session {}` when it is over.",
                        engine.session_id()
                    ));
                    return Ok("break required");
                }
                EngineEvent::DailyLimitReached { .. } => {
                    warning("Daily instruction limit reached. Study is locked until tomorrow.");
                    return Ok("daily limit");
                }
                EngineEvent::ComprehensionOpened(question) => {
                    answer_open_check(engine, &question)?;
                }
                EngineEvent::QuestionProviderFailed {
                    error,
                    retry_at_continuous_seconds,
                } => {
                    debug!(%error, retry_at_continuous_seconds, "comprehension check postponed");
                }
                EngineEvent::Idle { idle_seconds } => {
                    ledger.flush(engine.clock().daily_seconds())?;
                    if !confirm_presence(idle_seconds)? {
                        return Ok("idle");
                    }
                    engine.resume()?;
                }
            }
        }

        let daily = engine.clock().daily_seconds();
        if daily % 60 == 0 {
            ledger.flush(daily)?;
            info(format!(
                "{} continuous, {} today",
                format_hh_mm_ss(engine.clock().continuous_seconds()),
                format_hh_mm_ss(daily)
            ));
        }

        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok("time box over");
        }
    }
}

fn finish(engine: &mut ComplianceEngine, conn: &Connection, user: &str, reason: &str) -> AppResult<()> {
    let continuous = engine.clock().continuous_seconds();

    if let Some(record) = engine.close_session() {
        save_session_record(conn, user, &record)?;
        ttlog(
            conn,
            "study",
            engine.session_id(),
            &format!(
                "{reason}: {} lesson(s), {continuous}s continuous",
                record.lesson_count()
            ),
        )?;
    }

    success(format!("Session {} saved ({reason}).", engine.session_id()));
    Ok(())
}
