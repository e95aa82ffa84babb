//! Client-side composition of the compliance components.
//!
//! Clock ticks drive the break and comprehension checks; the break
//! coordinator gates content and hands break-end attempts to the authority;
//! the recorder logs lesson access independently of timing.

use crate::authority::{BreakAuthority, ValidationOutcome};
use crate::core::breaks::{ActiveBreak, BreakCoordinator, BreakEndOutcome, BreakRequirement, EndAttempt};
use crate::core::clock::{ClockSignal, SessionClock, ThresholdLatch};
use crate::core::comprehension::{ComprehensionHooks, ComprehensionTrigger};
use crate::core::recorder::SessionRecorder;
use crate::errors::{AppError, AppResult};
use crate::models::{BreakReason, ComplianceSession, ComprehensionCheck, Question, SessionRecord};
use crate::store::KeyValueStore;
use crate::utils::time::TimeSource;
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Something the caller has to react to after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Content is locked until a mandatory break is taken.
    BreakRequired { continuous_seconds: u64 },
    /// Study is over for the compliance day.
    DailyLimitReached { daily_seconds: u64 },
    /// Lesson progression is held until the check is answered or dismissed.
    ComprehensionOpened(Question),
    /// The question provider failed; the check is retried once continuous
    /// study reaches `retry_at_continuous_seconds`.
    QuestionProviderFailed {
        error: String,
        retry_at_continuous_seconds: u64,
    },
    /// No activity for too long: the clock paused itself.
    Idle { idle_seconds: u64 },
}

impl From<ClockSignal> for EngineEvent {
    fn from(signal: ClockSignal) -> Self {
        match signal {
            ClockSignal::BreakRequired { continuous_seconds } => {
                EngineEvent::BreakRequired { continuous_seconds }
            }
            ClockSignal::DailyLimitReached { daily_seconds } => {
                EngineEvent::DailyLimitReached { daily_seconds }
            }
            ClockSignal::Idle { idle_seconds } => EngineEvent::Idle { idle_seconds },
        }
    }
}

pub struct ComplianceEngine {
    session_id: String,
    clock: SessionClock,
    breaks: BreakCoordinator,
    comprehension: ComprehensionTrigger,
    recorder: SessionRecorder,
    store: Box<dyn KeyValueStore>,
    authority: Box<dyn BreakAuthority>,
    hooks: Box<dyn ComprehensionHooks>,
    time: Box<dyn TimeSource>,
}

impl ComplianceEngine {
    /// Rehydrate a session from the local store and reconcile its break
    /// state with the server of record. The server wins when they disagree.
    pub fn new(
        session_id: &str,
        mut store: Box<dyn KeyValueStore>,
        mut authority: Box<dyn BreakAuthority>,
        hooks: Box<dyn ComprehensionHooks>,
        time: Box<dyn TimeSource>,
    ) -> Self {
        let mut clock = SessionClock::restore(session_id, store.as_ref());
        let mut breaks = BreakCoordinator::restore(session_id, store.as_ref());

        match authority.current_break(session_id) {
            Ok(Some(server_break)) => breaks.adopt_server_break(&server_break, store.as_mut()),
            Ok(None) if breaks.is_on_break() => settle_local_break(
                session_id,
                &mut clock,
                &mut breaks,
                authority.as_mut(),
                store.as_mut(),
            ),
            Ok(None) => {}
            Err(e) => warn!(session_id, error = %e, "could not reconcile break state with the server"),
        }

        if clock.break_latch() == ThresholdLatch::Fired && !breaks.is_on_break() {
            breaks.on_break_required(clock.continuous_seconds(), store.as_mut());
        }

        let comprehension =
            ComprehensionTrigger::with_rng_at(StdRng::from_entropy(), clock.continuous_seconds())
                .for_session(session_id, store.as_ref());

        Self {
            session_id: session_id.to_string(),
            clock,
            breaks,
            comprehension,
            recorder: SessionRecorder::new(),
            store,
            authority,
            hooks,
            time,
        }
    }

    /// Replace the comprehension randomness, e.g. with a seeded generator.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.comprehension = ComprehensionTrigger::with_rng_at(rng, self.clock.continuous_seconds())
            .for_session(&self.session_id, self.store.as_ref());
        self
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.time.now()
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn breaks(&self) -> &BreakCoordinator {
        &self.breaks
    }

    pub fn comprehension(&self) -> &ComprehensionTrigger {
        &self.comprehension
    }

    pub fn recorder(&self) -> &SessionRecorder {
        &self.recorder
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn authority_mut(&mut self) -> &mut dyn BreakAuthority {
        self.authority.as_mut()
    }

    pub fn snapshot(&self) -> ComplianceSession {
        self.clock.snapshot()
    }

    /// Lesson content must not be shown or advanced.
    pub fn is_content_locked(&self) -> bool {
        self.breaks.is_on_break()
            || matches!(self.breaks.requirement(), BreakRequirement::Required { .. })
            || self.comprehension.is_open()
            || self.clock.is_locked_out()
    }

    // ---------------------------
    // Clock lifecycle
    // ---------------------------

    /// Start counting. A session restored in the middle of a break starts
    /// paused.
    pub fn start(&mut self) -> AppResult<bool> {
        let started = self.clock.start(self.time.now())?;
        if started && (self.breaks.is_on_break() || self.break_pending()) {
            self.clock.pause();
        }
        Ok(started)
    }

    pub fn pause(&mut self) -> bool {
        self.clock.pause()
    }

    /// Learner input that is not otherwise routed through the engine.
    /// Keeps the idle timeout from pausing the clock.
    pub fn record_activity(&mut self) {
        let now = self.time.now();
        self.clock.record_activity(now);
    }

    /// Resume from a pause. Refused while a break is running or owed.
    pub fn resume(&mut self) -> AppResult<bool> {
        if self.breaks.is_on_break() {
            return Err(AppError::InvalidState("end the break before resuming".into()));
        }
        if self.break_pending() {
            return Err(AppError::InvalidState(
                "a mandatory break must be taken before resuming".into(),
            ));
        }
        Ok(self.clock.resume(self.time.now()))
    }

    /// Stop the session: counters cleared, per-session keys purged, pending
    /// checks cancelled. A break in progress is abandoned on the server.
    pub fn stop(&mut self) {
        if let Some(active) = self.breaks.abandon(self.store.as_mut())
            && let Err(e) = self.authority.abandon_break(&self.session_id)
        {
            warn!(
                session_id = %self.session_id,
                break_id = %active.break_id,
                error = %e,
                "could not abandon the server break"
            );
        }

        self.clock.stop(self.store.as_mut());
        self.comprehension.reset(0, self.store.as_mut());
    }

    /// Count exactly one second.
    pub fn tick(&mut self) -> Vec<EngineEvent> {
        let signals = self.clock.tick(self.store.as_mut());
        self.after_clock(signals)
    }

    /// Count every whole second elapsed on the time source.
    pub fn advance(&mut self) -> Vec<EngineEvent> {
        let now = self.time.now();
        let signals = self.clock.advance(now, self.store.as_mut());
        self.after_clock(signals)
    }

    fn after_clock(&mut self, signals: Vec<ClockSignal>) -> Vec<EngineEvent> {
        let mut events = Vec::with_capacity(signals.len());

        for signal in signals {
            if let ClockSignal::BreakRequired { continuous_seconds } = signal {
                self.breaks
                    .on_break_required(continuous_seconds, self.store.as_mut());
                self.clock.pause();
            }
            events.push(EngineEvent::from(signal));
        }

        if self.clock.is_running() && !self.breaks.is_on_break() {
            let now = self.time.now();
            match self.comprehension.on_tick(
                self.clock.continuous_seconds(),
                now,
                self.hooks.as_mut(),
                self.store.as_mut(),
            ) {
                Ok(Some(question)) => events.push(EngineEvent::ComprehensionOpened(question)),
                Ok(None) => {}
                Err(e) => {
                    let error = match e {
                        AppError::SystemError(detail) => detail,
                        other => other.to_string(),
                    };
                    events.push(EngineEvent::QuestionProviderFailed {
                        error,
                        retry_at_continuous_seconds: self.comprehension.next_trigger_threshold(),
                    });
                }
            }
        }

        events
    }

    /// Day total supplied by the owner of the compliance day.
    pub fn load_daily_total(&mut self, daily_seconds: u64) -> Option<EngineEvent> {
        self.clock.load_daily_total(daily_seconds).map(EngineEvent::from)
    }

    pub fn roll_over_day(&mut self) {
        self.clock.roll_over_day();
    }

    fn break_pending(&self) -> bool {
        matches!(self.breaks.requirement(), BreakRequirement::Required { .. })
    }

    // ---------------------------
    // Breaks
    // ---------------------------

    /// Open a break on the server of record and pause the clock.
    pub fn start_break(&mut self, reason: BreakReason) -> AppResult<ActiveBreak> {
        let now = self.time.now();
        let paused = self.clock.pause();

        let result = self.breaks.start_break(
            reason,
            self.authority.as_mut(),
            now,
            self.store.as_mut(),
        );

        match result {
            Ok(active) => Ok(active.clone()),
            Err(e) => {
                if paused {
                    self.clock.resume(now);
                }
                Err(e)
            }
        }
    }

    pub fn begin_end_break(&mut self) -> AppResult<EndAttempt> {
        self.breaks.begin_end_attempt()
    }

    /// Apply a validation result. On completion continuous study restarts
    /// from zero and the clock resumes if the session was active.
    ///
    /// A duplicate-submission refusal for this very break means another
    /// client completed it first; that counts as a completion here too.
    pub fn finish_end_break(
        &mut self,
        attempt: EndAttempt,
        result: AppResult<ValidationOutcome>,
    ) -> AppResult<BreakEndOutcome> {
        let break_id = attempt.break_id.clone();
        let outcome = match self
            .breaks
            .finish_end_attempt(attempt, result, self.store.as_mut())
        {
            Err(AppError::DuplicateSubmission(msg)) => self
                .completed_elsewhere(&break_id)
                .ok_or(AppError::DuplicateSubmission(msg))?,
            other => other?,
        };

        if let BreakEndOutcome::Completed(entry) = &outcome {
            self.clock.reset_continuous(self.store.as_mut());
            self.comprehension.reset(0, self.store.as_mut());
            let resumed = self.clock.resume(self.time.now());
            debug!(
                session_id = %self.session_id,
                duration_seconds = entry.duration,
                resumed,
                "continuous study reset after break"
            );
        }

        Ok(outcome)
    }

    fn completed_elsewhere(&mut self, break_id: &str) -> Option<BreakEndOutcome> {
        let latest = match self.authority.latest_break(&self.session_id) {
            Ok(Some(b)) if b.id == break_id => b,
            Ok(_) => return None,
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "could not look up the last server break");
                return None;
            }
        };
        self.breaks
            .apply_server_completion(&latest, self.store.as_mut())
            .map(BreakEndOutcome::Completed)
    }

    /// Ask the authority to end the break. Only the session id leaves the
    /// client.
    pub fn attempt_end_break(&mut self) -> AppResult<BreakEndOutcome> {
        let attempt = self.begin_end_break()?;
        let result = self.authority.validate_break_end(&attempt.session_id);
        self.finish_end_break(attempt, result)
    }

    // ---------------------------
    // Comprehension checks
    // ---------------------------

    pub fn submit_answer(&mut self, answer: &str) -> AppResult<ComprehensionCheck> {
        let now = self.time.now();
        self.clock.record_activity(now);
        self.comprehension.submit_answer(
            answer,
            self.clock.continuous_seconds(),
            now,
            self.hooks.as_mut(),
            self.store.as_mut(),
        )
    }

    pub fn dismiss_check(&mut self) -> Option<ComprehensionCheck> {
        self.record_activity();
        self.comprehension
            .close(self.clock.continuous_seconds(), self.store.as_mut())
    }

    pub fn save_draft(
        &mut self,
        selected_answer: Option<String>,
        feedback: Option<String>,
    ) -> AppResult<()> {
        self.record_activity();
        self.comprehension
            .save_draft(selected_answer, feedback, self.store.as_mut())
    }

    // ---------------------------
    // Session records
    // ---------------------------

    pub fn open_session(&mut self, metadata: BTreeMap<String, String>) -> &SessionRecord {
        let now = self.time.now();
        self.recorder.create_session(&self.session_id, metadata, now)
    }

    /// Record a lesson view. Refused while content is locked.
    pub fn record_lesson(&mut self, lesson_id: &str) -> AppResult<bool> {
        self.record_activity();
        if self.is_content_locked() {
            return Err(AppError::InvalidState(format!(
                "lesson '{lesson_id}' is locked for session {}",
                self.session_id
            )));
        }
        Ok(self.recorder.record_lesson_access(lesson_id))
    }

    pub fn close_session(&mut self) -> Option<SessionRecord> {
        let record = self.recorder.close_session(self.time.now());
        if let Some(r) = &record {
            info!(
                session_id = %r.session_id,
                lessons = r.lesson_count(),
                "session record closed"
            );
        }
        record
    }
}

/// The local store holds a break the server no longer considers active.
/// If the server completed that very break (another client validated it),
/// take the completion; otherwise the break was abandoned and is dropped.
fn settle_local_break(
    session_id: &str,
    clock: &mut SessionClock,
    breaks: &mut BreakCoordinator,
    authority: &mut dyn BreakAuthority,
    store: &mut dyn KeyValueStore,
) {
    let latest = match authority.latest_break(session_id) {
        Ok(latest) => latest,
        Err(e) => {
            warn!(session_id, error = %e, "could not look up the last server break; keeping the local one");
            return;
        }
    };

    match latest.and_then(|b| breaks.apply_server_completion(&b, store)) {
        Some(_) => clock.reset_continuous(store),
        None => {
            warn!(session_id, "local break has no active server row; dropping it");
            breaks.abandon(store);
        }
    }
}
