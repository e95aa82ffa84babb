//! Continuous-study and daily counters.
//!
//! One tick is one second of instruction. The clock only counts while it is
//! running; the break-required and daily-limit signals are latched so each
//! fires once per threshold crossing. Without learner activity the clock
//! pauses itself after [`IDLE_TIMEOUT_SECONDS`].

use crate::core::constants::{BREAK_REQUIRED_AFTER_SECONDS, IDLE_TIMEOUT_SECONDS, MAX_DAILY_SECONDS};
use crate::errors::{AppError, AppResult};
use crate::models::ComplianceSession;
use crate::store::{KeyValueStore, break_state_key, session_time_key};
use crate::utils::time::elapsed_secs;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Stopped,
    /// `anchor` is the instant the next tick is counted from.
    Running { anchor: DateTime<Utc> },
    Paused,
    LockedOut,
}

/// One-shot latch for a threshold. `Armed` → `Fired` when the threshold is
/// crossed; back to `Armed` only when the counter is reset below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdLatch {
    Armed,
    Fired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSignal {
    BreakRequired { continuous_seconds: u64 },
    DailyLimitReached { daily_seconds: u64 },
    /// Paused for lack of activity; nothing after the timeout was counted.
    Idle { idle_seconds: u64 },
}

#[derive(Debug, Clone)]
pub struct SessionClock {
    session_id: Option<String>,
    continuous_seconds: u64,
    daily_seconds: u64,
    run: RunState,
    break_latch: ThresholdLatch,
    daily_latch: ThresholdLatch,
    last_activity: Option<DateTime<Utc>>,
}

impl SessionClock {
    pub fn new(session_id: Option<String>) -> Self {
        Self {
            session_id,
            continuous_seconds: 0,
            daily_seconds: 0,
            run: RunState::Stopped,
            break_latch: ThresholdLatch::Armed,
            daily_latch: ThresholdLatch::Armed,
            last_activity: None,
        }
    }

    /// Rehydrate `continuous_seconds` for a known session. A missing or
    /// unreadable value starts from zero. The daily total is not stored here:
    /// feed it with [`SessionClock::load_daily_total`].
    pub fn restore(session_id: &str, store: &dyn KeyValueStore) -> Self {
        let mut clock = Self::new(Some(session_id.to_string()));

        match store.get(&session_time_key(session_id)) {
            Ok(Some(raw)) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => {
                    clock.continuous_seconds = secs;
                    if secs >= BREAK_REQUIRED_AFTER_SECONDS {
                        // already crossed before the reload
                        clock.break_latch = ThresholdLatch::Fired;
                    }
                    debug!(session_id, continuous_seconds = secs, "session time restored");
                }
                Ok(_) => {}
                Err(e) => warn!(session_id, error = %e, "ignoring unparsable session time"),
            },
            Ok(None) => {}
            Err(e) => warn!(session_id, error = %e, "failed to restore session time"),
        }

        clock
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn continuous_seconds(&self) -> u64 {
        self.continuous_seconds
    }

    pub fn daily_seconds(&self) -> u64 {
        self.daily_seconds
    }

    pub fn is_active(&self) -> bool {
        matches!(self.run, RunState::Running { .. } | RunState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.run, RunState::Paused)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.run, RunState::Running { .. })
    }

    pub fn is_locked_out(&self) -> bool {
        matches!(self.run, RunState::LockedOut)
    }

    pub fn break_latch(&self) -> ThresholdLatch {
        self.break_latch
    }

    pub fn daily_latch(&self) -> ThresholdLatch {
        self.daily_latch
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_activity
    }

    pub fn remaining_daily_seconds(&self) -> u64 {
        MAX_DAILY_SECONDS.saturating_sub(self.daily_seconds)
    }

    pub fn snapshot(&self) -> ComplianceSession {
        ComplianceSession {
            id: self.session_id.clone(),
            continuous_seconds: self.continuous_seconds,
            daily_seconds: self.daily_seconds,
            is_active: self.is_active(),
            is_paused: self.is_paused(),
            is_locked_out: self.is_locked_out(),
        }
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Begin ticking. Returns `Ok(false)` when already active,
    /// `Err(LockedOut)` once the daily cap has been reached.
    pub fn start(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        match self.run {
            RunState::LockedOut => Err(AppError::LockedOut),
            RunState::Running { .. } | RunState::Paused => Ok(false),
            RunState::Stopped => {
                self.run = RunState::Running { anchor: now };
                self.last_activity = Some(now);
                info!(session_id = ?self.session_id, "study clock started");
                Ok(true)
            }
        }
    }

    pub fn pause(&mut self) -> bool {
        if let RunState::Running { .. } = self.run {
            self.run = RunState::Paused;
            debug!(session_id = ?self.session_id, "study clock paused");
            true
        } else {
            false
        }
    }

    /// Resume from pause; the tick anchor moves to `now` so time spent
    /// paused is never counted.
    pub fn resume(&mut self, now: DateTime<Utc>) -> bool {
        if let RunState::Paused = self.run {
            self.run = RunState::Running { anchor: now };
            self.last_activity = Some(now);
            debug!(session_id = ?self.session_id, "study clock resumed");
            true
        } else {
            false
        }
    }

    /// Clear both counters, stop ticking and purge the per-session keys.
    /// A locked-out clock stays locked out.
    pub fn stop(&mut self, store: &mut dyn KeyValueStore) {
        if !self.is_locked_out() {
            self.run = RunState::Stopped;
        }
        self.continuous_seconds = 0;
        self.daily_seconds = 0;
        self.break_latch = ThresholdLatch::Armed;
        self.last_activity = None;

        if let Some(id) = self.session_id.clone() {
            persist_quietly(store.remove(&session_time_key(&id)), "clear session time");
            persist_quietly(store.remove(&break_state_key(&id)), "clear break state");
        }
        info!(session_id = ?self.session_id, "study clock stopped");
    }

    /// The learner did something (navigation, answer, input). Pushes the
    /// idle deadline back; never moves it earlier.
    pub fn record_activity(&mut self, now: DateTime<Utc>) {
        if self.last_activity.is_none_or(|last| now > last) {
            self.last_activity = Some(now);
        }
    }

    /// Back to zero continuous study after a validated break.
    pub fn reset_continuous(&mut self, store: &mut dyn KeyValueStore) {
        self.continuous_seconds = 0;
        self.break_latch = ThresholdLatch::Armed;

        if let Some(id) = &self.session_id {
            persist_quietly(store.remove(&session_time_key(id)), "clear session time");
        }
    }

    /// Running total for today, supplied by whoever owns the compliance day.
    /// The counter never moves backwards; reaching the cap locks out at once.
    pub fn load_daily_total(&mut self, daily_seconds: u64) -> Option<ClockSignal> {
        self.daily_seconds = self.daily_seconds.max(daily_seconds);
        self.check_daily_limit()
    }

    /// External day-rollover signal: the only way out of a lockout.
    pub fn roll_over_day(&mut self) {
        self.daily_seconds = 0;
        self.daily_latch = ThresholdLatch::Armed;
        if self.is_locked_out() {
            self.run = RunState::Stopped;
        }
        info!(session_id = ?self.session_id, "compliance day rolled over");
    }

    // ---------------------------
    // Ticking
    // ---------------------------

    /// Count one second. No-op unless running.
    pub fn tick(&mut self, store: &mut dyn KeyValueStore) -> Vec<ClockSignal> {
        let mut signals = Vec::new();

        if !self.is_running() {
            return signals;
        }

        self.continuous_seconds += 1;
        self.daily_seconds += 1;

        if let Some(id) = &self.session_id {
            persist_quietly(
                store.set(&session_time_key(id), &self.continuous_seconds.to_string()),
                "persist session time",
            );
        }

        if self.continuous_seconds >= BREAK_REQUIRED_AFTER_SECONDS
            && self.break_latch == ThresholdLatch::Armed
        {
            self.break_latch = ThresholdLatch::Fired;
            info!(
                session_id = ?self.session_id,
                continuous_seconds = self.continuous_seconds,
                "break required"
            );
            signals.push(ClockSignal::BreakRequired {
                continuous_seconds: self.continuous_seconds,
            });
        }

        if let Some(signal) = self.check_daily_limit() {
            signals.push(signal);
        }

        signals
    }

    /// Apply the whole seconds elapsed since the anchor. The anchor moves by
    /// the seconds applied, so the sub-second remainder carries over.
    ///
    /// Stops at the first tick that raises a signal: the caller reacts
    /// (pause, lockout) before any further second is counted, and the rest
    /// is picked up by the next call if the clock is still running.
    ///
    /// Seconds past the idle deadline are never counted. Once `now` is past
    /// it the clock pauses and reports [`ClockSignal::Idle`].
    pub fn advance(&mut self, now: DateTime<Utc>, store: &mut dyn KeyValueStore) -> Vec<ClockSignal> {
        let RunState::Running { anchor } = self.run else {
            return Vec::new();
        };

        let idle_deadline = self
            .last_activity
            .map(|last| last + Duration::seconds(IDLE_TIMEOUT_SECONDS as i64));
        let counted_until = idle_deadline.map_or(now, |deadline| deadline.min(now));

        let due = (counted_until - anchor).num_seconds();
        let mut signals = Vec::new();
        let mut applied = 0;
        while applied < due && self.is_running() && signals.is_empty() {
            signals.extend(self.tick(store));
            applied += 1;
        }

        if let RunState::Running { anchor } = self.run {
            self.run = RunState::Running {
                anchor: anchor + Duration::seconds(applied),
            };
        }

        if signals.is_empty()
            && self.is_running()
            && let (Some(deadline), Some(last)) = (idle_deadline, self.last_activity)
            && now > deadline
        {
            self.run = RunState::Paused;
            let idle_seconds = elapsed_secs(last, now);
            info!(session_id = ?self.session_id, idle_seconds, "study clock paused for inactivity");
            signals.push(ClockSignal::Idle { idle_seconds });
        }

        signals
    }

    fn check_daily_limit(&mut self) -> Option<ClockSignal> {
        if self.daily_seconds < MAX_DAILY_SECONDS {
            return None;
        }

        self.run = RunState::LockedOut;

        if self.daily_latch == ThresholdLatch::Armed {
            self.daily_latch = ThresholdLatch::Fired;
            warn!(
                session_id = ?self.session_id,
                daily_seconds = self.daily_seconds,
                "daily instruction limit reached"
            );
            Some(ClockSignal::DailyLimitReached {
                daily_seconds: self.daily_seconds,
            })
        } else {
            None
        }
    }
}

/// Local storage failures never stop the clock.
pub(crate) fn persist_quietly(result: AppResult<()>, what: &str) {
    if let Err(e) = result {
        warn!(error = %e, "{what} failed; continuing in memory");
    }
}
