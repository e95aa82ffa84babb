//! Randomly spaced comprehension checks (PVQ).
//!
//! The next check fires once continuous study reaches
//! `reset point + PVQ_BASE_INTERVAL_SECONDS + jitter`. While a check is open
//! the caller must hold lesson progression.

use crate::core::clock::persist_quietly;
use crate::core::constants::{
    PVQ_BASE_INTERVAL_SECONDS, PVQ_RANDOM_OFFSET_MAX_SECONDS, PVQ_RANDOM_OFFSET_MIN_SECONDS,
};
use crate::errors::{AppError, AppResult};
use crate::models::{AnswerSubmission, ComprehensionCheck, PvqDraft, Question};
use crate::store::{KeyValueStore, get_json, pvq_draft_key, pvq_open_key, set_json};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

/// Back-off when the provider has nothing to show or fails.
pub const PROVIDER_RETRY_SECONDS: u64 = 60;

/// Collaborators injected into the trigger: where questions come from and
/// where answers go.
pub trait ComprehensionHooks {
    fn fetch_question(&mut self) -> AppResult<Option<Question>>;

    fn submit_answer(&mut self, submission: &AnswerSubmission) -> AppResult<()>;

    fn question_presented(&mut self, _question: &Question) {}
}

/// Hooks that never present a question.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoQuestions;

impl ComprehensionHooks for NoQuestions {
    fn fetch_question(&mut self) -> AppResult<Option<Question>> {
        Ok(None)
    }

    fn submit_answer(&mut self, _submission: &AnswerSubmission) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenCheck {
    pub question: Question,
    pub presented_at: DateTime<Utc>,
    pub draft: PvqDraft,
    submitting: bool,
}

impl OpenCheck {
    pub fn is_submitting(&self) -> bool {
        self.submitting
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Waiting,
    Fetching,
    Open(OpenCheck),
}

pub struct ComprehensionTrigger {
    phase: Phase,
    next_trigger_threshold: u64,
    rng: StdRng,
    history: Vec<ComprehensionCheck>,
    last_question_id: Option<String>,
    /// Store key remembering `last_question_id` across reloads.
    open_key: Option<String>,
}

impl ComprehensionTrigger {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self::with_rng_at(rng, 0)
    }

    /// Schedule the first check relative to `from` (a restored session).
    pub fn with_rng_at(rng: StdRng, from: u64) -> Self {
        let mut trigger = Self {
            phase: Phase::Waiting,
            next_trigger_threshold: 0,
            rng,
            history: Vec::new(),
            last_question_id: None,
            open_key: None,
        };
        trigger.next_trigger_threshold = trigger.compute_next_threshold(from);
        trigger
    }

    /// Bind the trigger to a session so the last presented question is
    /// remembered in the store. Its draft is cleared once a different
    /// question is shown, even after a reload.
    pub fn for_session(mut self, session_id: &str, store: &dyn KeyValueStore) -> Self {
        let key = pvq_open_key(session_id);
        match store.get(&key) {
            Ok(id) => self.last_question_id = id.filter(|id| !id.is_empty()),
            Err(e) => warn!(session_id, error = %e, "failed to restore the open question id"),
        }
        self.open_key = Some(key);
        self
    }

    /// `from + BASE + uniform[MIN, MAX)`.
    fn compute_next_threshold(&mut self, from: u64) -> u64 {
        let offset = self
            .rng
            .gen_range(PVQ_RANDOM_OFFSET_MIN_SECONDS..PVQ_RANDOM_OFFSET_MAX_SECONDS);
        from + PVQ_BASE_INTERVAL_SECONDS + offset
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    pub fn next_trigger_threshold(&self) -> u64 {
        self.next_trigger_threshold
    }

    pub fn is_open(&self) -> bool {
        matches!(self.phase, Phase::Open(_))
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.phase, Phase::Fetching)
    }

    pub fn is_submitting(&self) -> bool {
        self.open_check().map(|c| c.submitting).unwrap_or(false)
    }

    pub fn open_check(&self) -> Option<&OpenCheck> {
        match &self.phase {
            Phase::Open(check) => Some(check),
            _ => None,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.open_check().map(|c| &c.question)
    }

    pub fn history(&self) -> &[ComprehensionCheck] {
        &self.history
    }

    // ---------------------------
    // Scheduling
    // ---------------------------

    /// Called once per clock tick. Returns the question when a check opens.
    pub fn on_tick(
        &mut self,
        continuous_seconds: u64,
        now: DateTime<Utc>,
        hooks: &mut dyn ComprehensionHooks,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<Option<Question>> {
        if self.phase != Phase::Waiting || continuous_seconds < self.next_trigger_threshold {
            return Ok(None);
        }

        self.phase = Phase::Fetching;

        match hooks.fetch_question() {
            Ok(Some(question)) => {
                if let Some(previous) = self.last_question_id.take()
                    && previous != question.id
                {
                    persist_quietly(store.remove(&pvq_draft_key(&previous)), "clear stale draft");
                }

                let draft: PvqDraft = match get_json(store, &pvq_draft_key(&question.id)) {
                    Ok(Some(d)) => d,
                    Ok(None) => PvqDraft::default(),
                    Err(e) => {
                        warn!(error = %e, "ignoring unreadable comprehension draft");
                        PvqDraft::default()
                    }
                };

                self.last_question_id = Some(question.id.clone());
                if let Some(key) = &self.open_key {
                    persist_quietly(store.set(key, &question.id), "persist open question id");
                }
                self.phase = Phase::Open(OpenCheck {
                    question: question.clone(),
                    presented_at: now,
                    draft,
                    submitting: false,
                });

                hooks.question_presented(&question);
                info!(question_id = %question.id, continuous_seconds, "comprehension check opened");
                Ok(Some(question))
            }
            Ok(None) => {
                self.phase = Phase::Waiting;
                self.next_trigger_threshold = continuous_seconds + PROVIDER_RETRY_SECONDS;
                debug!("no comprehension question available; retrying later");
                Ok(None)
            }
            Err(e) => {
                self.phase = Phase::Waiting;
                self.next_trigger_threshold = continuous_seconds + PROVIDER_RETRY_SECONDS;
                warn!(error = %e, "comprehension question provider failed");
                Err(AppError::SystemError(e.to_string()))
            }
        }
    }

    /// Keep an in-progress answer so a reload can restore it.
    pub fn save_draft(
        &mut self,
        selected_answer: Option<String>,
        feedback: Option<String>,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<()> {
        let Phase::Open(check) = &mut self.phase else {
            return Err(AppError::InvalidState("no comprehension check is open".into()));
        };

        check.draft.selected_answer = selected_answer;
        check.draft.feedback = feedback;

        persist_quietly(
            set_json(store, &pvq_draft_key(&check.question.id), &check.draft),
            "persist comprehension draft",
        );
        Ok(())
    }

    // ---------------------------
    // Answering
    // ---------------------------

    pub fn begin_submit(&mut self, answer: &str, now: DateTime<Utc>) -> AppResult<AnswerSubmission> {
        let Phase::Open(check) = &mut self.phase else {
            return Err(AppError::InvalidState("no comprehension check is open".into()));
        };

        if check.submitting {
            return Err(AppError::DuplicateSubmission(
                "an answer is already being submitted".into(),
            ));
        }

        check.submitting = true;

        Ok(AnswerSubmission {
            question: check.question.clone(),
            answer: answer.to_string(),
            time_to_answer_ms: (now - check.presented_at).num_milliseconds().max(0) as u64,
        })
    }

    /// Close the check whatever the correctness of the answer. A failed
    /// submission leaves it open for a retry.
    pub fn finish_submit(
        &mut self,
        submission: AnswerSubmission,
        result: AppResult<()>,
        continuous_seconds: u64,
        now: DateTime<Utc>,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<ComprehensionCheck> {
        let Phase::Open(check) = &mut self.phase else {
            return Err(AppError::InvalidState("no comprehension check is open".into()));
        };
        check.submitting = false;

        if let Err(e) = result {
            warn!(question_id = %check.question.id, error = %e, "answer submission failed");
            return Err(AppError::SystemError(e.to_string()));
        }

        let Phase::Open(check) = std::mem::replace(&mut self.phase, Phase::Waiting) else {
            return Err(AppError::InvalidState("no comprehension check is open".into()));
        };

        Ok(self.complete(
            check,
            Some(now),
            Some(submission.answer),
            Some(submission.time_to_answer_ms),
            continuous_seconds,
            store,
        ))
    }

    pub fn submit_answer(
        &mut self,
        answer: &str,
        continuous_seconds: u64,
        now: DateTime<Utc>,
        hooks: &mut dyn ComprehensionHooks,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<ComprehensionCheck> {
        let submission = self.begin_submit(answer, now)?;
        let result = hooks.submit_answer(&submission);
        self.finish_submit(submission, result, continuous_seconds, now, store)
    }

    /// Dismiss the open check without an answer. Recorded as dismissed.
    pub fn close(
        &mut self,
        continuous_seconds: u64,
        store: &mut dyn KeyValueStore,
    ) -> Option<ComprehensionCheck> {
        if !self.is_open() {
            return None;
        }
        let Phase::Open(check) = std::mem::replace(&mut self.phase, Phase::Waiting) else {
            return None;
        };

        Some(self.complete(check, None, None, None, continuous_seconds, store))
    }

    /// Schedule from a new reset point (break completed, session stopped).
    /// Any open check is dropped.
    pub fn reset(&mut self, from: u64, store: &mut dyn KeyValueStore) {
        if let Some(id) = self.last_question_id.take() {
            persist_quietly(store.remove(&pvq_draft_key(&id)), "clear comprehension draft");
        }
        self.forget_open_question(store);
        self.phase = Phase::Waiting;
        self.next_trigger_threshold = self.compute_next_threshold(from);
    }

    fn forget_open_question(&self, store: &mut dyn KeyValueStore) {
        if let Some(key) = &self.open_key {
            persist_quietly(store.remove(key), "clear open question id");
        }
    }

    fn complete(
        &mut self,
        check: OpenCheck,
        answered_at: Option<DateTime<Utc>>,
        answer: Option<String>,
        time_to_answer_ms: Option<u64>,
        continuous_seconds: u64,
        store: &mut dyn KeyValueStore,
    ) -> ComprehensionCheck {
        persist_quietly(
            store.remove(&pvq_draft_key(&check.question.id)),
            "clear comprehension draft",
        );
        self.last_question_id = None;
        self.forget_open_question(store);
        self.next_trigger_threshold = self.compute_next_threshold(continuous_seconds);

        let dismissed = answer.is_none();
        let record = ComprehensionCheck {
            question: check.question,
            presented_at: check.presented_at,
            answered_at,
            answer,
            time_to_answer_ms,
            next_trigger_threshold: self.next_trigger_threshold,
            dismissed,
        };

        info!(
            question_id = %record.question.id,
            dismissed,
            next_trigger_threshold = record.next_trigger_threshold,
            "comprehension check closed"
        );

        self.history.push(record.clone());
        record
    }
}

impl Default for ComprehensionTrigger {
    fn default() -> Self {
        Self::new()
    }
}
