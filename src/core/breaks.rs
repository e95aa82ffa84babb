//! Client side of the break lifecycle: `Idle` → `OnBreak` → `Idle`.
//!
//! The coordinator gates the UI and keeps the history, but it never decides
//! whether a break was long enough. That answer comes from the
//! [`BreakAuthority`], which only ever receives the session id.

use crate::authority::{BreakAuthority, ValidationOutcome};
use crate::core::clock::persist_quietly;
use crate::core::constants::{BREAK_REQUIRED_AFTER_SECONDS, MIN_BREAK_SECONDS};
use crate::errors::{AppError, AppResult};
use crate::models::{Break, BreakHistoryEntry, BreakReason};
use crate::store::{KeyValueStore, PersistedBreakState, break_state_key, get_json, set_json};
use crate::utils::time::elapsed_secs;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

/// Whether continuous study has crossed the mandatory-break threshold
/// since the last completed break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakRequirement {
    NotDue,
    Required { at_continuous_seconds: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveBreak {
    pub break_id: String,
    pub reason: BreakReason,
    pub client_observed_start: DateTime<Utc>,
    /// Echo of the server start, when known. Display only.
    pub server_trusted_start: Option<DateTime<Utc>>,
    /// Last rejection received from the authority, for the countdown UI.
    pub last_rejection: Option<(u64, u64)>,
    end_attempt_in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakState {
    Idle,
    OnBreak(ActiveBreak),
}

/// Token for a validation call in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndAttempt {
    pub session_id: String,
    pub break_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakEndOutcome {
    /// Validated by the authority; the coordinator is back to `Idle`.
    Completed(BreakHistoryEntry),
    /// Too short; the break stays active.
    StillOnBreak {
        minutes_remaining: u64,
        current_duration_seconds: u64,
    },
}

#[derive(Debug, Clone)]
pub struct BreakCoordinator {
    session_id: String,
    state: BreakState,
    requirement: BreakRequirement,
    history: Vec<BreakHistoryEntry>,
}

impl BreakCoordinator {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: BreakState::Idle,
            requirement: BreakRequirement::NotDue,
            history: Vec::new(),
        }
    }

    /// Rebuild the coordinator after a reload from `break_state_<sessionId>`.
    pub fn restore(session_id: &str, store: &dyn KeyValueStore) -> Self {
        let mut coordinator = Self::new(session_id);

        let saved: Option<PersistedBreakState> =
            match get_json(store, &break_state_key(session_id)) {
                Ok(v) => v,
                Err(e) => {
                    warn!(session_id, error = %e, "failed to restore break state");
                    None
                }
            };

        let Some(saved) = saved else {
            return coordinator;
        };

        match (saved.is_on_break, saved.break_id.clone(), saved.started_at()) {
            (true, Some(break_id), Some(started)) => {
                coordinator.state = BreakState::OnBreak(ActiveBreak {
                    break_id,
                    reason: if saved.is_break_mandatory {
                        BreakReason::Mandatory
                    } else {
                        BreakReason::Voluntary
                    },
                    client_observed_start: started,
                    server_trusted_start: None,
                    last_rejection: None,
                    end_attempt_in_flight: false,
                });
                debug!(session_id, "break state restored");
            }
            (false, _, _) if saved.is_break_mandatory => {
                coordinator.requirement = BreakRequirement::Required {
                    at_continuous_seconds: BREAK_REQUIRED_AFTER_SECONDS,
                };
            }
            _ => {}
        }

        coordinator
    }

    /// Adopt a break the server still considers active, e.g. after the local
    /// store was wiped.
    pub fn adopt_server_break(&mut self, server_break: &Break, store: &mut dyn KeyValueStore) {
        if matches!(self.state, BreakState::OnBreak(_)) || !server_break.is_active() {
            return;
        }

        self.state = BreakState::OnBreak(ActiveBreak {
            break_id: server_break.id.clone(),
            reason: server_break.reason,
            client_observed_start: server_break
                .client_observed_start
                .unwrap_or(server_break.server_trusted_start),
            server_trusted_start: Some(server_break.server_trusted_start),
            last_rejection: None,
            end_attempt_in_flight: false,
        });
        self.requirement = BreakRequirement::NotDue;
        self.persist(store);
        info!(session_id = %self.session_id, break_id = %server_break.id, "adopted active server break");
    }

    // ---------------------------
    // Accessors
    // ---------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &BreakState {
        &self.state
    }

    pub fn requirement(&self) -> BreakRequirement {
        self.requirement
    }

    pub fn active_break(&self) -> Option<&ActiveBreak> {
        match &self.state {
            BreakState::OnBreak(b) => Some(b),
            BreakState::Idle => None,
        }
    }

    pub fn is_on_break(&self) -> bool {
        self.active_break().is_some()
    }

    /// A mandatory break is pending or in progress.
    pub fn is_break_mandatory(&self) -> bool {
        match &self.state {
            BreakState::OnBreak(b) => b.reason.is_mandatory(),
            BreakState::Idle => matches!(self.requirement, BreakRequirement::Required { .. }),
        }
    }

    pub fn break_start_time(&self) -> Option<DateTime<Utc>> {
        self.active_break().map(|b| b.client_observed_start)
    }

    pub fn history(&self) -> &[BreakHistoryEntry] {
        &self.history
    }

    pub fn is_break_due(continuous_seconds: u64) -> bool {
        continuous_seconds >= BREAK_REQUIRED_AFTER_SECONDS
    }

    pub fn time_until_break_required(continuous_seconds: u64) -> u64 {
        BREAK_REQUIRED_AFTER_SECONDS.saturating_sub(continuous_seconds)
    }

    /// Client-observed duration of the current break. Drives the countdown
    /// only; the authority ignores it.
    pub fn current_break_duration(&self, now: DateTime<Utc>) -> u64 {
        self.break_start_time()
            .map(|start| elapsed_secs(start, now))
            .unwrap_or(0)
    }

    /// Seconds left on the local countdown before the resume control unlocks.
    pub fn countdown_remaining(&self, now: DateTime<Utc>) -> u64 {
        if self.is_on_break() {
            MIN_BREAK_SECONDS.saturating_sub(self.current_break_duration(now))
        } else {
            0
        }
    }

    pub fn is_break_minimum_met(&self, now: DateTime<Utc>) -> bool {
        self.is_on_break() && self.countdown_remaining(now) == 0
    }

    pub fn end_attempt_in_flight(&self) -> bool {
        self.active_break()
            .map(|b| b.end_attempt_in_flight)
            .unwrap_or(false)
    }

    // ---------------------------
    // Transitions
    // ---------------------------

    /// The clock latched its break-required signal.
    pub fn on_break_required(&mut self, continuous_seconds: u64, store: &mut dyn KeyValueStore) {
        if self.is_on_break() {
            return;
        }
        self.requirement = BreakRequirement::Required {
            at_continuous_seconds: continuous_seconds,
        };
        self.persist(store);
    }

    /// Open a break. A pending requirement makes it mandatory whatever the
    /// requested reason.
    pub fn start_break(
        &mut self,
        reason: BreakReason,
        authority: &mut dyn BreakAuthority,
        now: DateTime<Utc>,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<&ActiveBreak> {
        if self.is_on_break() {
            return Err(AppError::InvalidState(format!(
                "session {} is already on a break",
                self.session_id
            )));
        }

        let reason = match self.requirement {
            BreakRequirement::Required { .. } => BreakReason::Mandatory,
            BreakRequirement::NotDue => reason,
        };

        let opened = authority.open_break(&self.session_id, reason, now)?;

        self.state = BreakState::OnBreak(ActiveBreak {
            break_id: opened.break_id,
            reason,
            client_observed_start: now,
            server_trusted_start: Some(opened.server_trusted_start),
            last_rejection: None,
            end_attempt_in_flight: false,
        });
        self.requirement = BreakRequirement::NotDue;
        self.persist(store);

        info!(session_id = %self.session_id, reason = reason.to_db_str(), "break started");

        self.active_break()
            .ok_or_else(|| AppError::Other("break state lost after start".into()))
    }

    /// First half of an end attempt: claims the in-flight slot.
    pub fn begin_end_attempt(&mut self) -> AppResult<EndAttempt> {
        let session_id = self.session_id.clone();

        match &mut self.state {
            BreakState::Idle => Err(AppError::InvalidState(format!(
                "session {session_id} is not on a break"
            ))),
            BreakState::OnBreak(b) if b.end_attempt_in_flight => Err(
                AppError::DuplicateSubmission("a break validation is already in flight".into()),
            ),
            BreakState::OnBreak(b) => {
                b.end_attempt_in_flight = true;
                Ok(EndAttempt {
                    session_id,
                    break_id: b.break_id.clone(),
                })
            }
        }
    }

    /// Second half: apply what the authority answered.
    pub fn finish_end_attempt(
        &mut self,
        attempt: EndAttempt,
        result: AppResult<ValidationOutcome>,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<BreakEndOutcome> {
        let active = match &mut self.state {
            BreakState::OnBreak(b) if b.break_id == attempt.break_id => b,
            _ => {
                return Err(AppError::InvalidState(
                    "validation result does not match the active break".into(),
                ));
            }
        };
        active.end_attempt_in_flight = false;

        match result? {
            ValidationOutcome::Accepted {
                validated_duration_seconds,
            } => {
                let entry = BreakHistoryEntry {
                    timestamp: active
                        .server_trusted_start
                        .unwrap_or(active.client_observed_start),
                    duration: validated_duration_seconds,
                    is_mandatory: active.reason.is_mandatory(),
                };

                self.history.push(entry.clone());
                self.state = BreakState::Idle;
                persist_quietly(
                    store.remove(&break_state_key(&self.session_id)),
                    "clear break state",
                );

                info!(
                    session_id = %self.session_id,
                    duration_seconds = validated_duration_seconds,
                    "break completed"
                );
                Ok(BreakEndOutcome::Completed(entry))
            }
            ValidationOutcome::Rejected {
                minutes_remaining,
                current_duration_seconds,
            } => {
                active.last_rejection = Some((minutes_remaining, current_duration_seconds));
                debug!(
                    session_id = %self.session_id,
                    minutes_remaining,
                    "break end rejected"
                );
                Ok(BreakEndOutcome::StillOnBreak {
                    minutes_remaining,
                    current_duration_seconds,
                })
            }
        }
    }

    /// Ask the authority to end the break. Only the session id is sent.
    pub fn attempt_end_break(
        &mut self,
        authority: &mut dyn BreakAuthority,
        store: &mut dyn KeyValueStore,
    ) -> AppResult<BreakEndOutcome> {
        let attempt = self.begin_end_attempt()?;
        let result = authority.validate_break_end(&attempt.session_id);
        self.finish_end_attempt(attempt, result, store)
    }

    /// The server completed the local break through another client. Record
    /// it as if this client had been accepted. Returns `None` when the server
    /// row is not the local break or is not completed.
    pub fn apply_server_completion(
        &mut self,
        server_break: &Break,
        store: &mut dyn KeyValueStore,
    ) -> Option<BreakHistoryEntry> {
        let active = self.active_break()?;
        if active.break_id != server_break.id || !server_break.is_completed() {
            return None;
        }

        let entry = BreakHistoryEntry {
            timestamp: server_break.server_trusted_start,
            duration: server_break.server_validated_duration.unwrap_or(0),
            is_mandatory: server_break.reason.is_mandatory(),
        };

        self.history.push(entry.clone());
        self.state = BreakState::Idle;
        self.requirement = BreakRequirement::NotDue;
        persist_quietly(
            store.remove(&break_state_key(&self.session_id)),
            "clear break state",
        );

        info!(
            session_id = %self.session_id,
            break_id = %server_break.id,
            duration_seconds = entry.duration,
            "break completed on the server of record"
        );
        Some(entry)
    }

    /// Drop the local break without validation (session stop). The server
    /// row is marked abandoned by the caller.
    pub fn abandon(&mut self, store: &mut dyn KeyValueStore) -> Option<ActiveBreak> {
        let previous = std::mem::replace(&mut self.state, BreakState::Idle);
        self.requirement = BreakRequirement::NotDue;
        persist_quietly(
            store.remove(&break_state_key(&self.session_id)),
            "clear break state",
        );

        match previous {
            BreakState::OnBreak(b) => Some(b),
            BreakState::Idle => None,
        }
    }

    fn persist(&self, store: &mut dyn KeyValueStore) {
        let state = match &self.state {
            BreakState::OnBreak(b) => PersistedBreakState {
                is_on_break: true,
                break_start_time: Some(b.client_observed_start.timestamp_millis()),
                is_break_mandatory: b.reason.is_mandatory(),
                break_id: Some(b.break_id.clone()),
            },
            BreakState::Idle => PersistedBreakState {
                is_on_break: false,
                break_start_time: None,
                is_break_mandatory: self.is_break_mandatory(),
                break_id: None,
            },
        };

        persist_quietly(
            set_json(store, &break_state_key(&self.session_id), &state),
            "persist break state",
        );
    }
}
