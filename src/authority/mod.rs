//! The authority boundary.
//!
//! Everything on the far side of [`BreakAuthority`] runs with the server's
//! clock and storage. Callers hand over a session id and nothing else: a
//! client-measured duration never crosses this line.

mod validator;

pub use validator::SqliteAuthority;

use crate::errors::AppResult;
use crate::models::{Break, BreakReason};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Receipt for a break opened on the server of record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedBreak {
    pub break_id: String,
    pub server_trusted_start: DateTime<Utc>,
}

/// Result of a break-end validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Accepted {
        validated_duration_seconds: u64,
    },
    Rejected {
        minutes_remaining: u64,
        current_duration_seconds: u64,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ValidationOutcome::Accepted { .. })
    }

    /// Wire shape of the callable contract:
    /// `{accepted: true, validatedDurationSeconds}` or
    /// `{accepted: false, minutesRemaining, currentDurationSeconds}`.
    pub fn to_contract_json(&self) -> serde_json::Value {
        match self {
            ValidationOutcome::Accepted {
                validated_duration_seconds,
            } => json!({
                "accepted": true,
                "validatedDurationSeconds": validated_duration_seconds,
            }),
            ValidationOutcome::Rejected {
                minutes_remaining,
                current_duration_seconds,
            } => json!({
                "accepted": false,
                "minutesRemaining": minutes_remaining,
                "currentDurationSeconds": current_duration_seconds,
            }),
        }
    }
}

pub trait BreakAuthority {
    /// Open a break and stamp its start with the server clock.
    /// `client_observed_start` is stored for reporting only.
    fn open_break(
        &mut self,
        session_id: &str,
        reason: BreakReason,
        client_observed_start: DateTime<Utc>,
    ) -> AppResult<OpenedBreak>;

    /// Recompute the elapsed break time from the stored server start and
    /// complete the break when it is long enough.
    fn validate_break_end(&mut self, session_id: &str) -> AppResult<ValidationOutcome>;

    /// Mark the active break of a session as abandoned (`rejected`).
    fn abandon_break(&mut self, session_id: &str) -> AppResult<()>;

    /// The break currently active for the session, if any.
    fn current_break(&mut self, session_id: &str) -> AppResult<Option<Break>>;

    /// The most recent break of the session whatever its status. Lets a
    /// client learn that its break was completed elsewhere.
    fn latest_break(&mut self, session_id: &str) -> AppResult<Option<Break>>;
}
